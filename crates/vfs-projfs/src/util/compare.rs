//! ProjFS file name comparison and wildcard matching.
//!
//! Names are compared case-insensitively by upper-casing each character,
//! which is how the host's directory listing collation behaves. Wildcard
//! matching follows the host's expression rules, including the DOS
//! wildcards `<`, `>` and `"` that the kernel rewrites legacy patterns into.

use std::cmp::Ordering;

/// DOS_STAR: any run of characters up to the final period in the name.
const DOS_STAR: char = '<';
/// DOS_QM: any single character, or nothing at a period or end of name.
const DOS_QM: char = '>';
/// DOS_DOT: a period, or nothing at end of name.
const DOS_DOT: char = '"';

fn fold(s: &str) -> Vec<char> {
    s.chars().flat_map(char::to_uppercase).collect()
}

/// Compare two file names using ProjFS collation order.
///
/// This is the same ordering used by ProjFS for directory enumeration.
///
/// # Arguments
/// * `a` - First file name
/// * `b` - Second file name
///
/// # Returns
/// Ordering result.
pub fn prj_file_name_compare(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_uppercase)
        .cmp(b.chars().flat_map(char::to_uppercase))
}

/// Check whether two names refer to the same entry (case-insensitive).
///
/// # Arguments
/// * `a` - First file name
/// * `b` - Second file name
pub fn prj_file_name_equals(a: &str, b: &str) -> bool {
    prj_file_name_compare(a, b) == Ordering::Equal
}

/// Whether a pattern contains any wildcard character.
///
/// # Arguments
/// * `pattern` - Search expression
pub fn prj_does_name_contain_wildcards(pattern: &str) -> bool {
    pattern
        .chars()
        .any(|c| matches!(c, '*' | '?' | DOS_STAR | DOS_QM | DOS_DOT))
}

/// Match a file name against a wildcard search expression.
///
/// Matching is case-insensitive. Supported wildcards are `*`, `?` and the
/// DOS forms `<`, `>` and `"`. An empty pattern matches only the empty name;
/// callers that treat "no filter" as match-all must handle that themselves.
///
/// # Arguments
/// * `name` - File name to check
/// * `pattern` - Wildcard pattern
///
/// # Returns
/// True if name matches pattern.
pub fn prj_file_name_match(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = fold(name);
    let pattern: Vec<char> = fold(pattern);
    let last_dot: Option<usize> = name.iter().rposition(|&c| c == '.');

    let mut matcher = Matcher {
        name: &name,
        pattern: &pattern,
        last_dot,
        memo: vec![None; (pattern.len() + 1) * (name.len() + 1)],
    };
    matcher.matches(0, 0)
}

struct Matcher<'a> {
    name: &'a [char],
    pattern: &'a [char],
    last_dot: Option<usize>,
    /// Memoized results indexed by (pattern position, name position).
    memo: Vec<Option<bool>>,
}

impl Matcher<'_> {
    fn matches(&mut self, p: usize, n: usize) -> bool {
        let slot: usize = p * (self.name.len() + 1) + n;
        if let Some(known) = self.memo[slot] {
            return known;
        }

        let result: bool = self.step(p, n);
        self.memo[slot] = Some(result);
        result
    }

    fn step(&mut self, p: usize, n: usize) -> bool {
        let at_end: bool = n == self.name.len();

        let Some(&expr) = self.pattern.get(p) else {
            return at_end;
        };

        match expr {
            '*' => self.matches(p + 1, n) || (!at_end && self.matches(p, n + 1)),
            '?' => !at_end && self.matches(p + 1, n + 1),
            DOS_STAR => {
                let may_consume: bool = !at_end && Some(n) != self.last_dot;
                self.matches(p + 1, n) || (may_consume && self.matches(p, n + 1))
            }
            DOS_QM => {
                if at_end || self.name[n] == '.' {
                    self.matches(p + 1, n)
                } else {
                    self.matches(p + 1, n + 1)
                }
            }
            DOS_DOT => {
                if at_end {
                    self.matches(p + 1, n)
                } else {
                    self.name[n] == '.' && self.matches(p + 1, n + 1)
                }
            }
            literal => !at_end && self.name[n] == literal && self.matches(p + 1, n + 1),
        }
    }
}
