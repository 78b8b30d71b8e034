//! Backing store adapters.
//!
//! A backing store is the data source the provider synthesizes the virtual
//! tree from. Two variants ship with the crate: [`FileSystemStore`] projects
//! a real directory tree, [`MemoryStore`] projects a synthetic one.

mod filesystem;
mod memory;

use std::io::Read;
use std::path::{Component, Path, PathBuf};

pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::projection::types::ProjectedFileInfo;

/// Lazily produced directory entries.
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<ProjectedFileInfo, StoreError>> + 'a>;

/// Sequential reader over a backing file plus its total length.
pub struct ContentStream {
    /// Reader positioned at byte 0.
    pub reader: Box<dyn Read + Send>,
    /// Total number of bytes the reader will produce.
    pub length: u64,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Capability set the provider needs from a data source.
///
/// Paths are relative to the virtualization root and may use either `/` or
/// `\` as separator; the empty path is the root.
pub trait BackingStore: Send + Sync {
    /// List the children of a directory.
    ///
    /// Yields nothing if `relative_path` is not an existing directory.
    ///
    /// # Arguments
    /// * `relative_path` - Directory path
    fn enumerate(&self, relative_path: &str) -> Result<EntryIter<'_>, StoreError>;

    /// Look up a single entry (case-insensitive on the last component).
    ///
    /// # Arguments
    /// * `relative_path` - Entry path
    ///
    /// # Returns
    /// The entry, or None if absent.
    fn stat(&self, relative_path: &str) -> Result<Option<ProjectedFileInfo>, StoreError>;

    /// Check whether an entry exists.
    ///
    /// # Arguments
    /// * `relative_path` - Entry path
    fn exists(&self, relative_path: &str) -> bool {
        matches!(self.stat(relative_path), Ok(Some(_)))
    }

    /// Absolute root of the backing tree, if it has one.
    ///
    /// Absolute link targets under this root are rewritten to point into
    /// the virtualization root.
    fn backing_root(&self) -> Option<&Path> {
        None
    }

    /// Read the raw target of a link entry.
    ///
    /// # Arguments
    /// * `item` - Link entry
    /// * `full_path` - Full backing path of the link
    fn read_link(&self, item: &ProjectedFileInfo, full_path: &Path) -> Result<PathBuf, StoreError>;

    /// Resolve the target a consumer of the virtual tree should see.
    ///
    /// Returns None for entries that are not reparse points. Absolute
    /// targets inside [`backing_root`](Self::backing_root) are rewritten
    /// relative to `virtualization_root`; relative targets and targets
    /// outside the backing tree are returned unchanged.
    ///
    /// # Arguments
    /// * `item` - Entry to resolve
    /// * `full_path` - Full backing path of the entry
    /// * `virtualization_root` - Root of the virtual tree
    fn resolve_symlink_target(
        &self,
        item: &ProjectedFileInfo,
        full_path: &Path,
        virtualization_root: &Path,
    ) -> Result<Option<PathBuf>, StoreError> {
        if !item.is_reparse_point() {
            return Ok(None);
        }

        let raw: PathBuf = self.read_link(item, full_path)?;
        Ok(Some(rewrite_link_target(
            &raw,
            self.backing_root(),
            virtualization_root,
        )))
    }

    /// Open a file for sequential reading from byte 0.
    ///
    /// # Arguments
    /// * `relative_path` - File path
    ///
    /// # Errors
    /// `StoreError::NotFound` if the path is absent or is a directory.
    fn read_bytes(&self, relative_path: &str) -> Result<ContentStream, StoreError>;
}

/// Rewrite a link target so it stays valid inside the virtual tree.
///
/// # Arguments
/// * `raw` - Target as stored in the backing tree
/// * `backing_root` - Absolute root of the backing tree, if any
/// * `virtualization_root` - Root of the virtual tree
///
/// # Returns
/// The target a consumer walking the virtual tree should follow.
pub fn rewrite_link_target(
    raw: &Path,
    backing_root: Option<&Path>,
    virtualization_root: &Path,
) -> PathBuf {
    if !raw.is_absolute() {
        return raw.to_path_buf();
    }

    let Some(root) = backing_root else {
        return raw.to_path_buf();
    };

    let normalized: PathBuf = lexical_normalize(raw);
    match strip_root(&normalized, &lexical_normalize(root)) {
        Some(relative) => lexical_normalize(&virtualization_root.join(relative)),
        None => raw.to_path_buf(),
    }
}

/// Split a relative path into its non-empty components.
///
/// Both separators are accepted; `.` components are dropped.
///
/// # Arguments
/// * `relative_path` - Path relative to the root
pub(crate) fn path_components(relative_path: &str) -> Vec<&str> {
    relative_path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect()
}

/// Lexically remove `.` and resolve `..` components.
///
/// Does NOT access the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut result: PathBuf = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }

    result
}

/// Strip `root` from the front of `path`, comparing components the way the
/// host compares names.
fn strip_root(path: &Path, root: &Path) -> Option<PathBuf> {
    let mut path_components = path.components();

    for root_component in root.components() {
        let candidate: Component<'_> = path_components.next()?;
        if !components_equal(candidate, root_component) {
            return None;
        }
    }

    Some(path_components.collect())
}

#[cfg(target_os = "windows")]
fn components_equal(a: Component<'_>, b: Component<'_>) -> bool {
    match (a.as_os_str().to_str(), b.as_os_str().to_str()) {
        (Some(a), Some(b)) => crate::util::prj_file_name_equals(a, b),
        _ => a == b,
    }
}

#[cfg(not(target_os = "windows"))]
fn components_equal(a: Component<'_>, b: Component<'_>) -> bool {
    a == b
}
