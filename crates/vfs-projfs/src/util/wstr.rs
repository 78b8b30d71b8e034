//! Wide string conversion utilities for the Windows binding.

use smallvec::SmallVec;
use windows::core::PCWSTR;

use crate::error::ProjFsError;

/// NUL-terminated UTF-16 string. Names and typical paths stay on the stack.
pub type WideString = SmallVec<[u16; 128]>;

/// Convert a host-supplied PCWSTR to a Rust String.
///
/// A null pointer decodes to an empty string.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated UTF-16 string.
pub unsafe fn pcwstr_to_string(s: PCWSTR) -> Result<String, ProjFsError> {
    Ok(pcwstr_to_option(s)?.unwrap_or_default())
}

/// Convert a nullable PCWSTR to `Option<String>`.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated UTF-16 string.
pub unsafe fn pcwstr_to_option(s: PCWSTR) -> Result<Option<String>, ProjFsError> {
    if s.is_null() {
        return Ok(None);
    }

    let mut len: usize = 0;
    while *s.as_ptr().add(len) != 0 {
        len += 1;
    }

    String::from_utf16(std::slice::from_raw_parts(s.as_ptr(), len))
        .map(Some)
        .map_err(|e| ProjFsError::PathConversion(e.to_string()))
}

/// Convert Rust str to a NUL-terminated wide string.
///
/// # Arguments
/// * `s` - UTF-8 string
pub fn string_to_wide(s: &str) -> WideString {
    let mut wide: WideString = s.encode_utf16().collect();
    wide.push(0);
    wide
}
