//! Placeholder and directory-entry records handed to the host.

use std::path::PathBuf;
use std::sync::Arc;

use crate::projection::types::{FileAttributes, FileTimes, ProjectedFileInfo};

/// Content identity token attached to every placeholder.
///
/// Constant because the provider does not version content.
pub const CONTENT_ID: &[u8] = &[0];

/// Provider identity token attached to every placeholder.
pub const PROVIDER_ID: &[u8] = &[1];

/// Metadata record for one placeholder or enumeration entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceholderInfo {
    /// Path relative to the virtualization root, with the store's spelling
    /// for the final component.
    pub relative_path: String,
    /// Entry name as stored.
    pub name: Arc<str>,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Attribute bits, DIRECTORY consistent with `is_directory`.
    pub attributes: FileAttributes,
    /// Creation, access, write and change times.
    pub times: FileTimes,
    /// Link target as the virtual tree should expose it.
    pub symlink_target: Option<PathBuf>,
    /// Opaque content version token.
    pub content_id: &'static [u8],
    /// Opaque provider version token.
    pub provider_id: &'static [u8],
}

impl PlaceholderInfo {
    /// Build a record from a store item.
    ///
    /// Directory size and attributes are forced regardless of what the
    /// store reported.
    ///
    /// # Arguments
    /// * `relative_path` - Path of the entry relative to the root
    /// * `item` - Store item
    /// * `symlink_target` - Resolved link target, if any
    pub fn from_item(
        relative_path: impl Into<String>,
        item: &ProjectedFileInfo,
        symlink_target: Option<PathBuf>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            name: Arc::clone(&item.name),
            size: if item.is_directory { 0 } else { item.size },
            is_directory: item.is_directory,
            attributes: item.attributes.normalized(item.is_directory),
            times: item.times,
            symlink_target,
            content_id: CONTENT_ID,
            provider_id: PROVIDER_ID,
        }
    }

    /// Whether the record describes a link.
    pub fn is_symlink(&self) -> bool {
        self.symlink_target.is_some()
    }
}

/// Replace the final component of `requested` with the store's spelling.
///
/// Host lookups are case-insensitive, so the requested path may differ in
/// case from the stored name. Components are joined with `\`.
///
/// # Arguments
/// * `requested` - Path as the host sent it
/// * `canonical_name` - Name of the matched entry
pub fn canonical_relative_path(requested: &str, canonical_name: &str) -> String {
    let trimmed: &str = requested.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => format!("{}\\{}", &trimmed[..idx], canonical_name),
        None => canonical_name.to_string(),
    }
}

/// Join a directory path and a child name with `\`.
///
/// # Arguments
/// * `parent` - Directory path (empty for the root)
/// * `name` - Child name
pub fn child_relative_path(parent: &str, name: &str) -> String {
    let parent: &str = parent.trim_end_matches(['/', '\\']);
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", parent, name)
    }
}
