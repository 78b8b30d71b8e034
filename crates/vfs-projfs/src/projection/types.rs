//! Data types for projected entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

bitflags::bitflags! {
    /// File attribute bits as understood by the virtualization host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        /// Only valid when no other bit is set.
        const NORMAL = 0x0000_0080;
        const TEMPORARY = 0x0000_0100;
        const SPARSE_FILE = 0x0000_0200;
        const REPARSE_POINT = 0x0000_0400;
        const COMPRESSED = 0x0000_0800;
        const OFFLINE = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED = 0x0000_4000;
    }
}

impl FileAttributes {
    /// Force the directory bit to agree with `is_directory`.
    ///
    /// # Arguments
    /// * `is_directory` - Whether the entry is a directory
    ///
    /// # Returns
    /// Attributes with DIRECTORY set for directories and cleared otherwise.
    pub fn normalized(self, is_directory: bool) -> Self {
        if is_directory {
            (self - FileAttributes::NORMAL) | FileAttributes::DIRECTORY
        } else {
            self - FileAttributes::DIRECTORY
        }
    }
}

/// The four timestamps carried by every entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileTimes {
    pub creation: SystemTime,
    pub last_access: SystemTime,
    pub last_write: SystemTime,
    pub change: SystemTime,
}

impl FileTimes {
    /// All four timestamps set to the same instant.
    ///
    /// # Arguments
    /// * `time` - Timestamp to use
    pub fn uniform(time: SystemTime) -> Self {
        Self {
            creation: time,
            last_access: time,
            last_write: time,
            change: time,
        }
    }

    /// All four timestamps set to now.
    pub fn now() -> Self {
        Self::uniform(SystemTime::now())
    }
}

/// Projected file/folder info for enumeration and placeholders.
///
/// Produced by a backing store. Directories always report size 0 and
/// carry the DIRECTORY attribute.
#[derive(Clone, Debug)]
pub struct ProjectedFileInfo {
    /// File or folder name (Arc to avoid cloning).
    pub name: Arc<str>,
    /// Full identifying path inside the backing store.
    pub full_path: PathBuf,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// Whether this is a folder.
    pub is_directory: bool,
    /// Creation, access, write and change times.
    pub times: FileTimes,
    /// Attribute bits.
    pub attributes: FileAttributes,
    /// Raw link target for synthetic links (stores without a native link API).
    pub symlink_target: Option<PathBuf>,
}

impl ProjectedFileInfo {
    /// Create info, enforcing the directory invariants.
    ///
    /// # Arguments
    /// * `name` - Entry name
    /// * `full_path` - Full identifying path in the backing store
    /// * `size` - Size in bytes (ignored for directories)
    /// * `is_directory` - Whether the entry is a directory
    /// * `times` - Entry timestamps
    /// * `attributes` - Attribute bits as reported by the store
    pub fn new(
        name: impl Into<Arc<str>>,
        full_path: impl Into<PathBuf>,
        size: u64,
        is_directory: bool,
        times: FileTimes,
        attributes: FileAttributes,
    ) -> Self {
        Self {
            name: name.into(),
            full_path: full_path.into(),
            size: if is_directory { 0 } else { size },
            is_directory,
            times,
            attributes: attributes.normalized(is_directory),
            symlink_target: None,
        }
    }

    /// Create info for a regular file.
    ///
    /// # Arguments
    /// * `name` - File name
    /// * `full_path` - Full identifying path
    /// * `size` - File size in bytes
    /// * `times` - File timestamps
    pub fn file(
        name: impl Into<Arc<str>>,
        full_path: impl Into<PathBuf>,
        size: u64,
        times: FileTimes,
    ) -> Self {
        Self::new(name, full_path, size, false, times, FileAttributes::NORMAL)
    }

    /// Create info for a folder.
    ///
    /// # Arguments
    /// * `name` - Folder name
    /// * `full_path` - Full identifying path
    /// * `times` - Folder timestamps
    pub fn directory(
        name: impl Into<Arc<str>>,
        full_path: impl Into<PathBuf>,
        times: FileTimes,
    ) -> Self {
        Self::new(name, full_path, 0, true, times, FileAttributes::DIRECTORY)
    }

    /// Mark this entry as a link to `target`.
    ///
    /// # Arguments
    /// * `target` - Raw link target as stored
    pub fn with_symlink_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.symlink_target = Some(target.into());
        self.attributes = (self.attributes - FileAttributes::NORMAL) | FileAttributes::REPARSE_POINT;
        self
    }

    /// Whether the attributes mark this entry as a reparse/link point.
    pub fn is_reparse_point(&self) -> bool {
        self.attributes.contains(FileAttributes::REPARSE_POINT)
    }

    /// Full identifying path inside the backing store.
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_forces_size_and_attribute() {
        let info = ProjectedFileInfo::new(
            "dir",
            "root/dir",
            4096,
            true,
            FileTimes::now(),
            FileAttributes::NORMAL,
        );
        assert_eq!(info.size, 0);
        assert!(info.attributes.contains(FileAttributes::DIRECTORY));
        assert!(!info.attributes.contains(FileAttributes::NORMAL));
    }

    #[test]
    fn test_file_clears_directory_attribute() {
        let info = ProjectedFileInfo::new(
            "file.txt",
            "root/file.txt",
            12,
            false,
            FileTimes::now(),
            FileAttributes::DIRECTORY | FileAttributes::READONLY,
        );
        assert_eq!(info.size, 12);
        assert_eq!(info.attributes, FileAttributes::READONLY);
    }

    #[test]
    fn test_symlink_sets_reparse_point() {
        let info = ProjectedFileInfo::file("link", "root/link", 0, FileTimes::now())
            .with_symlink_target("target.txt");
        assert!(info.is_reparse_point());
        assert_eq!(info.symlink_target.as_deref(), Some(Path::new("target.txt")));
    }
}
