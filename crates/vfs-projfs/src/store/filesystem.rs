//! Backing store over a real directory tree.

use std::fs::{File, Metadata};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use super::{path_components, BackingStore, ContentStream, EntryIter};
use crate::error::StoreError;
use crate::projection::types::{FileAttributes, FileTimes, ProjectedFileInfo};
use crate::util::prj_file_name_equals;

/// Projects the contents of a directory on disk.
///
/// Entries are produced lazily from `read_dir`. Links are reported as
/// reparse points and are never followed for enumeration.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// Create a store rooted at `root`.
    ///
    /// # Arguments
    /// * `root` - Source directory to project
    ///
    /// # Errors
    /// `StoreError::NotFound` if `root` is not an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root: &Path = root.as_ref();
        let absolute: PathBuf =
            std::path::absolute(root).map_err(|e| StoreError::io(root.display().to_string(), e))?;

        if !absolute.is_dir() {
            return Err(StoreError::NotFound {
                path: absolute.display().to_string(),
            });
        }

        Ok(Self { root: absolute })
    }

    /// Source directory being projected.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative path onto the source tree.
    ///
    /// Components that do not exist with the exact spelling are matched
    /// case-insensitively against the directory listing.
    fn layer_path(&self, relative_path: &str) -> Result<PathBuf, StoreError> {
        let mut path: PathBuf = self.root.clone();
        for component in path_components(relative_path) {
            if component == ".." {
                return Err(StoreError::NotFound {
                    path: relative_path.to_string(),
                });
            }

            let exact: PathBuf = path.join(component);
            path = if exact.symlink_metadata().is_ok() {
                exact
            } else {
                find_case_insensitive(&path, component).unwrap_or(exact)
            };
        }
        Ok(path)
    }
}

fn find_case_insensitive(dir: &Path, name: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .find(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|candidate| prj_file_name_equals(candidate, name))
        })
        .map(|entry| entry.path())
}

/// Build entry info from link-level metadata.
///
/// # Arguments
/// * `name` - Entry name
/// * `full_path` - Full path on disk
/// * `metadata` - Metadata from `symlink_metadata`
fn info_from_metadata(name: &str, full_path: PathBuf, metadata: &Metadata) -> ProjectedFileInfo {
    let is_symlink: bool = metadata.file_type().is_symlink();
    let attributes: FileAttributes = attributes_of(name, metadata);

    // Link entries take their kind from the target, but never their size
    let is_directory: bool = if is_symlink {
        link_points_at_directory(&full_path, attributes)
    } else {
        metadata.is_dir()
    };

    let last_write: SystemTime = metadata.modified().unwrap_or(UNIX_EPOCH);
    let times = FileTimes {
        creation: metadata.created().unwrap_or(last_write),
        last_access: metadata.accessed().unwrap_or(last_write),
        last_write,
        change: last_write,
    };

    let size: u64 = if is_symlink { 0 } else { metadata.len() };
    let mut info = ProjectedFileInfo::new(
        name,
        full_path,
        size,
        is_directory,
        times,
        attributes,
    );
    if is_symlink {
        info.attributes |= FileAttributes::REPARSE_POINT;
        info.attributes -= FileAttributes::NORMAL;
    }
    info
}

#[cfg(target_os = "windows")]
fn attributes_of(_name: &str, metadata: &Metadata) -> FileAttributes {
    use std::os::windows::fs::MetadataExt;
    FileAttributes::from_bits_truncate(metadata.file_attributes())
}

#[cfg(not(target_os = "windows"))]
fn attributes_of(name: &str, metadata: &Metadata) -> FileAttributes {
    let mut attributes = FileAttributes::empty();
    if metadata.is_dir() {
        attributes |= FileAttributes::DIRECTORY;
    }
    if metadata.permissions().readonly() {
        attributes |= FileAttributes::READONLY;
    }
    if name.starts_with('.') {
        attributes |= FileAttributes::HIDDEN;
    }
    if attributes.is_empty() {
        attributes = FileAttributes::NORMAL;
    }
    attributes
}

#[cfg(target_os = "windows")]
fn link_points_at_directory(_full_path: &Path, attributes: FileAttributes) -> bool {
    attributes.contains(FileAttributes::DIRECTORY)
}

#[cfg(not(target_os = "windows"))]
fn link_points_at_directory(full_path: &Path, _attributes: FileAttributes) -> bool {
    // Broken links project as files
    full_path.metadata().map(|m| m.is_dir()).unwrap_or(false)
}

/// Convert one `read_dir` entry, skipping names and kinds the host cannot
/// represent.
fn entry_info(entry: std::fs::DirEntry) -> Option<Result<ProjectedFileInfo, StoreError>> {
    let full_path: PathBuf = entry.path();
    let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
        warn!(path = %full_path.display(), "Skipping entry with non-UTF-8 name");
        return None;
    };

    let metadata: Metadata = match full_path.symlink_metadata() {
        Ok(m) => m,
        Err(e) => return Some(Err(StoreError::io(full_path.display().to_string(), e))),
    };

    let file_type = metadata.file_type();
    if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
        return None;
    }

    Some(Ok(info_from_metadata(&name, full_path, &metadata)))
}

impl BackingStore for FileSystemStore {
    fn enumerate(&self, relative_path: &str) -> Result<EntryIter<'_>, StoreError> {
        let dir: PathBuf = self.layer_path(relative_path)?;
        if !dir.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let read_dir = std::fs::read_dir(&dir).map_err(|e| StoreError::io(dir.display().to_string(), e))?;

        Ok(Box::new(read_dir.filter_map(move |entry| match entry {
            Ok(entry) => entry_info(entry),
            Err(e) => Some(Err(StoreError::io(dir.display().to_string(), e))),
        })))
    }

    fn stat(&self, relative_path: &str) -> Result<Option<ProjectedFileInfo>, StoreError> {
        let components: Vec<&str> = path_components(relative_path);
        let Some((name, parent)) = components.split_last() else {
            let metadata: Metadata = self
                .root
                .symlink_metadata()
                .map_err(|e| StoreError::io(self.root.display().to_string(), e))?;
            return Ok(Some(info_from_metadata("", self.root.clone(), &metadata)));
        };

        let parent_path: String = parent.join("/");
        for entry in self.enumerate(&parent_path)? {
            let info: ProjectedFileInfo = entry?;
            if prj_file_name_equals(&info.name, name) {
                return Ok(Some(info));
            }
        }

        Ok(None)
    }

    fn backing_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn read_link(&self, _item: &ProjectedFileInfo, full_path: &Path) -> Result<PathBuf, StoreError> {
        std::fs::read_link(full_path).map_err(|e| StoreError::SymlinkResolution {
            path: full_path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn read_bytes(&self, relative_path: &str) -> Result<ContentStream, StoreError> {
        let Some(info) = self.stat(relative_path)? else {
            return Err(StoreError::NotFound {
                path: relative_path.to_string(),
            });
        };
        if info.is_directory {
            return Err(StoreError::NotFound {
                path: relative_path.to_string(),
            });
        }

        let file: File =
            File::open(&info.full_path).map_err(|e| StoreError::io(relative_path, e))?;
        let length: u64 = file
            .metadata()
            .map_err(|e| StoreError::io(relative_path, e))?
            .len();

        Ok(ContentStream {
            reader: Box::new(file),
            length,
        })
    }
}
