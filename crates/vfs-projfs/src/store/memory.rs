//! Synthetic in-memory tree.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{path_components, BackingStore, ContentStream, EntryIter};
use crate::error::StoreError;
use crate::projection::types::{FileTimes, ProjectedFileInfo};
use crate::util::prj_file_name_equals;

/// Entry in a memory folder.
#[derive(Clone, Debug)]
enum MemoryEntry {
    File {
        info: ProjectedFileInfo,
        content: Arc<[u8]>,
    },
    Folder(Box<MemoryFolder>),
    Symlink(ProjectedFileInfo),
}

impl MemoryEntry {
    fn info(&self) -> &ProjectedFileInfo {
        match self {
            MemoryEntry::File { info, .. } => info,
            MemoryEntry::Folder(folder) => &folder.info,
            MemoryEntry::Symlink(info) => info,
        }
    }

    fn name(&self) -> &str {
        &self.info().name
    }
}

#[derive(Clone, Debug)]
struct MemoryFolder {
    info: ProjectedFileInfo,
    /// Children in insertion order; the provider applies host collation.
    children: Vec<MemoryEntry>,
}

impl MemoryFolder {
    fn new(name: &str, full_path: PathBuf, times: FileTimes) -> Self {
        Self {
            info: ProjectedFileInfo::directory(name, full_path, times),
            children: Vec::new(),
        }
    }

    fn find_child(&self, name: &str) -> Option<&MemoryEntry> {
        self.children
            .iter()
            .find(|e| prj_file_name_equals(e.name(), name))
    }

    fn find_folder(&self, components: &[&str]) -> Option<&MemoryFolder> {
        let mut current: &MemoryFolder = self;
        for component in components {
            match current.find_child(component)? {
                MemoryEntry::Folder(folder) => current = folder,
                _ => return None,
            }
        }
        Some(current)
    }

    fn get_or_create_subfolder(
        &mut self,
        name: &str,
        full_path: PathBuf,
        times: FileTimes,
    ) -> Result<&mut MemoryFolder, StoreError> {
        let existing_idx: Option<usize> = self
            .children
            .iter()
            .position(|e| prj_file_name_equals(e.name(), name));

        let idx: usize = match existing_idx {
            Some(idx) => idx,
            None => {
                let folder = MemoryFolder::new(name, full_path.clone(), times);
                self.children.push(MemoryEntry::Folder(Box::new(folder)));
                self.children.len() - 1
            }
        };

        match &mut self.children[idx] {
            MemoryEntry::Folder(folder) => Ok(folder.as_mut()),
            _ => Err(StoreError::Io {
                path: full_path.display().to_string(),
                source: std::io::Error::other("path component is not a directory"),
            }),
        }
    }

    /// Insert an entry, replacing any existing entry with the same name.
    fn insert(&mut self, entry: MemoryEntry) {
        match self
            .children
            .iter()
            .position(|e| prj_file_name_equals(e.name(), entry.name()))
        {
            Some(idx) => self.children[idx] = entry,
            None => self.children.push(entry),
        }
    }
}

/// Backing store holding a synthetic tree in memory.
///
/// Useful for tests and for projecting content that has no on-disk form.
/// Builders take `&self`, so the store can be filled while shared.
///
/// # Example
/// ```
/// use rusty_projfs_provider::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.add_directory("Baz").unwrap();
/// store.add_file("Foo", b"hello".as_slice()).unwrap();
/// ```
pub struct MemoryStore {
    root: RwLock<MemoryFolder>,
    layer_root: Option<PathBuf>,
    times: FileTimes,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let times: FileTimes = FileTimes::now();
        Self {
            root: RwLock::new(MemoryFolder::new("", PathBuf::new(), times)),
            layer_root: None,
            times,
        }
    }

    /// Declare the absolute path this tree stands in for.
    ///
    /// Absolute link targets under `root` are rewritten into the
    /// virtualization root.
    ///
    /// # Arguments
    /// * `root` - Absolute path of the synthetic tree
    pub fn with_layer_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        self.root.get_mut().info.full_path = root.clone();
        self.layer_root = Some(root);
        self
    }

    /// Use fixed timestamps for every entry added afterwards.
    ///
    /// # Arguments
    /// * `times` - Timestamps to report
    pub fn with_times(mut self, times: FileTimes) -> Self {
        self.times = times;
        self.root.get_mut().info.times = times;
        self
    }

    /// Add a directory, creating missing parents.
    ///
    /// # Arguments
    /// * `path` - Relative directory path
    pub fn add_directory(&self, path: &str) -> Result<(), StoreError> {
        let components: Vec<&str> = path_components(path);
        let mut root = self.root.write();
        self.folder_mut(&mut root, &components)?;
        Ok(())
    }

    /// Add a file with the given content, creating missing parents.
    ///
    /// An existing entry with the same name is replaced.
    ///
    /// # Arguments
    /// * `path` - Relative file path
    /// * `content` - File bytes
    pub fn add_file(&self, path: &str, content: impl Into<Arc<[u8]>>) -> Result<(), StoreError> {
        let (parent, name) = split_last(path)?;
        let content: Arc<[u8]> = content.into();
        let info = ProjectedFileInfo::file(
            name,
            self.full_path(&parent).join(name),
            content.len() as u64,
            self.times,
        );

        let mut root = self.root.write();
        self.folder_mut(&mut root, &parent)?
            .insert(MemoryEntry::File { info, content });
        Ok(())
    }

    /// Add a link entry, creating missing parents.
    ///
    /// # Arguments
    /// * `path` - Relative link path
    /// * `target` - Raw link target
    /// * `is_directory` - Whether the link points at a directory
    pub fn add_symlink(
        &self,
        path: &str,
        target: impl Into<PathBuf>,
        is_directory: bool,
    ) -> Result<(), StoreError> {
        let (parent, name) = split_last(path)?;
        let full_path: PathBuf = self.full_path(&parent).join(name);
        let info = if is_directory {
            ProjectedFileInfo::directory(name, full_path, self.times)
        } else {
            ProjectedFileInfo::file(name, full_path, 0, self.times)
        }
        .with_symlink_target(target);

        let mut root = self.root.write();
        self.folder_mut(&mut root, &parent)?
            .insert(MemoryEntry::Symlink(info));
        Ok(())
    }

    fn full_path(&self, components: &[&str]) -> PathBuf {
        let relative: PathBuf = components.iter().collect();
        match &self.layer_root {
            Some(root) => root.join(relative),
            None => relative,
        }
    }

    fn folder_mut<'a>(
        &self,
        root: &'a mut MemoryFolder,
        components: &[&str],
    ) -> Result<&'a mut MemoryFolder, StoreError> {
        let mut current: &mut MemoryFolder = root;
        for (depth, component) in components.iter().enumerate() {
            let full_path: PathBuf = self.full_path(&components[..=depth]);
            current = current.get_or_create_subfolder(component, full_path, self.times)?;
        }
        Ok(current)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn split_last(path: &str) -> Result<(Vec<&str>, &str), StoreError> {
    let mut components: Vec<&str> = path_components(path);
    match components.pop() {
        Some(name) => Ok((components, name)),
        None => Err(StoreError::Io {
            path: path.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        }),
    }
}

impl BackingStore for MemoryStore {
    fn enumerate(&self, relative_path: &str) -> Result<EntryIter<'_>, StoreError> {
        let components: Vec<&str> = path_components(relative_path);
        let root = self.root.read();

        let infos: Vec<ProjectedFileInfo> = root
            .find_folder(&components)
            .map(|folder| folder.children.iter().map(|e| e.info().clone()).collect())
            .unwrap_or_default();

        Ok(Box::new(infos.into_iter().map(Ok)))
    }

    fn stat(&self, relative_path: &str) -> Result<Option<ProjectedFileInfo>, StoreError> {
        let components: Vec<&str> = path_components(relative_path);
        let root = self.root.read();

        let Some((name, parent)) = components.split_last() else {
            return Ok(Some(root.info.clone()));
        };

        Ok(root
            .find_folder(parent)
            .and_then(|folder| folder.find_child(name))
            .map(|entry| entry.info().clone()))
    }

    fn backing_root(&self) -> Option<&Path> {
        self.layer_root.as_deref()
    }

    fn read_link(&self, item: &ProjectedFileInfo, full_path: &Path) -> Result<PathBuf, StoreError> {
        item.symlink_target
            .clone()
            .ok_or_else(|| StoreError::SymlinkResolution {
                path: full_path.display().to_string(),
                reason: "entry has no link target".to_string(),
            })
    }

    fn read_bytes(&self, relative_path: &str) -> Result<ContentStream, StoreError> {
        let components: Vec<&str> = path_components(relative_path);
        let root = self.root.read();

        let entry: Option<&MemoryEntry> = components
            .split_last()
            .and_then(|(name, parent)| root.find_folder(parent)?.find_child(name));

        match entry {
            Some(MemoryEntry::File { content, .. }) => Ok(ContentStream {
                length: content.len() as u64,
                reader: Box::new(Cursor::new(content.clone())),
            }),
            _ => Err(StoreError::NotFound {
                path: relative_path.to_string(),
            }),
        }
    }
}
