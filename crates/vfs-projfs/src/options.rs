//! Configuration options for the provider and its ProjFS binding.

use std::path::PathBuf;

use uuid::Uuid;

use crate::hydrate::DEFAULT_CHUNK_SIZE;

/// Options for [`ProjectionProvider`](crate::ProjectionProvider).
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Root of the virtual tree; absolute link targets are rewritten
    /// relative to it.
    pub virtualization_root: PathBuf,

    /// Hydration chunk ceiling in bytes.
    pub chunk_size: u32,

    /// Whether link targets are resolved and emitted.
    pub symlink_support: bool,
}

impl ProviderOptions {
    /// Create options with specified virtualization root.
    ///
    /// # Arguments
    /// * `virtualization_root` - Root of the virtual tree
    pub fn new(virtualization_root: impl Into<PathBuf>) -> Self {
        Self {
            virtualization_root: virtualization_root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            symlink_support: true,
        }
    }

    /// Set hydration chunk ceiling.
    ///
    /// Actual chunks are also rounded to the host write alignment.
    ///
    /// # Arguments
    /// * `chunk_size` - Maximum bytes per chunk (clamped to at least 1)
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Enable or disable link target resolution.
    ///
    /// # Arguments
    /// * `enabled` - Whether to resolve and emit link targets
    pub fn with_symlink_support(mut self, enabled: bool) -> Self {
        self.symlink_support = enabled;
        self
    }
}

/// Configuration for the ProjFS virtualizer.
#[derive(Debug, Clone)]
pub struct ProjFsOptions {
    /// Virtualization root path.
    pub root_path: PathBuf,

    /// Instance id (unique per mount).
    pub instance_id: Uuid,

    /// ProjFS pool thread count (0 = let ProjFS decide).
    pub pool_thread_count: u32,

    /// ProjFS concurrent thread count (0 = let ProjFS decide).
    pub concurrent_thread_count: u32,

    /// Let ProjFS cache negative lookups.
    pub enable_negative_path_cache: bool,

    /// Notifications to receive.
    pub notifications: NotificationMask,
}

impl ProjFsOptions {
    /// Create options with specified root path.
    ///
    /// # Arguments
    /// * `root_path` - Virtualization root directory
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            instance_id: Uuid::new_v4(),
            pool_thread_count: 0,
            concurrent_thread_count: 0,
            enable_negative_path_cache: false,
            notifications: NotificationMask::all_supported(),
        }
    }

    /// Set instance id.
    ///
    /// # Arguments
    /// * `id` - Instance id to mark the root with
    pub fn with_instance_id(mut self, id: Uuid) -> Self {
        self.instance_id = id;
        self
    }

    /// Set ProjFS thread counts.
    ///
    /// # Arguments
    /// * `pool` - Pool thread count (0 = default)
    /// * `concurrent` - Concurrent thread count (0 = default)
    pub fn with_thread_counts(mut self, pool: u32, concurrent: u32) -> Self {
        self.pool_thread_count = pool;
        self.concurrent_thread_count = concurrent;
        self
    }

    /// Enable or disable the negative path cache.
    ///
    /// # Arguments
    /// * `enabled` - Whether ProjFS may cache missing paths
    pub fn with_negative_path_cache(mut self, enabled: bool) -> Self {
        self.enable_negative_path_cache = enabled;
        self
    }

    /// Set notification mask.
    ///
    /// # Arguments
    /// * `mask` - Notification mask
    pub fn with_notifications(mut self, mask: NotificationMask) -> Self {
        self.notifications = mask;
        self
    }
}

bitflags::bitflags! {
    /// Notification mask for ProjFS callbacks.
    ///
    /// Bit values match `PRJ_NOTIFY_TYPES`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NotificationMask: u32 {
        const FILE_OPENED = 0x0000_0002;
        const NEW_FILE_CREATED = 0x0000_0004;
        const FILE_OVERWRITTEN = 0x0000_0008;
        const PRE_DELETE = 0x0000_0010;
        const PRE_RENAME = 0x0000_0020;
        const PRE_SET_HARDLINK = 0x0000_0040;
        const FILE_RENAMED = 0x0000_0080;
        const HARDLINK_CREATED = 0x0000_0100;
        const FILE_HANDLE_CLOSED_NO_MODIFICATION = 0x0000_0200;
        const FILE_HANDLE_CLOSED_FILE_MODIFIED = 0x0000_0400;
        const FILE_HANDLE_CLOSED_FILE_DELETED = 0x0000_0800;
        const FILE_PRE_CONVERT_TO_FULL = 0x0000_1000;
    }
}

impl NotificationMask {
    /// Every notification the provider registers for by default.
    pub fn all_supported() -> Self {
        Self::all()
    }

    /// Mask for a provider that wants no notifications.
    pub fn for_readonly() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_options_defaults() {
        let options = ProviderOptions::new("C:\\virt");
        assert_eq!(options.chunk_size, 64 * 1024);
        assert!(options.symlink_support);
        assert_eq!(options.virtualization_root, PathBuf::from("C:\\virt"));
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        let options = ProviderOptions::new("root").with_chunk_size(0);
        assert_eq!(options.chunk_size, 1);
    }

    #[test]
    fn test_projfs_options_builder() {
        let id = Uuid::new_v4();
        let options = ProjFsOptions::new("root")
            .with_instance_id(id)
            .with_thread_counts(4, 2)
            .with_negative_path_cache(true)
            .with_notifications(NotificationMask::for_readonly());

        assert_eq!(options.instance_id, id);
        assert_eq!(options.pool_thread_count, 4);
        assert_eq!(options.concurrent_thread_count, 2);
        assert!(options.enable_negative_path_cache);
        assert!(options.notifications.is_empty());
    }

    #[test]
    fn test_default_notifications_cover_lifecycle() {
        let mask = ProjFsOptions::new("root").notifications;
        assert!(mask.contains(NotificationMask::FILE_OPENED));
        assert!(mask.contains(NotificationMask::FILE_PRE_CONVERT_TO_FULL));
        assert_eq!(mask.bits(), 0x1FFE);
    }
}
