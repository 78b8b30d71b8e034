//! Projected file system provider.
//!
//! Synthesizes directory listings, placeholder metadata and file contents
//! for a virtualization root on demand, from a pluggable backing store.
//! On Windows the provider is driven by Microsoft's Projected File System
//! (ProjFS); elsewhere the provider layer is fully usable and testable but
//! `projfs_available()` returns false.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: ProjFsVirtualizer (ProjFS callbacks, Windows only)
//! Layer 2: ProjectionProvider (sessions, placeholders, hydration)
//! Layer 1: BackingStore (FileSystemStore, MemoryStore)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rusty_projfs_provider::{
//!     FileSystemStore, ProjFsOptions, ProjFsVirtualizer, ProjectionProvider, ProviderOptions,
//! };
//!
//! let store = Arc::new(FileSystemStore::new("C:\\source")?);
//! let provider = Arc::new(ProjectionProvider::new(store, ProviderOptions::new("C:\\virt")));
//! let vfs = ProjFsVirtualizer::new(provider, ProjFsOptions::new("C:\\virt"))?;
//! vfs.start()?;
//! ```

pub mod callbacks;
pub mod error;
pub mod hydrate;
pub mod options;
pub mod placeholder;
pub mod projection;
pub mod store;
pub mod util;
pub mod virtualizer;

pub use callbacks::{
    DirEntrySink, EnumerationId, FileDataWriter, ProjectionProvider, ProviderStats,
    ProviderStatsCollector, RequesterContext,
};
pub use error::{HydrateError, ProjFsError, ProviderError, StoreError};
pub use hydrate::{ContentHydrator, HydrationSummary, DEFAULT_CHUNK_SIZE};
pub use options::{NotificationMask, ProjFsOptions, ProviderOptions};
pub use placeholder::PlaceholderInfo;
pub use projection::{FileAttributes, FileTimes, ProjectedFileInfo};
pub use store::{BackingStore, ContentStream, FileSystemStore, MemoryStore};
pub use virtualizer::enumeration::EnumerationState;
pub use virtualizer::ProjFsVirtualizer;

/// Check if ProjFS is available on this system.
///
/// # Returns
/// True on Windows. ProjFS must still be enabled as an optional feature;
/// starting virtualization fails if it is not.
#[cfg(target_os = "windows")]
pub fn projfs_available() -> bool {
    true
}

/// Check if ProjFS is available on this system.
///
/// # Returns
/// Always false on non-Windows platforms.
#[cfg(not(target_os = "windows"))]
pub fn projfs_available() -> bool {
    false
}
