//! ProjFS virtualizer implementation.
//!
//! Enumeration session state is portable; the native callbacks and the
//! virtualization lifecycle are Windows-only.

pub mod enumeration;

#[cfg(target_os = "windows")]
mod callbacks;
#[cfg(target_os = "windows")]
mod projfs;
#[cfg(target_os = "windows")]
mod sendable;

#[cfg(target_os = "windows")]
pub use callbacks::{guid_to_uuid, provider_error_to_hresult};
#[cfg(target_os = "windows")]
pub use projfs::ProjFsVirtualizer;

// Non-Windows stub
#[cfg(not(target_os = "windows"))]
pub struct ProjFsVirtualizer {
    _private: (),
}

#[cfg(not(target_os = "windows"))]
impl ProjFsVirtualizer {
    /// Always fails: ProjFS is only available on Windows.
    pub fn new(
        _provider: std::sync::Arc<crate::callbacks::ProjectionProvider>,
        _options: crate::options::ProjFsOptions,
    ) -> Result<Self, crate::error::ProjFsError> {
        Err(crate::error::ProjFsError::Unsupported)
    }

    /// Always fails: ProjFS is only available on Windows.
    pub fn start(&self) -> Result<(), crate::error::ProjFsError> {
        Err(crate::error::ProjFsError::Unsupported)
    }

    /// Always fails: ProjFS is only available on Windows.
    pub fn stop(&self) -> Result<(), crate::error::ProjFsError> {
        Err(crate::error::ProjFsError::Unsupported)
    }

    /// Always false.
    pub fn is_started(&self) -> bool {
        false
    }
}
