//! Sendable wrapper for the ProjFS namespace context.

use windows::Win32::Storage::ProjectedFileSystem::PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT;

/// ProjFS context wrapper that is Send + Sync.
///
/// # Safety
///
/// ProjFS allows `PrjAllocateAlignedBuffer`, `PrjWriteFileData` and
/// `PrjStopVirtualizing` from any thread.
#[derive(Clone, Copy)]
pub struct SendableContext(PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT);

unsafe impl Send for SendableContext {}

unsafe impl Sync for SendableContext {}

impl SendableContext {
    /// Wrap a context handle.
    ///
    /// # Arguments
    /// * `context` - ProjFS virtualization context
    pub fn new(context: PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT) -> Self {
        Self(context)
    }

    /// Get the inner context.
    pub fn inner(&self) -> PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT {
        self.0
    }
}
