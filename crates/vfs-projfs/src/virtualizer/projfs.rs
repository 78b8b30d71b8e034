//! ProjFS virtualizer implementation for Windows.
//!
//! This module provides the `ProjFsVirtualizer` struct that manages
//! the lifecycle of a ProjFS virtualization instance.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use windows::core::{GUID, PCWSTR};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjMarkDirectoryAsPlaceholder, PrjStartVirtualizing, PrjStopVirtualizing, PRJ_CALLBACKS,
    PRJ_FLAG_NONE, PRJ_FLAG_USE_NEGATIVE_PATH_CACHE, PRJ_NOTIFICATION_MAPPING, PRJ_NOTIFY_TYPES,
    PRJ_STARTVIRTUALIZING_OPTIONS,
};

use crate::callbacks::{ProjectionProvider, ProviderStatsCollector};
use crate::error::ProjFsError;
use crate::options::{NotificationMask, ProjFsOptions};
use crate::util::wstr::{string_to_wide, WideString};
use crate::virtualizer::callbacks::{build_callbacks, CallbackContext};
use crate::virtualizer::sendable::SendableContext;

/// ProjFS virtualizer.
///
/// Owns the virtualization instance that routes ProjFS callbacks to a
/// [`ProjectionProvider`].
pub struct ProjFsVirtualizer {
    /// Provider answering callbacks.
    provider: Arc<ProjectionProvider>,
    /// Configuration options.
    options: ProjFsOptions,
    /// Whether virtualization is started.
    started: RwLock<bool>,
    /// ProjFS namespace virtualization context (set after start).
    namespace_context: RwLock<Option<SendableContext>>,
    /// Callback context (must outlive virtualization).
    /// Stored as raw pointer because ProjFS holds a reference to it.
    callback_context_ptr: RwLock<Option<*mut CallbackContext>>,
}

// Safety: the callback context pointer is only accessed while holding its lock.
unsafe impl Send for ProjFsVirtualizer {}
unsafe impl Sync for ProjFsVirtualizer {}

impl ProjFsVirtualizer {
    /// Create a virtualizer.
    ///
    /// # Arguments
    /// * `provider` - Provider to route callbacks to
    /// * `options` - ProjFS configuration options
    ///
    /// # Errors
    /// `InvalidRootPath` if the root path is not valid UTF-8.
    pub fn new(provider: Arc<ProjectionProvider>, options: ProjFsOptions) -> Result<Self, ProjFsError> {
        root_path_to_wide(&options.root_path)?;

        Ok(Self {
            provider,
            options,
            started: RwLock::new(false),
            namespace_context: RwLock::new(None),
            callback_context_ptr: RwLock::new(None),
        })
    }

    /// Start virtualization.
    ///
    /// Creates the root if needed, marks it as a placeholder and starts
    /// the ProjFS virtualization instance.
    ///
    /// # Errors
    /// `AlreadyStarted` if running, `ProjFsApi` if ProjFS rejects a call.
    pub fn start(&self) -> Result<(), ProjFsError> {
        let mut started = self.started.write();
        if *started {
            return Err(ProjFsError::AlreadyStarted);
        }

        std::fs::create_dir_all(&self.options.root_path)?;

        let instance_guid = GUID::from_u128(self.options.instance_id.as_u128());
        mark_directory_as_placeholder(&self.options.root_path, &instance_guid)?;

        let callbacks: PRJ_CALLBACKS = build_callbacks();
        let ctx = Box::new(CallbackContext::new(Arc::clone(&self.provider)));
        let ctx_ptr: *mut CallbackContext = Box::into_raw(ctx);

        let mut notification_mappings: Vec<PRJ_NOTIFICATION_MAPPING> =
            build_notification_mappings(self.options.notifications);

        let namespace_context = match start_virtualizing(
            &self.options,
            &callbacks,
            ctx_ptr as *const c_void,
            &mut notification_mappings,
        ) {
            Ok(context) => context,
            Err(e) => {
                // Safety: ProjFS did not take the pointer.
                unsafe {
                    drop(Box::from_raw(ctx_ptr));
                }
                return Err(e);
            }
        };

        *self.namespace_context.write() = Some(namespace_context);
        *self.callback_context_ptr.write() = Some(ctx_ptr);
        *started = true;

        info!(
            root = %self.options.root_path.display(),
            instance_id = %self.options.instance_id,
            "ProjFS virtualization started"
        );

        Ok(())
    }

    /// Stop virtualization.
    ///
    /// # Errors
    /// `NotStarted` if not running.
    pub fn stop(&self) -> Result<(), ProjFsError> {
        let mut started = self.started.write();
        if !*started {
            return Err(ProjFsError::NotStarted);
        }

        if let Some(ctx) = self.namespace_context.write().take() {
            unsafe {
                PrjStopVirtualizing(ctx.inner());
            }
            info!("ProjFS virtualization stopped");
        }

        if let Some(ctx_ptr) = self.callback_context_ptr.write().take() {
            // Safety: created with Box::into_raw and no callbacks run after stop.
            unsafe {
                drop(Box::from_raw(ctx_ptr));
            }
        }

        *started = false;
        Ok(())
    }

    /// Check if virtualization is started.
    pub fn is_started(&self) -> bool {
        *self.started.read()
    }

    /// Provider answering callbacks.
    pub fn provider(&self) -> &Arc<ProjectionProvider> {
        &self.provider
    }

    /// Virtualization root path.
    pub fn root_path(&self) -> &Path {
        &self.options.root_path
    }

    /// Get a stats collector for monitoring.
    pub fn stats_collector(&self) -> ProviderStatsCollector {
        self.provider.stats_collector()
    }
}

impl Drop for ProjFsVirtualizer {
    fn drop(&mut self) {
        if *self.started.read() {
            let _ = self.stop();
        }
    }
}

// ============================================================================
// Helper Functions (Primitives)
// ============================================================================

fn root_path_to_wide(root_path: &PathBuf) -> Result<WideString, ProjFsError> {
    let root_path_str: &str = root_path
        .to_str()
        .ok_or_else(|| ProjFsError::InvalidRootPath(format!("{:?}", root_path)))?;
    Ok(string_to_wide(root_path_str))
}

/// Mark a directory as a ProjFS placeholder.
///
/// # Arguments
/// * `root_path` - Path to the directory
/// * `instance_guid` - Unique GUID for this virtualization instance
fn mark_directory_as_placeholder(root_path: &PathBuf, instance_guid: &GUID) -> Result<(), ProjFsError> {
    let root_path_wide: WideString = root_path_to_wide(root_path)?;

    unsafe {
        PrjMarkDirectoryAsPlaceholder(
            PCWSTR::from_raw(root_path_wide.as_ptr()),
            PCWSTR::null(),
            None,
            instance_guid,
        )
        .map_err(|e| ProjFsError::ProjFsApi {
            operation: "PrjMarkDirectoryAsPlaceholder".to_string(),
            hresult: e.code().0,
        })?;
    }

    Ok(())
}

/// Build notification mappings from a NotificationMask.
///
/// One mapping rooted at the virtualization root, or none for an empty mask.
fn build_notification_mappings(mask: NotificationMask) -> Vec<PRJ_NOTIFICATION_MAPPING> {
    if mask.is_empty() {
        return vec![];
    }

    vec![PRJ_NOTIFICATION_MAPPING {
        NotificationBitMask: PRJ_NOTIFY_TYPES(mask.bits()),
        NotificationRoot: PCWSTR::null(),
    }]
}

/// Start ProjFS virtualization.
///
/// # Arguments
/// * `options` - ProjFS options
/// * `callbacks` - ProjFS callbacks structure
/// * `instance_context` - Context pointer passed to callbacks
/// * `notification_mappings` - Notification mappings (mutable for ProjFS API)
fn start_virtualizing(
    options: &ProjFsOptions,
    callbacks: &PRJ_CALLBACKS,
    instance_context: *const c_void,
    notification_mappings: &mut [PRJ_NOTIFICATION_MAPPING],
) -> Result<SendableContext, ProjFsError> {
    let root_path_wide: WideString = root_path_to_wide(&options.root_path)?;

    let flags = if options.enable_negative_path_cache {
        PRJ_FLAG_USE_NEGATIVE_PATH_CACHE
    } else {
        PRJ_FLAG_NONE
    };

    let start_options = PRJ_STARTVIRTUALIZING_OPTIONS {
        Flags: flags,
        PoolThreadCount: options.pool_thread_count,
        ConcurrentThreadCount: options.concurrent_thread_count,
        NotificationMappings: if notification_mappings.is_empty() {
            std::ptr::null_mut()
        } else {
            notification_mappings.as_mut_ptr()
        },
        NotificationMappingsCount: notification_mappings.len() as u32,
    };

    unsafe {
        PrjStartVirtualizing(
            PCWSTR::from_raw(root_path_wide.as_ptr()),
            callbacks,
            Some(instance_context),
            Some(&start_options),
        )
        .map(SendableContext::new)
        .map_err(|e| ProjFsError::ProjFsApi {
            operation: "PrjStartVirtualizing".to_string(),
            hresult: e.code().0,
        })
    }
}
