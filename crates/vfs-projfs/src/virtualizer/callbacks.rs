//! ProjFS callback implementations.
//!
//! This module contains the actual ProjFS callback functions that are
//! invoked by the Windows ProjFS driver. Each one decodes its arguments,
//! calls into [`ProjectionProvider`] and maps the result to an HRESULT.

use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, trace};
use uuid::Uuid;
use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{
    BOOLEAN, ERROR_ALREADY_EXISTS, ERROR_FILE_NOT_FOUND, ERROR_INSUFFICIENT_BUFFER, E_FAIL,
    E_INVALIDARG, E_OUTOFMEMORY, S_OK,
};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjAllocateAlignedBuffer, PrjFillDirEntryBuffer2, PrjFreeAlignedBuffer,
    PrjGetVirtualizationInstanceInfo, PrjWriteFileData, PrjWritePlaceholderInfo2,
    PRJ_CALLBACKS, PRJ_CALLBACK_DATA, PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN,
    PRJ_DIR_ENTRY_BUFFER_HANDLE, PRJ_EXTENDED_INFO, PRJ_EXTENDED_INFO_0, PRJ_EXTENDED_INFO_0_0,
    PRJ_EXT_INFO_TYPE_SYMLINK, PRJ_FILE_BASIC_INFO, PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT,
    PRJ_NOTIFICATION, PRJ_NOTIFICATION_PARAMETERS, PRJ_PLACEHOLDER_INFO,
    PRJ_PLACEHOLDER_VERSION_INFO, PRJ_VIRTUALIZATION_INSTANCE_INFO,
};

use crate::callbacks::{
    DirEntrySink, EnumerationId, FileDataWriter, ProjectionProvider, RequesterContext,
};
use crate::error::ProviderError;
use crate::hydrate::align_write_window;
use crate::placeholder::PlaceholderInfo;
use crate::util::filetime::systemtime_to_filetime;
use crate::util::wstr::{pcwstr_to_option, pcwstr_to_string, string_to_wide, WideString};
use crate::virtualizer::sendable::SendableContext;

/// Callback context passed to ProjFS callbacks.
pub struct CallbackContext {
    /// Provider that answers every request.
    pub provider: Arc<ProjectionProvider>,
}

impl CallbackContext {
    /// Create new callback context.
    ///
    /// # Arguments
    /// * `provider` - Projection provider
    pub fn new(provider: Arc<ProjectionProvider>) -> Self {
        Self { provider }
    }
}

/// Map a provider result code to the HRESULT ProjFS expects.
///
/// # Arguments
/// * `e` - Provider error
pub fn provider_error_to_hresult(e: &ProviderError) -> HRESULT {
    match e {
        ProviderError::NotFound { .. } => HRESULT::from(ERROR_FILE_NOT_FOUND),
        ProviderError::AlreadyExists { .. } => HRESULT::from(ERROR_ALREADY_EXISTS),
        ProviderError::InvalidSession { .. } => E_INVALIDARG,
        ProviderError::InsufficientBuffer => HRESULT::from(ERROR_INSUFFICIENT_BUFFER),
        ProviderError::OutOfMemory { .. } => E_OUTOFMEMORY,
        ProviderError::Internal(_) => E_FAIL,
    }
}

/// Convert a ProjFS GUID to a Uuid.
pub fn guid_to_uuid(guid: &GUID) -> Uuid {
    Uuid::from_u128(guid.to_u128())
}

fn to_hresult<T>(result: Result<T, ProviderError>) -> HRESULT {
    match result {
        Ok(_) => S_OK,
        Err(e) => provider_error_to_hresult(&e),
    }
}

unsafe fn context_of<'a>(callback_data: *const PRJ_CALLBACK_DATA) -> &'a CallbackContext {
    &*((*callback_data).InstanceContext as *const CallbackContext)
}

unsafe fn requester_of(callback_data: *const PRJ_CALLBACK_DATA) -> RequesterContext {
    RequesterContext {
        command_id: (*callback_data).CommandId,
        process_id: (*callback_data).TriggeringProcessId,
        process_image_file_name: pcwstr_to_option((*callback_data).TriggeringProcessImageFileName)
            .ok()
            .flatten(),
    }
}

// ============================================================================
// Callback Implementations
// ============================================================================

/// Start directory enumeration callback.
pub unsafe extern "system" fn start_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    let ctx: &CallbackContext = context_of(callback_data);

    let relative_path: String = match pcwstr_to_string((*callback_data).FilePathName) {
        Ok(p) => p,
        Err(_) => return E_FAIL,
    };

    let id = EnumerationId::from(guid_to_uuid(&*enumeration_id));
    to_hresult(
        ctx.provider
            .start_enumeration(id, &relative_path, &requester_of(callback_data)),
    )
}

/// Get directory enumeration callback.
pub unsafe extern "system" fn get_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
    search_expression: PCWSTR,
    dir_entry_buffer_handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
) -> HRESULT {
    let ctx: &CallbackContext = context_of(callback_data);

    let restart: bool = ((*callback_data).Flags.0 & PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN.0) != 0;
    let filter: Option<String> = match pcwstr_to_option(search_expression) {
        Ok(f) => f,
        Err(_) => return E_FAIL,
    };

    let id = EnumerationId::from(guid_to_uuid(&*enumeration_id));
    let mut sink = DirEntryBufferSink {
        handle: dir_entry_buffer_handle,
    };
    to_hresult(
        ctx.provider
            .continue_enumeration(id, filter.as_deref(), restart, &mut sink),
    )
}

/// End directory enumeration callback.
pub unsafe extern "system" fn end_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    let ctx: &CallbackContext = context_of(callback_data);

    let id = EnumerationId::from(guid_to_uuid(&*enumeration_id));
    to_hresult(ctx.provider.end_enumeration(id))
}

/// Get placeholder info callback.
pub unsafe extern "system" fn get_placeholder_info_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
) -> HRESULT {
    let ctx: &CallbackContext = context_of(callback_data);

    let relative_path: String = match pcwstr_to_string((*callback_data).FilePathName) {
        Ok(p) => p,
        Err(_) => return E_FAIL,
    };

    let info: PlaceholderInfo = match ctx
        .provider
        .get_placeholder_info(&relative_path, &requester_of(callback_data))
    {
        Ok(info) => info,
        Err(e) => return provider_error_to_hresult(&e),
    };

    write_placeholder(
        (*callback_data).NamespaceVirtualizationContext,
        &info,
    )
}

/// Get file data callback.
///
/// Streams the whole file; ProjFS serializes requests per file.
pub unsafe extern "system" fn get_file_data_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    byte_offset: u64,
    length: u32,
) -> HRESULT {
    let ctx: &CallbackContext = context_of(callback_data);

    let relative_path: String = match pcwstr_to_string((*callback_data).FilePathName) {
        Ok(p) => p,
        Err(_) => return E_FAIL,
    };

    let data_stream_id: GUID = (*callback_data).DataStreamId;
    let mut writer = AlignedBufferWriter::new(
        SendableContext::new((*callback_data).NamespaceVirtualizationContext),
        data_stream_id,
    );

    to_hresult(ctx.provider.get_file_data(
        &relative_path,
        byte_offset,
        length,
        guid_to_uuid(&data_stream_id),
        &requester_of(callback_data),
        &mut writer,
    ))
}

/// Query file name callback.
pub unsafe extern "system" fn query_file_name_cb(callback_data: *const PRJ_CALLBACK_DATA) -> HRESULT {
    let ctx: &CallbackContext = context_of(callback_data);

    let relative_path: String = match pcwstr_to_string((*callback_data).FilePathName) {
        Ok(p) => p,
        Err(_) => return E_FAIL,
    };

    to_hresult(ctx.provider.query_file_name(&relative_path))
}

/// Notification callback. Acknowledged without action.
pub unsafe extern "system" fn notification_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    is_directory: BOOLEAN,
    notification: PRJ_NOTIFICATION,
    _destination_file_name: PCWSTR,
    _operation_parameters: *mut PRJ_NOTIFICATION_PARAMETERS,
) -> HRESULT {
    if tracing::enabled!(tracing::Level::TRACE) {
        let relative_path: String =
            pcwstr_to_string((*callback_data).FilePathName).unwrap_or_default();
        trace!(
            path = %relative_path,
            notification = notification.0,
            is_directory = is_directory.as_bool(),
            "Notification"
        );
    }
    S_OK
}

/// Cancel command callback. Requests are not cancellable.
pub unsafe extern "system" fn cancel_command_cb(callback_data: *const PRJ_CALLBACK_DATA) {
    debug!(command_id = (*callback_data).CommandId, "CancelCommand ignored");
}

// ============================================================================
// Host buffers
// ============================================================================

/// Directory entry buffer as a [`DirEntrySink`].
struct DirEntryBufferSink {
    handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
}

impl DirEntrySink for DirEntryBufferSink {
    fn add(&mut self, entry: &PlaceholderInfo) -> Result<bool, ProviderError> {
        let name_wide: WideString = string_to_wide(&entry.name);
        let basic_info: PRJ_FILE_BASIC_INFO = basic_info_of(entry);
        let target_wide: Option<WideString> = entry.symlink_target.as_deref().map(path_to_wide);
        let extended: Option<PRJ_EXTENDED_INFO> = target_wide.as_deref().map(symlink_extended_info);

        let result = unsafe {
            PrjFillDirEntryBuffer2(
                self.handle,
                PCWSTR::from_raw(name_wide.as_ptr()),
                Some(&basic_info),
                extended.as_ref().map(|e| e as *const PRJ_EXTENDED_INFO),
            )
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.code() == HRESULT::from(ERROR_INSUFFICIENT_BUFFER) => Ok(false),
            Err(e) => {
                error!(name = %entry.name, hresult = e.code().0, "PrjFillDirEntryBuffer2 failed");
                Err(ProviderError::Internal(format!(
                    "PrjFillDirEntryBuffer2 failed for {}: 0x{:08X}",
                    entry.name,
                    e.code().0
                )))
            }
        }
    }
}

/// Aligned transfer buffer plus `PrjWriteFileData` as a [`FileDataWriter`].
struct AlignedBufferWriter {
    context: SendableContext,
    data_stream_id: GUID,
    buffer: *mut c_void,
    capacity: usize,
    alignment: u32,
}

impl AlignedBufferWriter {
    fn new(context: SendableContext, data_stream_id: GUID) -> Self {
        Self {
            context,
            data_stream_id,
            buffer: std::ptr::null_mut(),
            capacity: 0,
            alignment: 1,
        }
    }

    fn instance_write_alignment(&self) -> u32 {
        let mut info = PRJ_VIRTUALIZATION_INSTANCE_INFO::default();
        match unsafe { PrjGetVirtualizationInstanceInfo(self.context.inner(), &mut info) } {
            Ok(()) => info.WriteAlignment,
            Err(e) => {
                debug!(hresult = e.code().0, "Write alignment unavailable");
                1
            }
        }
    }
}

impl FileDataWriter for AlignedBufferWriter {
    fn acquire_buffer(&mut self, byte_offset: u64, desired_size: u32) -> Result<usize, ProviderError> {
        let alignment: u32 = self.instance_write_alignment().max(1);
        let (_, size) = align_write_window(byte_offset, desired_size, alignment);
        let size: usize = size as usize;

        let buffer: *mut c_void = unsafe { PrjAllocateAlignedBuffer(self.context.inner(), size) };
        if buffer.is_null() {
            return Err(ProviderError::OutOfMemory { requested: size });
        }

        if !self.buffer.is_null() {
            unsafe { PrjFreeAlignedBuffer(self.buffer) };
        }
        self.buffer = buffer;
        self.capacity = size;
        self.alignment = alignment;
        Ok(size)
    }

    fn write_alignment(&self) -> u32 {
        self.alignment
    }

    fn write(&mut self, data: &[u8], byte_offset: u64) -> bool {
        if self.buffer.is_null() || data.len() > self.capacity {
            return false;
        }

        let result = unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.buffer as *mut u8, data.len());
            PrjWriteFileData(
                self.context.inner(),
                &self.data_stream_id,
                self.buffer,
                byte_offset,
                data.len() as u32,
            )
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(byte_offset, hresult = e.code().0, "PrjWriteFileData failed");
                false
            }
        }
    }
}

impl Drop for AlignedBufferWriter {
    fn drop(&mut self) {
        if !self.buffer.is_null() {
            unsafe { PrjFreeAlignedBuffer(self.buffer) };
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn basic_info_of(info: &PlaceholderInfo) -> PRJ_FILE_BASIC_INFO {
    PRJ_FILE_BASIC_INFO {
        IsDirectory: BOOLEAN(u8::from(info.is_directory)),
        FileSize: info.size as i64,
        CreationTime: systemtime_to_filetime(info.times.creation),
        LastAccessTime: systemtime_to_filetime(info.times.last_access),
        LastWriteTime: systemtime_to_filetime(info.times.last_write),
        ChangeTime: systemtime_to_filetime(info.times.change),
        FileAttributes: info.attributes.bits(),
    }
}

fn version_info_of(info: &PlaceholderInfo) -> PRJ_PLACEHOLDER_VERSION_INFO {
    let mut version = PRJ_PLACEHOLDER_VERSION_INFO::default();
    let provider_len: usize = info.provider_id.len().min(version.ProviderID.len());
    let content_len: usize = info.content_id.len().min(version.ContentID.len());
    version.ProviderID[..provider_len].copy_from_slice(&info.provider_id[..provider_len]);
    version.ContentID[..content_len].copy_from_slice(&info.content_id[..content_len]);
    version
}

fn path_to_wide(path: &Path) -> WideString {
    let mut wide: WideString = path.as_os_str().encode_wide().collect();
    wide.push(0);
    wide
}

/// Extended info for a link. `target_wide` must outlive the result.
fn symlink_extended_info(target_wide: &[u16]) -> PRJ_EXTENDED_INFO {
    PRJ_EXTENDED_INFO {
        InfoType: PRJ_EXT_INFO_TYPE_SYMLINK,
        NextInfoOffset: 0,
        Anonymous: PRJ_EXTENDED_INFO_0 {
            Symlink: PRJ_EXTENDED_INFO_0_0 {
                TargetName: PCWSTR::from_raw(target_wide.as_ptr()),
            },
        },
    }
}

/// Write placeholder info, with a link target when present.
///
/// # Arguments
/// * `context` - ProjFS context
/// * `info` - Placeholder record
fn write_placeholder(context: PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT, info: &PlaceholderInfo) -> HRESULT {
    let path_wide: WideString = string_to_wide(&info.relative_path);
    let target_wide: Option<WideString> = info.symlink_target.as_deref().map(path_to_wide);
    let extended: Option<PRJ_EXTENDED_INFO> = target_wide.as_deref().map(symlink_extended_info);

    let placeholder_info = PRJ_PLACEHOLDER_INFO {
        FileBasicInfo: basic_info_of(info),
        VersionInfo: version_info_of(info),
        ..Default::default()
    };

    unsafe {
        match PrjWritePlaceholderInfo2(
            context,
            PCWSTR::from_raw(path_wide.as_ptr()),
            &placeholder_info,
            std::mem::size_of::<PRJ_PLACEHOLDER_INFO>() as u32,
            extended.as_ref().map(|e| e as *const PRJ_EXTENDED_INFO),
        ) {
            Ok(()) => S_OK,
            Err(e) => {
                error!(path = %info.relative_path, hresult = e.code().0, "PrjWritePlaceholderInfo2 failed");
                e.code()
            }
        }
    }
}

/// Build ProjFS callbacks structure.
///
/// # Returns
/// PRJ_CALLBACKS structure with all callbacks set.
pub fn build_callbacks() -> PRJ_CALLBACKS {
    PRJ_CALLBACKS {
        StartDirectoryEnumerationCallback: Some(start_dir_enum_cb),
        EndDirectoryEnumerationCallback: Some(end_dir_enum_cb),
        GetDirectoryEnumerationCallback: Some(get_dir_enum_cb),
        GetPlaceholderInfoCallback: Some(get_placeholder_info_cb),
        GetFileDataCallback: Some(get_file_data_cb),
        QueryFileNameCallback: Some(query_file_name_cb),
        NotificationCallback: Some(notification_cb),
        CancelCommandCallback: Some(cancel_command_cb),
    }
}
