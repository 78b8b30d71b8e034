//! Provider dispatch: the operations the virtualization host invokes.
//!
//! Host-neutral. The ProjFS binding adapts its native callbacks onto these
//! methods, and tests drive them directly with recording doubles.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, error, trace, warn};
use uuid::Uuid;

use crate::callbacks::session_registry::{EnumerationId, SessionHandle, SessionRegistry};
use crate::callbacks::stats::{ProviderCounters, ProviderStatsCollector};
use crate::error::{HydrateError, ProviderError, StoreError};
use crate::hydrate::{ContentHydrator, HydrationSummary};
use crate::options::ProviderOptions;
use crate::placeholder::{canonical_relative_path, child_relative_path, PlaceholderInfo};
use crate::projection::types::ProjectedFileInfo;
use crate::store::{path_components, BackingStore};
use crate::util::prj_file_name_compare;
use crate::virtualizer::enumeration::EnumerationState;

/// Who triggered a callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequesterContext {
    /// Host command id of the request.
    pub command_id: i32,
    /// Triggering process id.
    pub process_id: u32,
    /// Image file name of the triggering process, if the host supplied it.
    pub process_image_file_name: Option<String>,
}

impl RequesterContext {
    /// Context for calls not attributable to a process.
    pub fn anonymous() -> Self {
        Self::default()
    }

    fn process_name(&self) -> &str {
        self.process_image_file_name.as_deref().unwrap_or("")
    }
}

/// Result buffer for directory entries.
///
/// Capacity is unknown; it is discovered when `add` returns `Ok(false)`.
pub trait DirEntrySink {
    /// Append one entry.
    ///
    /// # Returns
    /// `Ok(false)` if the buffer has no room for it.
    ///
    /// # Errors
    /// `Internal` if the host refused the entry for any other reason.
    fn add(&mut self, entry: &PlaceholderInfo) -> Result<bool, ProviderError>;
}

/// Host side of file hydration.
pub trait FileDataWriter {
    /// Acquire the host transfer buffer.
    ///
    /// # Arguments
    /// * `byte_offset` - Offset the host requested
    /// * `desired_size` - Bytes per chunk the provider wants to send
    ///
    /// # Returns
    /// Usable buffer capacity in bytes.
    ///
    /// # Errors
    /// `OutOfMemory` if the buffer cannot be allocated.
    fn acquire_buffer(&mut self, byte_offset: u64, desired_size: u32) -> Result<usize, ProviderError>;

    /// Alignment every write offset must honor, in bytes.
    ///
    /// Only meaningful after `acquire_buffer`. 0 or 1 means unaligned.
    fn write_alignment(&self) -> u32 {
        1
    }

    /// Write one chunk at `byte_offset` of the file.
    ///
    /// # Returns
    /// False if the host rejected the write.
    fn write(&mut self, data: &[u8], byte_offset: u64) -> bool;
}

/// Answers host requests from a backing store.
///
/// All methods take `&self` and may be called from any number of host
/// worker threads. Calls for one enumeration session are expected to be
/// serialized by the host.
pub struct ProjectionProvider {
    store: Arc<dyn BackingStore>,
    options: ProviderOptions,
    hydrator: ContentHydrator,
    sessions: Arc<SessionRegistry>,
    counters: Arc<ProviderCounters>,
    start_time: Instant,
}

impl ProjectionProvider {
    /// Create a provider.
    ///
    /// # Arguments
    /// * `store` - Backing store to project
    /// * `options` - Provider options
    pub fn new(store: Arc<dyn BackingStore>, options: ProviderOptions) -> Self {
        Self {
            store,
            hydrator: ContentHydrator::new(options.chunk_size),
            options,
            sessions: Arc::new(SessionRegistry::new()),
            counters: Arc::new(ProviderCounters::default()),
            start_time: Instant::now(),
        }
    }

    /// Provider options.
    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Number of active enumeration sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Phase of an active session.
    ///
    /// # Arguments
    /// * `id` - Session id
    pub fn session_state(&self, id: EnumerationId) -> Option<EnumerationState> {
        self.sessions.get(id).map(|handle| handle.lock().state())
    }

    /// Collector for provider statistics.
    pub fn stats_collector(&self) -> ProviderStatsCollector {
        ProviderStatsCollector::new(
            Arc::clone(&self.counters),
            Arc::clone(&self.sessions),
            self.start_time,
        )
    }

    /// Begin a directory enumeration.
    ///
    /// Snapshots and sorts the directory so the session sees a fixed order.
    ///
    /// # Arguments
    /// * `id` - Host-assigned session id
    /// * `relative_path` - Directory to enumerate
    /// * `requester` - Triggering process
    ///
    /// # Errors
    /// `NotFound` if the directory is absent, `AlreadyExists` if `id` is in use.
    pub fn start_enumeration(
        &self,
        id: EnumerationId,
        relative_path: &str,
        requester: &RequesterContext,
    ) -> Result<(), ProviderError> {
        let _span = debug_span!(
            "start_enumeration",
            %id,
            path = relative_path,
            pid = requester.process_id,
            process = requester.process_name()
        )
        .entered();

        if !path_components(relative_path).is_empty() {
            match self.store.stat(relative_path).map_err(|e| self.store_fault(e))? {
                Some(info) if info.is_directory => {}
                _ => return Err(ProviderError::not_found(relative_path)),
            }
        }

        let mut items: Vec<ProjectedFileInfo> = self
            .store
            .enumerate(relative_path)
            .map_err(|e| self.store_fault(e))?
            .collect::<Result<Vec<_>, StoreError>>()
            .map_err(|e| self.store_fault(e))?;
        items.sort_by(|a, b| prj_file_name_compare(&a.name, &b.name));

        let count: usize = items.len();
        match self.sessions.create(id, relative_path, Arc::from(items)) {
            Ok(_) => {
                self.counters.enumeration_started();
                debug!(items = count, "Enumeration started");
                Ok(())
            }
            Err(e) => {
                warn!("Enumeration session id collision");
                Err(e)
            }
        }
    }

    /// Fill a result buffer from an active session.
    ///
    /// # Arguments
    /// * `id` - Session id
    /// * `filter` - Search expression for this call
    /// * `restart` - Whether the host asked to rescan from the start
    /// * `sink` - Result buffer
    ///
    /// # Returns
    /// Number of entries added.
    ///
    /// # Errors
    /// * `InvalidSession` if `id` is not active
    /// * `InsufficientBuffer` if the first entry did not fit
    /// * `Internal` if a link target could not be resolved or the sink
    ///   failed for a reason other than lack of room
    pub fn continue_enumeration(
        &self,
        id: EnumerationId,
        filter: Option<&str>,
        restart: bool,
        sink: &mut dyn DirEntrySink,
    ) -> Result<usize, ProviderError> {
        let handle: SessionHandle = self
            .sessions
            .get(id)
            .ok_or(ProviderError::InvalidSession { id })?;
        let mut session = handle.lock();

        if restart {
            session.restart(filter);
        } else {
            session.try_save_filter(filter);
        }

        let directory: Arc<str> = Arc::clone(session.directory());
        let result: Result<usize, ProviderError> = session.fill(|item| {
            let target: Option<PathBuf> = self.resolve_target(item)?;
            let entry =
                PlaceholderInfo::from_item(child_relative_path(&directory, &item.name), item, target);
            sink.add(&entry)
        });

        match result {
            Ok(added) => {
                self.counters.entries_returned(added);
                debug!(%id, added, "Enumeration continued");
                Ok(added)
            }
            Err(ProviderError::InsufficientBuffer) => {
                self.counters.insufficient_buffer();
                trace!(%id, "Result buffer too small for one entry");
                Err(ProviderError::InsufficientBuffer)
            }
            Err(e) => Err(e),
        }
    }

    /// End a directory enumeration.
    ///
    /// # Arguments
    /// * `id` - Session id
    ///
    /// # Errors
    /// `InvalidSession` if `id` is not active.
    pub fn end_enumeration(&self, id: EnumerationId) -> Result<(), ProviderError> {
        self.sessions.remove(id)?;
        self.counters.enumeration_ended();
        debug!(%id, "Enumeration ended");
        Ok(())
    }

    /// Produce placeholder metadata for one path.
    ///
    /// # Arguments
    /// * `relative_path` - Path the host asked about
    /// * `requester` - Triggering process
    ///
    /// # Errors
    /// `NotFound` if the path is absent, `Internal` on store faults.
    pub fn get_placeholder_info(
        &self,
        relative_path: &str,
        requester: &RequesterContext,
    ) -> Result<PlaceholderInfo, ProviderError> {
        let _span = debug_span!(
            "get_placeholder_info",
            path = relative_path,
            pid = requester.process_id,
            process = requester.process_name()
        )
        .entered();

        let item: ProjectedFileInfo = self
            .store
            .stat(relative_path)
            .map_err(|e| self.store_fault(e))?
            .ok_or_else(|| ProviderError::not_found(relative_path))?;

        let target: Option<PathBuf> = self.resolve_target(&item)?;
        let info = PlaceholderInfo::from_item(
            canonical_relative_path(relative_path, &item.name),
            &item,
            target,
        );

        self.counters.placeholder_written();
        debug!(is_directory = info.is_directory, size = info.size, "Placeholder info");
        Ok(info)
    }

    /// Stream a file's content to the host.
    ///
    /// # Arguments
    /// * `relative_path` - File to hydrate
    /// * `byte_offset` - Offset the host requested
    /// * `length` - Length the host requested
    /// * `stream_id` - Host data stream id
    /// * `requester` - Triggering process
    /// * `writer` - Host transfer buffer and write call
    ///
    /// # Errors
    /// * `NotFound` if the file is absent
    /// * `OutOfMemory` if a transfer buffer cannot be acquired
    /// * `Internal` on short reads, rejected writes or store faults
    pub fn get_file_data<W>(
        &self,
        relative_path: &str,
        byte_offset: u64,
        length: u32,
        stream_id: Uuid,
        requester: &RequesterContext,
        writer: &mut W,
    ) -> Result<HydrationSummary, ProviderError>
    where
        W: FileDataWriter + ?Sized,
    {
        let _span = debug_span!(
            "get_file_data",
            path = relative_path,
            byte_offset,
            length,
            %stream_id,
            pid = requester.process_id,
            process = requester.process_name()
        )
        .entered();

        if !self.store.exists(relative_path) {
            return Err(ProviderError::not_found(relative_path));
        }

        let desired: u32 = self.hydrator.desired_buffer_size(length);
        let capacity: usize = writer.acquire_buffer(byte_offset, desired)?;
        let chunk_len: usize = self.hydrator.chunk_len(capacity, writer.write_alignment());

        let summary: HydrationSummary = self
            .hydrator
            .hydrate(self.store.as_ref(), relative_path, chunk_len, |bytes, offset| {
                writer.write(bytes, offset)
            })
            .map_err(|e| self.hydrate_fault(relative_path, e))?;

        self.counters.file_hydrated(summary.bytes);
        debug!(chunks = summary.chunks, bytes = summary.bytes, "File hydrated");
        Ok(summary)
    }

    /// Check whether a path exists in the backing store.
    ///
    /// # Arguments
    /// * `relative_path` - Path to check
    ///
    /// # Errors
    /// `NotFound` if the path is absent.
    pub fn query_file_name(&self, relative_path: &str) -> Result<(), ProviderError> {
        if self.store.exists(relative_path) {
            Ok(())
        } else {
            Err(ProviderError::not_found(relative_path))
        }
    }

    /// Resolve the link target to emit for an item.
    fn resolve_target(&self, item: &ProjectedFileInfo) -> Result<Option<PathBuf>, ProviderError> {
        if !self.options.symlink_support || !item.is_reparse_point() {
            return Ok(None);
        }

        self.store
            .resolve_symlink_target(item, &item.full_path, &self.options.virtualization_root)
            .map_err(|e| self.store_fault(e))
    }

    fn store_fault(&self, e: StoreError) -> ProviderError {
        let converted = ProviderError::from(e);
        if let ProviderError::Internal(message) = &converted {
            error!(error = %message, "Backing store fault");
        }
        converted
    }

    fn hydrate_fault(&self, relative_path: &str, e: HydrateError) -> ProviderError {
        let converted = ProviderError::from(e);
        match &converted {
            ProviderError::Internal(message) => {
                error!(path = relative_path, error = %message, "Hydration failed");
            }
            ProviderError::OutOfMemory { requested } => {
                error!(path = relative_path, requested, "Hydration buffer allocation failed");
            }
            _ => {}
        }
        converted
    }
}
