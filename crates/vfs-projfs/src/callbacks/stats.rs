//! Statistics collection for the projection provider.
//!
//! Counters are updated lock-free from callback threads and read as
//! snapshots through [`ProviderStatsCollector`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::callbacks::session_registry::SessionRegistry;

/// Live counters shared with the provider.
#[derive(Debug, Default)]
pub struct ProviderCounters {
    enumerations_started: AtomicU64,
    enumerations_ended: AtomicU64,
    entries_returned: AtomicU64,
    insufficient_buffer: AtomicU64,
    placeholders_written: AtomicU64,
    files_hydrated: AtomicU64,
    bytes_hydrated: AtomicU64,
}

impl ProviderCounters {
    pub(crate) fn enumeration_started(&self) {
        self.enumerations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enumeration_ended(&self) {
        self.enumerations_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn entries_returned(&self, count: usize) {
        self.entries_returned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn insufficient_buffer(&self) {
        self.insufficient_buffer.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn placeholder_written(&self) {
        self.placeholders_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn file_hydrated(&self, bytes: u64) {
        self.files_hydrated.fetch_add(1, Ordering::Relaxed);
        self.bytes_hydrated.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Snapshot of provider statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Time since the provider was created.
    pub uptime_secs: u64,
    /// Sessions currently registered.
    pub active_sessions: u64,
    /// StartEnumeration calls that created a session.
    pub enumerations_started: u64,
    /// EndEnumeration calls that removed a session.
    pub enumerations_ended: u64,
    /// Directory entries accepted by result buffers.
    pub entries_returned: u64,
    /// Continuations answered with InsufficientBuffer.
    pub insufficient_buffer: u64,
    /// Placeholder records produced for GetMetadata.
    pub placeholders_written: u64,
    /// Files streamed to completion.
    pub files_hydrated: u64,
    /// Bytes streamed to the host.
    pub bytes_hydrated: u64,
}

impl ProviderStats {
    /// Format stats as a display grid.
    ///
    /// # Returns
    /// Multi-line string with formatted statistics.
    pub fn display_grid(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push("╔══════════════════════════════════════════════════════════╗".to_string());
        lines.push("║                  Projection Provider Stats               ║".to_string());
        lines.push("╠══════════════════════════════════════════════════════════╣".to_string());

        lines.push(format!("║ Uptime: {:>47} sec ║", self.uptime_secs));
        lines.push("╠══════════════════════════════════════════════════════════╣".to_string());

        lines.push("║ Enumeration                                              ║".to_string());
        lines.push(format!("║   Active sessions: {:>38} ║", self.active_sessions));
        lines.push(format!("║   Started:         {:>38} ║", self.enumerations_started));
        lines.push(format!("║   Ended:           {:>38} ║", self.enumerations_ended));
        lines.push(format!("║   Entries:         {:>38} ║", self.entries_returned));
        lines.push(format!("║   Buffer retries:  {:>38} ║", self.insufficient_buffer));
        lines.push("╠══════════════════════════════════════════════════════════╣".to_string());

        lines.push("║ Placeholders & Hydration                                 ║".to_string());
        lines.push(format!("║   Placeholders:    {:>38} ║", self.placeholders_written));
        lines.push(format!("║   Files hydrated:  {:>38} ║", self.files_hydrated));
        lines.push(format!(
            "║   Bytes hydrated:  {:>35} KB ║",
            self.bytes_hydrated / 1024
        ));

        lines.push("╚══════════════════════════════════════════════════════════╝".to_string());

        lines.join("\n")
    }
}

/// Collects statistics from a provider.
///
/// Thread-safe and cloneable for use from background stats threads.
#[derive(Clone)]
pub struct ProviderStatsCollector {
    counters: Arc<ProviderCounters>,
    sessions: Arc<SessionRegistry>,
    start_time: Instant,
}

impl ProviderStatsCollector {
    /// Create a new stats collector.
    ///
    /// # Arguments
    /// * `counters` - Provider counters
    /// * `sessions` - Session registry to report the active count of
    /// * `start_time` - When the provider was created
    pub fn new(
        counters: Arc<ProviderCounters>,
        sessions: Arc<SessionRegistry>,
        start_time: Instant,
    ) -> Self {
        Self {
            counters,
            sessions,
            start_time,
        }
    }

    /// Collect current statistics.
    ///
    /// # Returns
    /// Snapshot of provider statistics.
    pub fn collect(&self) -> ProviderStats {
        let c: &ProviderCounters = &self.counters;
        ProviderStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            active_sessions: self.sessions.len() as u64,
            enumerations_started: c.enumerations_started.load(Ordering::Relaxed),
            enumerations_ended: c.enumerations_ended.load(Ordering::Relaxed),
            entries_returned: c.entries_returned.load(Ordering::Relaxed),
            insufficient_buffer: c.insufficient_buffer.load(Ordering::Relaxed),
            placeholders_written: c.placeholders_written.load(Ordering::Relaxed),
            files_hydrated: c.files_hydrated.load(Ordering::Relaxed),
            bytes_hydrated: c.bytes_hydrated.load(Ordering::Relaxed),
        }
    }
}
