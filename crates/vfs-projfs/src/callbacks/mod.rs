//! Provider layer between the ProjFS binding and the backing store.
//!
//! Everything here is host-neutral: the binding translates native
//! callbacks onto [`ProjectionProvider`] and tests drive it directly.

mod provider;
pub mod session_registry;
pub mod stats;

pub use provider::{DirEntrySink, FileDataWriter, ProjectionProvider, RequesterContext};
pub use session_registry::{EnumerationId, SessionHandle, SessionRegistry};
pub use stats::{ProviderCounters, ProviderStats, ProviderStatsCollector};
