//! Registry of active enumeration sessions.
//!
//! Uses DashMap so concurrent callbacks for different sessions never
//! contend on a global lock; create and remove go through the entry API
//! so a session id is inserted or removed exactly once.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::projection::types::ProjectedFileInfo;
use crate::virtualizer::enumeration::ActiveEnumeration;

/// Host-assigned identifier of an enumeration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumerationId(pub Uuid);

impl EnumerationId {
    /// Generate a random id (for tests and non-host drivers).
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for EnumerationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EnumerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared handle to one session.
///
/// The host serializes calls per session, so the mutex is uncontended in
/// practice; it only makes the handle shareable across worker threads.
pub type SessionHandle = Arc<Mutex<ActiveEnumeration>>;

/// Concurrent map from session id to active enumeration.
pub struct SessionRegistry {
    sessions: DashMap<EnumerationId, SessionHandle>,
}

impl SessionRegistry {
    /// Create new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a new session over a sorted snapshot.
    ///
    /// # Arguments
    /// * `id` - Session id
    /// * `directory` - Directory being enumerated
    /// * `items` - Items in enumeration order
    ///
    /// # Errors
    /// `AlreadyExists` if `id` is already active.
    pub fn create(
        &self,
        id: EnumerationId,
        directory: &str,
        items: Arc<[ProjectedFileInfo]>,
    ) -> Result<SessionHandle, ProviderError> {
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(ProviderError::AlreadyExists { id }),
            Entry::Vacant(vacant) => {
                let enumeration = ActiveEnumeration::new(items).with_directory(directory);
                let handle: SessionHandle = Arc::new(Mutex::new(enumeration));
                vacant.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Look up an active session.
    ///
    /// The returned handle is independent of the map shard lock.
    ///
    /// # Arguments
    /// * `id` - Session id
    pub fn get(&self, id: EnumerationId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Remove a session.
    ///
    /// # Arguments
    /// * `id` - Session id
    ///
    /// # Errors
    /// `InvalidSession` if `id` is not active.
    pub fn remove(&self, id: EnumerationId) -> Result<(), ProviderError> {
        match self.sessions.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::InvalidSession { id }),
        }
    }

    /// Check if registry has any sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
