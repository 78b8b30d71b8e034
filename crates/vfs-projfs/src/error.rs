//! Error types for the projection provider.

use thiserror::Error;

use crate::callbacks::EnumerationId;

/// Result codes returned by provider operations.
///
/// These map one-to-one onto the status codes the virtualization host
/// understands. `InsufficientBuffer` is a protocol signal, not a fault.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Path is absent from the backing store.
    #[error("Path not found: {path}")]
    NotFound {
        /// The relative path that was requested.
        path: String,
    },

    /// An enumeration session with this id is already active.
    #[error("Enumeration session already exists: {id}")]
    AlreadyExists {
        /// The colliding session id.
        id: EnumerationId,
    },

    /// No active enumeration session with this id.
    #[error("Unknown enumeration session: {id}")]
    InvalidSession {
        /// The unknown session id.
        id: EnumerationId,
    },

    /// The result buffer cannot hold even a single entry.
    #[error("Result buffer too small for a single entry")]
    InsufficientBuffer,

    /// The transfer buffer for hydration could not be acquired.
    #[error("Out of memory acquiring {requested} byte transfer buffer")]
    OutOfMemory {
        /// Requested buffer size in bytes.
        requested: usize,
    },

    /// Any other fault: short reads, rejected writes, store I/O errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Create a NotFound error.
    ///
    /// # Arguments
    /// * `path` - Relative path that was not found
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Whether this result is an expected protocol condition rather than a fault.
    pub fn is_protocol_signal(&self) -> bool {
        matches!(self, Self::InsufficientBuffer)
    }
}

impl From<StoreError> for ProviderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { path } => ProviderError::NotFound { path },
            other => ProviderError::Internal(other.to_string()),
        }
    }
}

impl From<HydrateError> for ProviderError {
    fn from(e: HydrateError) -> Self {
        match e {
            HydrateError::NotFound { path } => ProviderError::NotFound { path },
            HydrateError::OutOfMemory { requested } => ProviderError::OutOfMemory { requested },
            other => ProviderError::Internal(other.to_string()),
        }
    }
}

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Path not present in the store.
    #[error("Path not found in backing store: {path}")]
    NotFound {
        /// The path that was not found.
        path: String,
    },

    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path where error occurred.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Link target could not be read or rewritten.
    #[error("Cannot resolve link target of {path}: {reason}")]
    SymlinkResolution {
        /// Path to the link.
        path: String,
        /// Why resolution failed.
        reason: String,
    },
}

impl StoreError {
    /// Create an Io error from std::io::Error.
    ///
    /// `NotFound` IO errors are reported as [`StoreError::NotFound`].
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `source` - The underlying IO error
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path: String = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Errors raised while streaming file content to the host.
#[derive(Debug, Error)]
pub enum HydrateError {
    /// Backing file does not exist.
    #[error("File not found: {path}")]
    NotFound {
        /// Relative path of the file.
        path: String,
    },

    /// Backing store returned fewer bytes than the chunk needed.
    #[error("Short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// File offset of the chunk.
        offset: u64,
        /// Bytes requested.
        expected: usize,
        /// Bytes actually read.
        actual: usize,
    },

    /// The host refused a chunk.
    #[error("Host rejected chunk at offset {offset}")]
    WriteRejected {
        /// File offset of the rejected chunk.
        offset: u64,
    },

    /// Transfer buffer allocation failed.
    #[error("Cannot allocate {requested} byte transfer buffer")]
    OutOfMemory {
        /// Requested buffer size in bytes.
        requested: usize,
    },

    /// Any other backing store fault.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the native virtualization binding.
#[derive(Debug, Error)]
pub enum ProjFsError {
    /// ProjFS API error.
    #[error("ProjFS API error in {operation}: HRESULT 0x{hresult:08X}")]
    ProjFsApi {
        /// Operation that failed.
        operation: String,
        /// HRESULT error code.
        hresult: i32,
    },

    /// Virtualization root path error.
    #[error("Invalid virtualization root path: {0}")]
    InvalidRootPath(String),

    /// Virtualization already started.
    #[error("Virtualization already started")]
    AlreadyStarted,

    /// Virtualization not started.
    #[error("Virtualization not started")]
    NotStarted,

    /// Path conversion error (UTF-16 <-> UTF-8).
    #[error("Path conversion error: {0}")]
    PathConversion(String),

    /// ProjFS is not available on this platform.
    #[error("ProjFS is only available on Windows")]
    Unsupported,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_provider_not_found() {
        let err: ProviderError = StoreError::NotFound {
            path: "a/b".to_string(),
        }
        .into();
        assert!(matches!(err, ProviderError::NotFound { ref path } if path == "a/b"));
    }

    #[test]
    fn test_store_io_maps_to_internal() {
        let err: ProviderError = StoreError::io(
            "a",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        assert!(matches!(err, ProviderError::Internal(_)));
    }

    #[test]
    fn test_io_not_found_becomes_store_not_found() {
        let err = StoreError::io("x", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_hydrate_out_of_memory_stays_distinct() {
        let err: ProviderError = HydrateError::OutOfMemory { requested: 4096 }.into();
        assert!(matches!(err, ProviderError::OutOfMemory { requested: 4096 }));

        let err: ProviderError = HydrateError::ShortRead {
            offset: 0,
            expected: 10,
            actual: 3,
        }
        .into();
        assert!(matches!(err, ProviderError::Internal(_)));
    }

    #[test]
    fn test_only_insufficient_buffer_is_protocol_signal() {
        assert!(ProviderError::InsufficientBuffer.is_protocol_signal());
        assert!(!ProviderError::Internal("x".into()).is_protocol_signal());
        assert!(!ProviderError::not_found("x").is_protocol_signal());
    }
}
