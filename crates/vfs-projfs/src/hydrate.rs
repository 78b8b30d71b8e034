//! Chunked content hydration.
//!
//! Streams a backing file to the host in bounded chunks. The whole file is
//! always streamed from byte 0 and each chunk is written at its own file
//! offset.

use std::io::{ErrorKind, Read};

use tracing::trace;

use crate::error::{HydrateError, StoreError};
use crate::store::{BackingStore, ContentStream};

/// Default chunk ceiling (64 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Compute the aligned window of a host transfer buffer.
///
/// # Arguments
/// * `byte_offset` - Requested file offset
/// * `length` - Requested size in bytes
/// * `alignment` - Host write alignment (0 or 1 means unaligned)
///
/// # Returns
/// `(aligned_offset, aligned_size)`: the offset rounded down and the size
/// rounded up to the alignment.
pub fn align_write_window(byte_offset: u64, length: u32, alignment: u32) -> (u64, u32) {
    if alignment <= 1 {
        return (byte_offset, length);
    }

    let align: u64 = u64::from(alignment);
    let aligned_offset: u64 = byte_offset - (byte_offset % align);
    let aligned_size: u64 = u64::from(length).div_ceil(align) * align;
    (aligned_offset, u32::try_from(aligned_size).unwrap_or(u32::MAX - (u32::MAX % alignment)))
}

/// Result of a completed hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HydrationSummary {
    /// Number of chunks written.
    pub chunks: u64,
    /// Total bytes written.
    pub bytes: u64,
}

/// Streams file content in bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct ContentHydrator {
    chunk_ceiling: u32,
}

impl ContentHydrator {
    /// Create a hydrator.
    ///
    /// # Arguments
    /// * `chunk_ceiling` - Maximum chunk size (clamped to at least 1)
    pub fn new(chunk_ceiling: u32) -> Self {
        Self {
            chunk_ceiling: chunk_ceiling.max(1),
        }
    }

    /// Maximum chunk size.
    pub fn chunk_ceiling(&self) -> u32 {
        self.chunk_ceiling
    }

    /// Size to request from the host for the transfer buffer.
    ///
    /// # Arguments
    /// * `requested_length` - Length the host asked for
    pub fn desired_buffer_size(&self, requested_length: u32) -> u32 {
        self.chunk_ceiling.min(requested_length).max(1)
    }

    /// Chunk size given the transfer buffer the host provided.
    ///
    /// With an alignment above 1 every chunk but the last must start on an
    /// aligned offset, so the size is rounded down to a multiple of the
    /// alignment, or up to one alignment unit when the ceiling is smaller.
    ///
    /// # Arguments
    /// * `transfer_capacity` - Size of the host transfer buffer
    /// * `alignment` - Host write alignment in bytes (0 or 1 for none)
    pub fn chunk_len(&self, transfer_capacity: usize, alignment: u32) -> usize {
        let bounded: usize = (self.chunk_ceiling as usize).min(transfer_capacity).max(1);
        let alignment: usize = alignment as usize;
        if alignment <= 1 {
            return bounded;
        }

        let aligned: usize = bounded - bounded % alignment;
        if aligned == 0 {
            alignment.min(transfer_capacity).max(1)
        } else {
            aligned
        }
    }

    /// Stream a file from the store.
    ///
    /// # Arguments
    /// * `store` - Backing store
    /// * `relative_path` - File to stream
    /// * `chunk_len` - Bytes per chunk (from [`chunk_len`](Self::chunk_len))
    /// * `write_chunk` - Receives `(bytes, file_offset)`; returns false if
    ///   the host rejected the write
    ///
    /// # Errors
    /// * `NotFound` if the file is absent
    /// * `OutOfMemory` if the read buffer cannot be allocated
    /// * `ShortRead` if the store yields fewer bytes than its length
    /// * `WriteRejected` if `write_chunk` returns false
    pub fn hydrate<F>(
        &self,
        store: &dyn BackingStore,
        relative_path: &str,
        chunk_len: usize,
        write_chunk: F,
    ) -> Result<HydrationSummary, HydrateError>
    where
        F: FnMut(&[u8], u64) -> bool,
    {
        let stream: ContentStream = store.read_bytes(relative_path).map_err(|e| match e {
            StoreError::NotFound { path } => HydrateError::NotFound { path },
            other => HydrateError::Store(other),
        })?;

        self.hydrate_stream(stream, relative_path, chunk_len, write_chunk)
    }

    /// Stream an already opened file.
    ///
    /// # Arguments
    /// * `stream` - Reader positioned at byte 0 plus its length
    /// * `relative_path` - Path for error reporting
    /// * `chunk_len` - Bytes per chunk
    /// * `write_chunk` - Receives `(bytes, file_offset)`
    pub fn hydrate_stream<F>(
        &self,
        mut stream: ContentStream,
        relative_path: &str,
        chunk_len: usize,
        mut write_chunk: F,
    ) -> Result<HydrationSummary, HydrateError>
    where
        F: FnMut(&[u8], u64) -> bool,
    {
        let chunk_len: usize = chunk_len.max(1);
        let buffer_len: usize = usize::try_from(stream.length)
            .unwrap_or(usize::MAX)
            .min(chunk_len);

        let mut buffer: Vec<u8> = Vec::new();
        buffer
            .try_reserve_exact(buffer_len)
            .map_err(|_| HydrateError::OutOfMemory {
                requested: buffer_len,
            })?;
        buffer.resize(buffer_len, 0);

        let mut summary = HydrationSummary::default();
        let mut remaining: u64 = stream.length;

        while remaining > 0 {
            let this_chunk: usize = usize::try_from(remaining)
                .unwrap_or(usize::MAX)
                .min(buffer_len);
            let chunk: &mut [u8] = &mut buffer[..this_chunk];

            let read: usize = read_full(&mut stream.reader, chunk)
                .map_err(|e| HydrateError::Store(StoreError::io(relative_path, e)))?;
            if read < this_chunk {
                return Err(HydrateError::ShortRead {
                    offset: summary.bytes,
                    expected: this_chunk,
                    actual: read,
                });
            }

            if !write_chunk(&*chunk, summary.bytes) {
                return Err(HydrateError::WriteRejected {
                    offset: summary.bytes,
                });
            }

            trace!(
                path = relative_path,
                offset = summary.bytes,
                len = this_chunk,
                "Wrote chunk"
            );

            summary.chunks += 1;
            summary.bytes += this_chunk as u64;
            remaining -= this_chunk as u64;
        }

        Ok(summary)
    }
}

impl Default for ContentHydrator {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Read until `buf` is full or the reader is exhausted.
///
/// # Returns
/// Number of bytes read.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled: usize = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
