//! Integration tests for the projection provider.
//!
//! Drives the provider the way the ProjFS binding does, with recording
//! doubles standing in for the host's result and transfer buffers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};

use rusty_projfs_provider::store::EntryIter;
use rusty_projfs_provider::{
    BackingStore, ContentStream, DirEntrySink, EnumerationId, EnumerationState, FileAttributes,
    FileDataWriter, FileSystemStore, MemoryStore, PlaceholderInfo, ProjectedFileInfo,
    ProjectionProvider, ProviderError, ProviderOptions, RequesterContext, StoreError,
};
use tempfile::TempDir;

/// Result buffer that accepts a fixed number of entries.
struct RecordingSink {
    capacity: usize,
    entries: Vec<PlaceholderInfo>,
}

impl RecordingSink {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_ref()).collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

impl DirEntrySink for RecordingSink {
    fn add(&mut self, entry: &PlaceholderInfo) -> Result<bool, ProviderError> {
        if self.entries.len() >= self.capacity {
            return Ok(false);
        }
        self.entries.push(entry.clone());
        Ok(true)
    }
}

/// Transfer buffer that records every chunk.
///
/// With `alignment` above 1 it behaves like the host: the buffer is rounded
/// up to the alignment and writes at unaligned offsets are rejected.
struct RecordingWriter {
    alignment: u32,
    capacity_limit: Option<usize>,
    fail_allocation: bool,
    reject_at: Option<u64>,
    requested_size: Option<u32>,
    chunks: Vec<(u64, usize)>,
    data: Vec<u8>,
}

impl RecordingWriter {
    fn new() -> Self {
        Self {
            alignment: 1,
            capacity_limit: None,
            fail_allocation: false,
            reject_at: None,
            requested_size: None,
            chunks: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl FileDataWriter for RecordingWriter {
    fn acquire_buffer(&mut self, _byte_offset: u64, desired_size: u32) -> Result<usize, ProviderError> {
        self.requested_size = Some(desired_size);
        if self.fail_allocation {
            return Err(ProviderError::OutOfMemory {
                requested: desired_size as usize,
            });
        }
        let alignment: usize = self.alignment.max(1) as usize;
        let size: usize = (desired_size as usize).div_ceil(alignment) * alignment;
        Ok(self.capacity_limit.map_or(size, |limit| limit.min(size)))
    }

    fn write_alignment(&self) -> u32 {
        self.alignment
    }

    fn write(&mut self, data: &[u8], byte_offset: u64) -> bool {
        if self.reject_at == Some(byte_offset) || byte_offset % u64::from(self.alignment.max(1)) != 0 {
            return false;
        }
        self.chunks.push((byte_offset, data.len()));
        self.data.extend_from_slice(data);
        true
    }
}

/// Store whose links can never be read.
struct UnreadableLinkStore {
    inner: MemoryStore,
}

impl BackingStore for UnreadableLinkStore {
    fn enumerate(&self, relative_path: &str) -> Result<EntryIter<'_>, StoreError> {
        self.inner.enumerate(relative_path)
    }

    fn stat(&self, relative_path: &str) -> Result<Option<ProjectedFileInfo>, StoreError> {
        self.inner.stat(relative_path)
    }

    fn read_link(&self, item: &ProjectedFileInfo, _full_path: &Path) -> Result<PathBuf, StoreError> {
        Err(StoreError::SymlinkResolution {
            path: item.name.to_string(),
            reason: "target vanished".to_string(),
        })
    }

    fn read_bytes(&self, relative_path: &str) -> Result<ContentStream, StoreError> {
        self.inner.read_bytes(relative_path)
    }
}

fn requester() -> RequesterContext {
    RequesterContext {
        command_id: 1,
        process_id: 4242,
        process_image_file_name: Some("C:\\Windows\\explorer.exe".to_string()),
    }
}

fn memory_provider(store: MemoryStore) -> ProjectionProvider {
    ProjectionProvider::new(Arc::new(store), ProviderOptions::new("/virtual"))
}

fn sample_tree() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_directory("Foo").unwrap();
    store.add_directory("Baz").unwrap();
    store.add_file("alpha.txt", b"alpha".as_slice()).unwrap();
    store.add_file("Beta.log", b"beta".as_slice()).unwrap();
    store.add_file("foo.txt", b"foo".as_slice()).unwrap();
    store
}

/// Run one full enumeration of `dir` and return the names in order.
fn enumerate_all(provider: &ProjectionProvider, dir: &str, filter: Option<&str>) -> Vec<String> {
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, dir, &requester()).unwrap();

    let mut names: Vec<String> = Vec::new();
    let mut sink = RecordingSink::with_capacity(2);
    loop {
        sink.clear();
        let added: usize = provider.continue_enumeration(id, filter, false, &mut sink).unwrap();
        names.extend(sink.names().into_iter().map(String::from));
        if added == 0 {
            break;
        }
    }

    provider.end_enumeration(id).unwrap();
    names
}

// ==================== Enumeration ====================

#[test]
fn test_root_directories_sorted() {
    let store = MemoryStore::new();
    store.add_directory("Foo").unwrap();
    store.add_directory("Baz").unwrap();
    let provider = memory_provider(store);
    let id = EnumerationId::new_v4();

    provider.start_enumeration(id, "", &requester()).unwrap();
    let mut sink = RecordingSink::with_capacity(16);
    let added: usize = provider.continue_enumeration(id, None, false, &mut sink).unwrap();

    assert_eq!(added, 2);
    assert_eq!(sink.names(), vec!["Baz", "Foo"]);
    for entry in &sink.entries {
        assert!(entry.is_directory);
        assert_eq!(entry.size, 0);
        assert!(entry.attributes.contains(FileAttributes::DIRECTORY));
    }
    provider.end_enumeration(id).unwrap();
}

#[test]
fn test_filesystem_root_directories_sorted() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir(temp_dir.path().join("Foo")).unwrap();
    fs::create_dir(temp_dir.path().join("Baz")).unwrap();

    let store = FileSystemStore::new(temp_dir.path()).unwrap();
    let provider = ProjectionProvider::new(Arc::new(store), ProviderOptions::new("/virtual"));

    let names: Vec<String> = enumerate_all(&provider, "", None);
    assert_eq!(names, vec!["Baz", "Foo"]);
}

#[test]
fn test_mixed_case_ordering() {
    let provider = memory_provider(sample_tree());
    let names: Vec<String> = enumerate_all(&provider, "", None);
    assert_eq!(names, vec!["alpha.txt", "Baz", "Beta.log", "Foo", "foo.txt"]);
}

#[test]
fn test_filter_is_sticky_after_first_call() {
    let provider = memory_provider(sample_tree());
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    let mut sink = RecordingSink::with_capacity(1);
    provider
        .continue_enumeration(id, Some("*"), false, &mut sink)
        .unwrap();
    assert_eq!(sink.names(), vec!["alpha.txt"]);

    // A later, narrower filter is ignored.
    let mut rest = RecordingSink::with_capacity(16);
    provider
        .continue_enumeration(id, Some("F*"), false, &mut rest)
        .unwrap();
    assert_eq!(rest.names(), vec!["Baz", "Beta.log", "Foo", "foo.txt"]);
    assert_eq!(provider.session_state(id), Some(EnumerationState::Exhausted));
}

#[test]
fn test_filter_is_case_insensitive() {
    let provider = memory_provider(sample_tree());
    let names: Vec<String> = enumerate_all(&provider, "", Some("f*"));
    assert_eq!(names, vec!["Foo", "foo.txt"]);

    let names: Vec<String> = enumerate_all(&provider, "", Some("*.TXT"));
    assert_eq!(names, vec!["alpha.txt", "foo.txt"]);
}

#[test]
fn test_empty_filter_matches_all() {
    let provider = memory_provider(sample_tree());
    assert_eq!(enumerate_all(&provider, "", Some("")).len(), 5);
    assert_eq!(enumerate_all(&provider, "", None).len(), 5);
}

#[test]
fn test_restart_replaces_filter() {
    let provider = memory_provider(sample_tree());
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    let mut sink = RecordingSink::with_capacity(16);
    provider
        .continue_enumeration(id, Some("*.txt"), false, &mut sink)
        .unwrap();
    assert_eq!(sink.names(), vec!["alpha.txt", "foo.txt"]);

    let mut restarted = RecordingSink::with_capacity(16);
    provider
        .continue_enumeration(id, Some("B*"), true, &mut restarted)
        .unwrap();
    assert_eq!(restarted.names(), vec!["Baz", "Beta.log"]);
}

#[test]
fn test_small_buffer_resumes_at_rejected_item() {
    let provider = memory_provider(sample_tree());
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    let mut collected: Vec<String> = Vec::new();
    let mut sink = RecordingSink::with_capacity(2);
    for _ in 0..3 {
        sink.clear();
        provider.continue_enumeration(id, None, false, &mut sink).unwrap();
        collected.extend(sink.names().into_iter().map(String::from));
    }

    assert_eq!(collected, vec!["alpha.txt", "Baz", "Beta.log", "Foo", "foo.txt"]);
}

#[test]
fn test_zero_capacity_is_insufficient_buffer() {
    let provider = memory_provider(sample_tree());
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    let mut full = RecordingSink::with_capacity(0);
    let result = provider.continue_enumeration(id, None, false, &mut full);
    assert!(matches!(result, Err(ProviderError::InsufficientBuffer)));

    // The rejected item is offered again.
    let mut sink = RecordingSink::with_capacity(1);
    provider.continue_enumeration(id, None, false, &mut sink).unwrap();
    assert_eq!(sink.names(), vec!["alpha.txt"]);
}

#[test]
fn test_snapshot_is_fixed_at_start() {
    let store = Arc::new(sample_tree());
    let provider = ProjectionProvider::new(store.clone(), ProviderOptions::new("/virtual"));
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    store.add_file("zeta.txt", b"z".as_slice()).unwrap();

    let mut sink = RecordingSink::with_capacity(16);
    provider.continue_enumeration(id, None, false, &mut sink).unwrap();
    assert_eq!(sink.entries.len(), 5);
    assert!(!sink.names().contains(&"zeta.txt"));
}

#[test]
fn test_nested_entries_carry_relative_paths() {
    let store = MemoryStore::new();
    store.add_file("dir1/subdir/file3.txt", vec![0u8; 300]).unwrap();
    let provider = memory_provider(store);
    let id = EnumerationId::new_v4();

    provider.start_enumeration(id, "DIR1\\subdir", &requester()).unwrap();
    let mut sink = RecordingSink::with_capacity(4);
    provider.continue_enumeration(id, None, false, &mut sink).unwrap();

    assert_eq!(sink.entries.len(), 1);
    assert_eq!(sink.entries[0].relative_path, "DIR1\\subdir\\file3.txt");
    assert_eq!(sink.entries[0].size, 300);
}

// ==================== Session lifecycle ====================

#[test]
fn test_concurrent_start_same_id() {
    let provider = Arc::new(memory_provider(sample_tree()));
    let barrier = Arc::new(Barrier::new(2));
    let id = EnumerationId::new_v4();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let provider = Arc::clone(&provider);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                provider.start_enumeration(id, "", &RequesterContext::anonymous())
            })
        })
        .collect();

    let results: Vec<Result<(), ProviderError>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(ProviderError::AlreadyExists { .. })))
            .count(),
        1
    );
    assert_eq!(provider.active_sessions(), 1);
}

#[test]
fn test_end_twice_is_invalid_session() {
    let provider = memory_provider(sample_tree());
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    provider.end_enumeration(id).unwrap();
    assert!(matches!(
        provider.end_enumeration(id),
        Err(ProviderError::InvalidSession { .. })
    ));
    assert_eq!(provider.active_sessions(), 0);
}

#[test]
fn test_continue_after_end_is_invalid_session() {
    let provider = memory_provider(sample_tree());
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();
    provider.end_enumeration(id).unwrap();

    let mut sink = RecordingSink::with_capacity(4);
    assert!(matches!(
        provider.continue_enumeration(id, None, false, &mut sink),
        Err(ProviderError::InvalidSession { .. })
    ));
}

// ==================== Placeholders ====================

#[test]
fn test_placeholder_missing_path() {
    let provider = memory_provider(sample_tree());
    let result = provider.get_placeholder_info("missing/path", &requester());
    assert!(matches!(result, Err(ProviderError::NotFound { .. })));
}

#[test]
fn test_placeholder_for_file_and_directory() {
    let provider = memory_provider(sample_tree());

    let file = provider.get_placeholder_info("ALPHA.TXT", &requester()).unwrap();
    assert_eq!(file.relative_path, "alpha.txt");
    assert_eq!(file.size, 5);
    assert!(!file.is_directory);
    assert!(!file.attributes.contains(FileAttributes::DIRECTORY));
    assert_eq!(file.content_id, &[0u8][..]);
    assert_eq!(file.provider_id, &[1u8][..]);

    let dir = provider.get_placeholder_info("foo", &requester()).unwrap();
    assert_eq!(dir.relative_path, "Foo");
    assert!(dir.is_directory);
    assert_eq!(dir.size, 0);
    assert!(dir.attributes.contains(FileAttributes::DIRECTORY));
}

#[test]
fn test_placeholder_from_filesystem() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("Docs")).unwrap();
    fs::write(temp_dir.path().join("Docs").join("Notes.md"), b"# notes\n").unwrap();

    let store = FileSystemStore::new(temp_dir.path()).unwrap();
    let provider = ProjectionProvider::new(Arc::new(store), ProviderOptions::new("/virtual"));

    let info = provider.get_placeholder_info("docs\\notes.md", &requester()).unwrap();
    assert_eq!(info.relative_path, "docs\\Notes.md");
    assert_eq!(info.size, 8);
    assert!(provider.query_file_name("Docs/Notes.md").is_ok());
}

#[cfg(unix)]
#[test]
fn test_filesystem_symlink_rewritten_into_virtual_root() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("layer");
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data").join("real.bin"), b"payload").unwrap();
    std::os::unix::fs::symlink(root.join("data").join("real.bin"), root.join("abs-link")).unwrap();
    std::os::unix::fs::symlink("data/real.bin", root.join("rel-link")).unwrap();

    let store = FileSystemStore::new(&root).unwrap();
    let provider = ProjectionProvider::new(Arc::new(store), ProviderOptions::new("/virtual"));

    let abs = provider.get_placeholder_info("abs-link", &requester()).unwrap();
    assert_eq!(
        abs.symlink_target.as_deref(),
        Some(std::path::Path::new("/virtual/data/real.bin"))
    );

    let rel = provider.get_placeholder_info("rel-link", &requester()).unwrap();
    assert_eq!(
        rel.symlink_target.as_deref(),
        Some(std::path::Path::new("data/real.bin"))
    );
}

#[test]
fn test_unreadable_link_fails_placeholder() {
    let inner = MemoryStore::new();
    inner.add_file("a.txt", b"a".as_slice()).unwrap();
    inner.add_symlink("link", "/elsewhere/target", false).unwrap();
    let provider = ProjectionProvider::new(
        Arc::new(UnreadableLinkStore { inner }),
        ProviderOptions::new("/virtual"),
    );

    let result = provider.get_placeholder_info("link", &requester());
    assert!(matches!(result, Err(ProviderError::Internal(_))));
    assert!(provider.get_placeholder_info("a.txt", &requester()).is_ok());
}

#[test]
fn test_unreadable_link_fails_enumeration_without_advancing() {
    let inner = MemoryStore::new();
    inner.add_file("a.txt", b"a".as_slice()).unwrap();
    inner.add_symlink("link", "/elsewhere/target", false).unwrap();
    let provider = ProjectionProvider::new(
        Arc::new(UnreadableLinkStore { inner }),
        ProviderOptions::new("/virtual"),
    );
    let id = EnumerationId::new_v4();
    provider.start_enumeration(id, "", &requester()).unwrap();

    let mut sink = RecordingSink::with_capacity(10);
    let result = provider.continue_enumeration(id, None, false, &mut sink);
    assert!(matches!(result, Err(ProviderError::Internal(_))));
    assert_eq!(sink.names(), vec!["a.txt"]);
    assert_eq!(provider.session_state(id), Some(EnumerationState::Positioned));

    // The cursor stays on the link, so the next call fails on it again.
    sink.clear();
    let result = provider.continue_enumeration(id, None, false, &mut sink);
    assert!(matches!(result, Err(ProviderError::Internal(_))));
    assert!(sink.entries.is_empty());
    assert_eq!(provider.session_state(id), Some(EnumerationState::Positioned));
    assert_eq!(provider.stats_collector().collect().insufficient_buffer, 0);

    provider.end_enumeration(id).unwrap();
}

// ==================== Hydration ====================

#[test]
fn test_hydrate_150k_in_three_chunks() {
    let content: Vec<u8> = (0..150 * 1024).map(|i| (i % 251) as u8).collect();
    let store = MemoryStore::new();
    store.add_file("big.bin", content.clone()).unwrap();
    let provider = memory_provider(store);

    let mut writer = RecordingWriter::new();
    let summary = provider
        .get_file_data(
            "big.bin",
            0,
            150 * 1024,
            uuid::Uuid::new_v4(),
            &requester(),
            &mut writer,
        )
        .unwrap();

    assert_eq!(writer.requested_size, Some(64 * 1024));
    assert_eq!(
        writer.chunks,
        vec![(0, 64 * 1024), (64 * 1024, 64 * 1024), (128 * 1024, 22 * 1024)]
    );
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.bytes, 150 * 1024);
    assert_eq!(writer.data, content);
}

#[test]
fn test_hydrate_streams_whole_file_regardless_of_offset() {
    let temp_dir = TempDir::new().unwrap();
    let content: Vec<u8> = vec![7u8; 10_000];
    fs::write(temp_dir.path().join("file.dat"), &content).unwrap();

    let store = FileSystemStore::new(temp_dir.path()).unwrap();
    let provider = ProjectionProvider::new(
        Arc::new(store),
        ProviderOptions::new("/virtual").with_chunk_size(4096),
    );

    let mut writer = RecordingWriter::new();
    provider
        .get_file_data("file.dat", 4096, 100, uuid::Uuid::new_v4(), &requester(), &mut writer)
        .unwrap();

    // Buffer sized from the requested length; file streamed from byte 0.
    assert_eq!(writer.requested_size, Some(100));
    assert_eq!(writer.chunks.first(), Some(&(0, 100)));
    assert_eq!(writer.chunks.len(), 100);
    assert_eq!(writer.data, content);
}

#[test]
fn test_hydrate_respects_host_capacity() {
    let store = MemoryStore::new();
    store.add_file("f", vec![1u8; 1000]).unwrap();
    let provider = memory_provider(store);

    let mut writer = RecordingWriter::new();
    writer.capacity_limit = Some(300);
    provider
        .get_file_data("f", 0, 1000, uuid::Uuid::new_v4(), &requester(), &mut writer)
        .unwrap();

    assert_eq!(writer.chunks, vec![(0, 300), (300, 300), (600, 300), (900, 100)]);
}

#[test]
fn test_hydrate_small_chunk_size_honors_write_alignment() {
    let content: Vec<u8> = (0..10_000).map(|i| (i % 239) as u8).collect();
    let store = MemoryStore::new();
    store.add_file("f", content.clone()).unwrap();
    let provider = ProjectionProvider::new(
        Arc::new(store),
        ProviderOptions::new("/virtual").with_chunk_size(1000),
    );

    let mut writer = RecordingWriter::new();
    writer.alignment = 4096;
    let summary = provider
        .get_file_data("f", 0, 10_000, uuid::Uuid::new_v4(), &requester(), &mut writer)
        .unwrap();

    assert_eq!(writer.requested_size, Some(1000));
    assert_eq!(writer.chunks, vec![(0, 4096), (4096, 4096), (8192, 1808)]);
    assert_eq!(summary.bytes, 10_000);
    assert_eq!(writer.data, content);
}

#[test]
fn test_hydrate_out_of_memory() {
    let store = MemoryStore::new();
    store.add_file("f", vec![1u8; 10]).unwrap();
    let provider = memory_provider(store);

    let mut writer = RecordingWriter::new();
    writer.fail_allocation = true;
    let result = provider.get_file_data("f", 0, 10, uuid::Uuid::new_v4(), &requester(), &mut writer);
    assert!(matches!(result, Err(ProviderError::OutOfMemory { .. })));
    assert!(writer.chunks.is_empty());
}

#[test]
fn test_hydrate_rejected_write_is_internal() {
    let store = MemoryStore::new();
    store.add_file("f", vec![1u8; 200 * 1024]).unwrap();
    let provider = memory_provider(store);

    let mut writer = RecordingWriter::new();
    writer.reject_at = Some(64 * 1024);
    let result = provider.get_file_data(
        "f",
        0,
        200 * 1024,
        uuid::Uuid::new_v4(),
        &requester(),
        &mut writer,
    );
    assert!(matches!(result, Err(ProviderError::Internal(_))));
    assert_eq!(writer.chunks, vec![(0, 64 * 1024)]);
}

#[test]
fn test_hydrate_missing_file() {
    let provider = memory_provider(sample_tree());
    let mut writer = RecordingWriter::new();
    let result = provider.get_file_data(
        "nope.bin",
        0,
        10,
        uuid::Uuid::new_v4(),
        &requester(),
        &mut writer,
    );
    assert!(matches!(result, Err(ProviderError::NotFound { .. })));
    assert!(writer.requested_size.is_none());
}

#[test]
fn test_empty_file_hydrates_without_chunks() {
    let store = MemoryStore::new();
    store.add_file("empty", Vec::<u8>::new()).unwrap();
    let provider = memory_provider(store);

    let mut writer = RecordingWriter::new();
    let summary = provider
        .get_file_data("empty", 0, 0, uuid::Uuid::new_v4(), &requester(), &mut writer)
        .unwrap();

    assert_eq!(summary.chunks, 0);
    assert!(writer.chunks.is_empty());
}

// ==================== Stats ====================

#[test]
fn test_stats_track_operations() {
    let store = sample_tree();
    assert!(store.exists("Foo"));
    let provider = memory_provider(store);

    enumerate_all(&provider, "", None);
    provider.get_placeholder_info("alpha.txt", &requester()).unwrap();
    let mut writer = RecordingWriter::new();
    provider
        .get_file_data("alpha.txt", 0, 5, uuid::Uuid::new_v4(), &requester(), &mut writer)
        .unwrap();

    let stats = provider.stats_collector().collect();
    assert_eq!(stats.enumerations_started, 1);
    assert_eq!(stats.enumerations_ended, 1);
    assert_eq!(stats.entries_returned, 5);
    assert_eq!(stats.placeholders_written, 1);
    assert_eq!(stats.files_hydrated, 1);
    assert_eq!(stats.bytes_hydrated, 5);
    assert_eq!(stats.active_sessions, 0);
}
