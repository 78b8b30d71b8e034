//! Active enumeration session management.
//!
//! Tracks the cursor and sticky search expression of one directory
//! enumeration across the host's repeated calls.

use std::sync::Arc;

use crate::error::ProviderError;
use crate::projection::types::ProjectedFileInfo;
use crate::util::compare::{
    prj_does_name_contain_wildcards, prj_file_name_equals, prj_file_name_match,
};

/// Observable phase of an enumeration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationState {
    /// No continuation call has captured a filter yet.
    Fresh,
    /// A filter is captured and the cursor is on a matching item.
    Positioned,
    /// The cursor is past the last matching item.
    Exhausted,
}

/// Search expression of a session. Written at most once per scan.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterState {
    Uncaptured,
    /// `None` means match everything.
    Captured(Option<Box<str>>),
}

/// Active enumeration session.
///
/// Holds a snapshot of the directory taken at session start and the
/// current position. Analogous to VFSForGit's `ActiveEnumeration`.
#[derive(Debug)]
pub struct ActiveEnumeration {
    /// Directory being enumerated, relative to the root.
    directory: Arc<str>,
    /// Pre-loaded items (sorted in ProjFS order).
    items: Arc<[ProjectedFileInfo]>,
    /// Current position in items; `items.len()` once exhausted.
    index: usize,
    filter: FilterState,
}

impl ActiveEnumeration {
    /// Create new enumeration with pre-loaded items.
    ///
    /// # Arguments
    /// * `items` - Pre-sorted list of items to enumerate
    pub fn new(items: Arc<[ProjectedFileInfo]>) -> Self {
        Self {
            directory: Arc::from(""),
            items,
            index: 0,
            filter: FilterState::Uncaptured,
        }
    }

    /// Set the directory this session enumerates.
    ///
    /// # Arguments
    /// * `directory` - Directory path relative to the root
    pub fn with_directory(mut self, directory: impl Into<Arc<str>>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Directory this session enumerates.
    pub fn directory(&self) -> &Arc<str> {
        &self.directory
    }

    /// Get current item if valid.
    ///
    /// # Returns
    /// Reference to current item, or None if past end.
    pub fn current(&self) -> Option<&ProjectedFileInfo> {
        self.items.get(self.index)
    }

    /// Check if current position is valid.
    pub fn is_current_valid(&self) -> bool {
        self.index < self.items.len()
    }

    /// Current phase of the session.
    pub fn state(&self) -> EnumerationState {
        if !self.is_current_valid() {
            EnumerationState::Exhausted
        } else if self.filter == FilterState::Uncaptured {
            EnumerationState::Fresh
        } else {
            EnumerationState::Positioned
        }
    }

    /// Captured filter, if any. `Some(None)` means match-all was captured.
    pub fn filter(&self) -> Option<Option<&str>> {
        match &self.filter {
            FilterState::Uncaptured => None,
            FilterState::Captured(pattern) => Some(pattern.as_deref()),
        }
    }

    /// Move to next item (skipping filtered items).
    ///
    /// # Returns
    /// True if moved to a valid item, false if past end.
    pub fn move_next(&mut self) -> bool {
        if self.is_current_valid() {
            self.index += 1;
        }
        self.skip_filtered();
        self.is_current_valid()
    }

    /// Restart enumeration with new filter.
    ///
    /// The filter is replaced unconditionally and the cursor moves to the
    /// first matching item.
    ///
    /// # Arguments
    /// * `filter` - Optional wildcard filter pattern
    pub fn restart(&mut self, filter: Option<&str>) {
        self.index = 0;
        self.filter = FilterState::Captured(normalize_filter(filter));
        self.skip_filtered();
    }

    /// Try to save filter (only on first call).
    ///
    /// On success the cursor skips forward from its current position to
    /// the first matching item.
    ///
    /// # Arguments
    /// * `filter` - Optional wildcard filter pattern
    ///
    /// # Returns
    /// True if filter was saved, false if already captured.
    pub fn try_save_filter(&mut self, filter: Option<&str>) -> bool {
        if self.filter != FilterState::Uncaptured {
            return false;
        }

        self.filter = FilterState::Captured(normalize_filter(filter));
        self.skip_filtered();
        true
    }

    /// Offer items to a bounded result buffer until it rejects one.
    ///
    /// `offer` returns whether the buffer accepted the item. A rejected item
    /// stays current so the next call retries it.
    ///
    /// # Arguments
    /// * `offer` - Adds an item to the result buffer
    ///
    /// # Returns
    /// Number of items accepted.
    ///
    /// # Errors
    /// `InsufficientBuffer` if the first offered item is rejected; any error
    /// `offer` returns is passed through without advancing.
    pub fn fill<F>(&mut self, mut offer: F) -> Result<usize, ProviderError>
    where
        F: FnMut(&ProjectedFileInfo) -> Result<bool, ProviderError>,
    {
        let mut accepted: usize = 0;

        while let Some(item) = self.current() {
            if offer(item)? {
                accepted += 1;
                self.move_next();
            } else if accepted == 0 {
                return Err(ProviderError::InsufficientBuffer);
            } else {
                break;
            }
        }

        Ok(accepted)
    }

    /// Skip items that don't match filter.
    fn skip_filtered(&mut self) {
        while let Some(item) = self.current() {
            if self.matches_filter(item) {
                break;
            }
            self.index += 1;
        }
    }

    /// Check if item matches current filter.
    ///
    /// # Arguments
    /// * `item` - Item to check
    ///
    /// # Returns
    /// True if item matches filter (or no filter set).
    fn matches_filter(&self, item: &ProjectedFileInfo) -> bool {
        match &self.filter {
            FilterState::Uncaptured | FilterState::Captured(None) => true,
            FilterState::Captured(Some(pattern)) if prj_does_name_contain_wildcards(pattern) => {
                prj_file_name_match(&item.name, pattern)
            }
            FilterState::Captured(Some(pattern)) => prj_file_name_equals(&item.name, pattern),
        }
    }

    /// Get total item count.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if enumeration is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Absent, empty and `*` all mean match everything.
fn normalize_filter(filter: Option<&str>) -> Option<Box<str>> {
    match filter {
        None | Some("") | Some("*") => None,
        Some(pattern) => Some(pattern.into()),
    }
}
