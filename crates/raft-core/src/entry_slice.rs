//! # entry_slice
//!
//! why: pass runs of entries between layers without copying them
//! relations: accepted by unstable.rs and raft_log.rs append paths
//! what: EntrySlice, a borrowed view with offset sub-slicing

use std::ops::Index;

use crate::fatal;
use crate::log::Entry;

/// A read-only window over a contiguous run of log entries.
///
/// Sub-slicing produces another view into the same backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySlice<'a> {
    entries: &'a [Entry],
}

impl<'a> EntrySlice<'a> {
    pub fn new(entries: &'a [Entry]) -> Self {
        Self { entries }
    }

    /// View of `size` entries starting `first` positions into this view
    pub fn sub(&self, first: usize, size: usize) -> EntrySlice<'a> {
        match first.checked_add(size) {
            Some(end) if end <= self.entries.len() => Self::new(&self.entries[first..end]),
            _ => fatal!(
                "entry slice [{}, +{}) out of bounds (len {})",
                first,
                size,
                self.entries.len()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&'a Entry> {
        self.entries.get(i)
    }

    pub fn first(&self) -> Option<&'a Entry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&'a Entry> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Entry> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &'a [Entry] {
        self.entries
    }

    /// Copies the viewed entries out; used where they cross into owned storage
    pub fn to_vec(&self) -> Vec<Entry> {
        self.entries.to_vec()
    }
}

impl Index<usize> for EntrySlice<'_> {
    type Output = Entry;

    fn index(&self, i: usize) -> &Entry {
        &self.entries[i]
    }
}

impl<'a> From<&'a [Entry]> for EntrySlice<'a> {
    fn from(entries: &'a [Entry]) -> Self {
        Self::new(entries)
    }
}

impl<'a> From<&'a Vec<Entry>> for EntrySlice<'a> {
    fn from(entries: &'a Vec<Entry>) -> Self {
        Self::new(entries.as_slice())
    }
}

impl<'a> IntoIterator for EntrySlice<'a> {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
