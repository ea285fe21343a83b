//! Hash bucket of the buffer cache.

use alloc::collections::VecDeque;

use crate::BlockKey;

/// Bookkeeping for one buffer, owned by the bucket the buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    /// Index of the buffer in the cache's buffer pool.
    pub(crate) slot: usize,
    /// Block currently bound to the buffer.
    pub(crate) key: Option<BlockKey>,
    /// Number of holders and pins.
    pub(crate) ref_count: usize,
    /// Recency mark, larger is more recent.
    pub(crate) recency_mark: u64,
}

impl Entry {
    pub(crate) const fn unbound(slot: usize) -> Self {
        Self {
            slot,
            key: None,
            ref_count: 0,
            recency_mark: 0,
        }
    }
}

/// A list of buffers sharing a hash bucket, guarded by the bucket's lock.
///
/// `entries.front()` is the most recently inserted buffer, `entries.back()`
/// the least.
#[derive(Debug, Default)]
pub struct Bucket {
    entries: VecDeque<Entry>,
}

impl Bucket {
    /// Returns the number of buffers in this bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no buffer belongs to this bucket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Finds the buffer bound to `key`.
    pub(crate) fn find(&self, key: BlockKey) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == Some(key))
    }

    /// Finds the buffer bound to `key`.
    pub(crate) fn find_mut(&mut self, key: BlockKey) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.key == Some(key))
    }

    /// Finds the entry of the buffer at `slot`.
    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.slot == slot)
    }

    /// Unlinks the first unreferenced buffer, walking from the least
    /// recently inserted end.
    pub(crate) fn take_free(&mut self) -> Option<Entry> {
        let pos = self.entries.iter().rposition(|e| e.ref_count == 0)?;
        self.entries.remove(pos)
    }

    /// Links `entry` as the most recently inserted buffer.
    pub(crate) fn push_front(&mut self, entry: Entry) {
        self.entries.push_front(entry);
    }
}
