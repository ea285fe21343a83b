//! Cache activity counters.

use core::sync::atomic::{AtomicUsize, Ordering};

/// A snapshot of cache activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found the block already resident.
    pub hits: usize,
    /// Lookups that rebound a free buffer to the block.
    pub misses: usize,
    /// Lookups that found no free buffer.
    pub exhausted: usize,
    /// Blocks read from the device.
    pub device_reads: usize,
    /// Blocks written to the device.
    pub device_writes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    exhausted: AtomicUsize,
    device_reads: AtomicUsize,
    device_writes: AtomicUsize,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn device_read(&self) {
        self.device_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn device_write(&self) {
        self.device_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            device_reads: self.device_reads.load(Ordering::Relaxed),
            device_writes: self.device_writes.load(Ordering::Relaxed),
        }
    }
}
