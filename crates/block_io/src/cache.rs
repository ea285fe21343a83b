//! Lookup-or-allocate over the hashed buffer pool.

use alloc::{boxed::Box, vec::Vec};
use core::{
    cmp, iter,
    sync::atomic::{AtomicU64, Ordering},
};

use mutex_api::{Mutex, SleepMutex};
use tracing::{debug, error, info, trace};

use crate::{
    BlockData, BlockDevice, BlockKey, BlockNo, Bucket, BufGuard, CacheConfig, CacheStats,
    ConfigError, DeviceNo, EvictionScan,
    bucket::Entry,
    guard::SlotRef,
    stats::Counters,
};

/// A buffer cache over `Device`.
///
/// # Type Parameters
///
/// * `BucketMutex`: short-held lock guarding one hash bucket. Never held
///   across device I/O.
/// * `BlockMutex`: sleep lock guarding the contents of one buffer.
pub struct BufferCache<Device, BucketMutex, BlockMutex> {
    device: Device,
    buckets: Box<[BucketMutex]>,
    blocks: Box<[BlockMutex]>,
    eviction: EvictionScan,
    /// Source of recency marks.
    clock: AtomicU64,
    pub(crate) stats: Counters,
}

/// Bookkeeping of a resident buffer, as seen under its bucket lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub key: BlockKey,
    /// Index of the buffer in the pool.
    pub slot: usize,
    /// Bucket the buffer belongs to.
    pub bucket: usize,
    pub ref_count: usize,
    pub recency_mark: u64,
}

impl SlotInfo {
    fn from_entry(bucket: usize, entry: &Entry) -> Option<Self> {
        Some(Self {
            key: entry.key?,
            slot: entry.slot,
            bucket,
            ref_count: entry.ref_count,
            recency_mark: entry.recency_mark,
        })
    }
}

impl<Device, BucketMutex, BlockMutex, const BLOCK_SIZE: usize>
    BufferCache<Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
    BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>>,
{
    /// Creates a cache with the pool and buckets described by `config`.
    ///
    /// All buffers start out unbound in bucket 0.
    pub fn new(device: Device, config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let CacheConfig {
            num_buffers,
            num_buckets,
            eviction,
        } = config;

        // buffer 0 ends up at the least recently inserted end.
        let mut first = Bucket::default();
        for slot in 0..num_buffers {
            first.push_front(Entry::unbound(slot));
        }
        let buckets = iter::once(first)
            .chain(iter::repeat_with(Bucket::default).take(num_buckets - 1))
            .map(BucketMutex::new)
            .collect();
        let blocks = iter::repeat_with(|| BlockMutex::new(BlockData::default()))
            .take(num_buffers)
            .collect();

        info!(num_buffers, num_buckets, %eviction, "bcache: initialized");

        Ok(Self {
            device,
            buckets,
            blocks,
            eviction,
            clock: AtomicU64::new(0),
            stats: Counters::default(),
        })
    }

    /// Returns a locked buffer bound to the given block.
    ///
    /// If the block is cached, returns its buffer. Otherwise recycles an
    /// unreferenced buffer, following the configured [`EvictionScan`].
    /// If no unreferenced buffer is found, returns `None`.
    ///
    /// The contents are not read from the device.
    pub fn try_get(
        &self,
        dev: DeviceNo,
        block_no: BlockNo,
    ) -> Option<BufGuard<'_, Device, BucketMutex, BlockMutex, BLOCK_SIZE, false>> {
        let key = BlockKey::new(dev, block_no);
        let slot = self.acquire(key)?;
        Some(SlotRef::new(self, key, slot).lock())
    }

    /// Returns a locked buffer bound to the given block.
    ///
    /// # Panics
    ///
    /// Panics if all buffers are referenced.
    pub fn get(
        &self,
        dev: DeviceNo,
        block_no: BlockNo,
    ) -> BufGuard<'_, Device, BucketMutex, BlockMutex, BLOCK_SIZE, false> {
        let Some(buf) = self.try_get(dev, block_no) else {
            error!(%dev, %block_no, "bcache: no buffers");
            panic!("block buffer exhausted");
        };
        buf
    }

    /// Returns a locked buffer with the contents of the given block.
    ///
    /// Reads from the device only if the cached contents are not valid.
    ///
    /// # Panics
    ///
    /// Panics if all buffers are referenced.
    pub fn read(
        &self,
        dev: DeviceNo,
        block_no: BlockNo,
    ) -> Result<BufGuard<'_, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true>, Device::Error>
    where
        Device: BlockDevice<BLOCK_SIZE>,
    {
        self.get(dev, block_no).read().map_err(|(_buf, e)| e)
    }
}

impl<Device, BucketMutex, BlockMutex> BufferCache<Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    /// Returns the underlying device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns the number of buffers in the pool.
    pub fn num_buffers(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the number of hash buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn eviction(&self) -> EvictionScan {
        self.eviction
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Returns the bookkeeping of the buffer bound to the given block, if
    /// it is resident.
    pub fn inspect(&self, dev: DeviceNo, block_no: BlockNo) -> Option<SlotInfo> {
        let key = BlockKey::new(dev, block_no);
        let index = self.bucket_of(key);
        let bucket = self.buckets[index].lock();
        bucket
            .find(key)
            .and_then(|entry| SlotInfo::from_entry(index, entry))
    }

    /// Returns the bookkeeping of all bound buffers.
    ///
    /// Buckets are locked one at a time, so the result is only consistent
    /// when no other thread uses the cache.
    pub fn snapshot(&self) -> Vec<SlotInfo> {
        let mut infos = Vec::with_capacity(self.blocks.len());
        for (index, bucket) in self.buckets.iter().enumerate() {
            let bucket = bucket.lock();
            infos.extend(
                bucket
                    .entries()
                    .filter_map(|entry| SlotInfo::from_entry(index, entry)),
            );
        }
        infos
    }

    pub(crate) fn block(&self, slot: usize) -> &BlockMutex {
        &self.blocks[slot]
    }

    fn bucket_of(&self, key: BlockKey) -> usize {
        key.bucket_index(self.buckets.len())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Looks up the buffer for `key`, recycling a free one on a miss.
    ///
    /// Returns the buffer index with its reference count already taken.
    fn acquire(&self, key: BlockKey) -> Option<usize> {
        let home = self.bucket_of(key);
        let mut home_bucket = self.buckets[home].lock();

        // Is the block already cached?
        if let Some(entry) = home_bucket.find_mut(key) {
            entry.ref_count += 1;
            let slot = entry.slot;
            drop(home_bucket);
            self.stats.hit();
            trace!(%key, slot, "bcache: hit");
            return Some(slot);
        }

        // Not cached.
        let slot = self.evict(key, home, home_bucket);
        if slot.is_none() {
            self.stats.exhausted();
        }
        slot
    }

    /// Finds a free buffer in other buckets and moves it to `home`, bound
    /// to `key`.
    fn evict<'a>(
        &'a self,
        key: BlockKey,
        home: usize,
        home_bucket: BucketMutex::Guard<'a>,
    ) -> Option<usize> {
        match self.eviction {
            EvictionScan::HoldHome => self.evict_holding_home(key, home, home_bucket),
            EvictionScan::LockOrdered => {
                drop(home_bucket);
                self.evict_lock_ordered(key, home)
            }
        }
    }

    fn evict_holding_home<'a>(
        &'a self,
        key: BlockKey,
        home: usize,
        mut home_bucket: BucketMutex::Guard<'a>,
    ) -> Option<usize> {
        let n = self.buckets.len();
        for index in (1..n).map(|d| (home + d) % n) {
            let mut donor = self.buckets[index].lock();
            let Some(entry) = donor.take_free() else {
                continue;
            };
            let slot = self.rebind(entry, key, &mut home_bucket, index);
            drop(donor);
            drop(home_bucket);
            return Some(slot);
        }
        None
    }

    fn evict_lock_ordered(&self, key: BlockKey, home: usize) -> Option<usize> {
        let n = self.buckets.len();
        for index in (1..=n).map(|d| (home + d) % n) {
            let (mut home_bucket, mut donor) = match index.cmp(&home) {
                cmp::Ordering::Less => {
                    let donor = self.buckets[index].lock();
                    (self.buckets[home].lock(), Some(donor))
                }
                cmp::Ordering::Equal => (self.buckets[home].lock(), None),
                cmp::Ordering::Greater => {
                    let home_bucket = self.buckets[home].lock();
                    (home_bucket, Some(self.buckets[index].lock()))
                }
            };

            // Another thread may have cached the block while no lock was held.
            if let Some(entry) = home_bucket.find_mut(key) {
                entry.ref_count += 1;
                let slot = entry.slot;
                self.stats.hit();
                trace!(%key, slot, "bcache: hit after concurrent miss");
                return Some(slot);
            }

            let taken = match &mut donor {
                Some(donor) => donor.take_free(),
                None => home_bucket.take_free(),
            };
            let Some(entry) = taken else {
                continue;
            };
            let slot = self.rebind(entry, key, &mut home_bucket, index);
            drop(donor);
            drop(home_bucket);
            return Some(slot);
        }
        None
    }

    /// Binds an unlinked free buffer to `key` and links it into the home
    /// bucket.
    fn rebind(
        &self,
        mut entry: Entry,
        key: BlockKey,
        home_bucket: &mut Bucket,
        donor: usize,
    ) -> usize {
        let previous = entry.key;
        entry.key = Some(key);
        entry.ref_count = 1;
        entry.recency_mark = self.tick();
        home_bucket.push_front(entry);
        self.stats.miss();
        debug!(%key, slot = entry.slot, donor, ?previous, "bcache: recycle");
        entry.slot
    }

    fn with_entry<T>(&self, key: BlockKey, slot: usize, f: impl FnOnce(&mut Entry) -> T) -> T {
        // A referenced buffer is never recycled, so it stays in its key's bucket.
        let index = self.bucket_of(key);
        let mut bucket = self.buckets[index].lock();
        let Some(entry) = bucket.slot_mut(slot) else {
            panic!("bcache: buffer {slot} of {key} missing from bucket {index}");
        };
        assert_eq!(entry.key, Some(key));
        f(entry)
    }

    pub(crate) fn ref_count(&self, key: BlockKey, slot: usize) -> usize {
        self.with_entry(key, slot, |entry| entry.ref_count)
    }

    pub(crate) fn pin(&self, key: BlockKey, slot: usize) {
        self.with_entry(key, slot, |entry| entry.ref_count += 1);
        trace!(%key, slot, "bcache: pin");
    }

    /// Drops one reference to the buffer.
    ///
    /// If `stamp` is set and this was the last reference, the buffer becomes
    /// the most recently released one.
    pub(crate) fn put(&self, key: BlockKey, slot: usize, stamp: bool) {
        self.with_entry(key, slot, |entry| {
            assert!(entry.ref_count > 0, "bcache: {key} released too often");
            entry.ref_count -= 1;
            if entry.ref_count == 0 && stamp {
                entry.recency_mark = self.tick();
            }
        });
    }
}
