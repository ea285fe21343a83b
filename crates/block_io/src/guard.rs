//! Handles to buffers held by users of the cache.

use core::fmt;

use dataview::{Pod, PodMethods as _};
use mutex_api::{Mutex, SleepMutex};
use tracing::{debug, error, trace};

use crate::{BlockData, BlockDevice, BlockKey, BlockNo, Bucket, BufferCache, DeviceNo};

/// A counted reference to a buffer, without its contents lock.
///
/// Drops the reference on drop, stamping the recency mark if it was the
/// last one.
pub(crate) struct SlotRef<'a, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    cache: &'a BufferCache<Device, BucketMutex, BlockMutex>,
    key: BlockKey,
    slot: usize,
}

impl<Device, BucketMutex, BlockMutex> Drop for SlotRef<'_, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    fn drop(&mut self) {
        self.cache.put(self.key, self.slot, true);
        trace!(key = %self.key, slot = self.slot, "bcache: release");
    }
}

impl<'a, Device, BucketMutex, BlockMutex> SlotRef<'a, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    /// Wraps a reference already counted in the buffer's bucket.
    pub(crate) fn new(
        cache: &'a BufferCache<Device, BucketMutex, BlockMutex>,
        key: BlockKey,
        slot: usize,
    ) -> Self {
        Self { cache, key, slot }
    }

    /// Acquires the buffer's sleep lock.
    pub(crate) fn lock<const BLOCK_SIZE: usize>(
        self,
    ) -> BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, false>
    where
        BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>> + 'a,
    {
        let cache = self.cache;
        let mut data = cache.block(self.slot).lock();

        if data.key != Some(self.key) {
            // buffer recycle occurred
            data.key = Some(self.key);
            data.valid = false;
        }

        BufGuard { data, slot: self }
    }
}

/// A locked buffer providing exclusive access to its contents.
///
/// `VALID` tells whether the contents are known to match the disk (or have
/// been fully overwritten).
///
/// Dropping the guard releases the buffer: the sleep lock is released first,
/// then the reference is dropped.
pub struct BufGuard<
    'a,
    Device,
    BucketMutex,
    BlockMutex,
    const BLOCK_SIZE: usize,
    const VALID: bool,
> where
    BucketMutex: Mutex<Data = Bucket>,
    BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>> + 'a,
{
    // Declared before `slot` so that it drops first.
    data: BlockMutex::Guard<'a>,
    slot: SlotRef<'a, Device, BucketMutex, BlockMutex>,
}

impl<'a, Device, BucketMutex, BlockMutex, const BLOCK_SIZE: usize, const VALID: bool> fmt::Debug
    for BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, VALID>
where
    BucketMutex: Mutex<Data = Bucket>,
    BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>> + 'a,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufGuard")
            .field("key", &self.slot.key)
            .field("slot", &self.slot.slot)
            .field("valid", &self.data.valid)
            .finish_non_exhaustive()
    }
}

impl<'a, Device, BucketMutex, BlockMutex, const BLOCK_SIZE: usize, const VALID: bool>
    BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, VALID>
where
    BucketMutex: Mutex<Data = Bucket>,
    BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>> + 'a,
{
    /// Returns the block this buffer is bound to.
    pub fn key(&self) -> BlockKey {
        self.slot.key
    }

    /// Returns the device number of the block.
    pub fn dev(&self) -> DeviceNo {
        self.slot.key.dev
    }

    /// Returns the block number.
    pub fn block_no(&self) -> BlockNo {
        self.slot.key.block_no
    }

    /// Returns the index of the buffer in the pool.
    pub fn slot(&self) -> usize {
        self.slot.slot
    }

    /// Returns `true` if the contents reflect the block.
    pub fn is_valid(&self) -> bool {
        self.data.valid
    }

    /// Returns the number of holders and pins of this buffer.
    pub fn ref_count(&self) -> usize {
        self.slot.cache.ref_count(self.slot.key, self.slot.slot)
    }

    /// Keeps the buffer resident after this guard is released.
    ///
    /// The buffer cannot be recycled until the returned pin is dropped.
    pub fn pin(&self) -> BufPin<'a, Device, BucketMutex, BlockMutex> {
        let (cache, key, slot) = (self.slot.cache, self.slot.key, self.slot.slot);
        cache.pin(key, slot);
        BufPin { cache, key, slot }
    }

    /// Sets the whole block data.
    pub fn set_data(
        mut self,
        data: &[u8],
    ) -> BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true> {
        self.data.valid = true;
        self.data.data.copy_from_slice(data);
        self.into_valid()
    }

    /// Fills the whole block data with zero.
    pub fn zeroed(mut self) -> BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true> {
        self.data.valid = true;
        self.data.data.fill(0);
        self.into_valid()
    }

    /// Converts to a valid guard if the contents are valid.
    pub fn try_validate(
        self,
    ) -> Result<BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true>, Self> {
        if self.data.valid {
            Ok(self.into_valid())
        } else {
            Err(self)
        }
    }

    /// Releases the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the buffer's lock.
    pub fn release(self) {
        if !self.holding() {
            error!(key = %self.slot.key, "bcache: release without holding");
            panic!("brelse: not holding");
        }
    }

    fn holding(&self) -> bool {
        self.slot.cache.block(self.slot.slot).holding()
    }

    fn into_valid(self) -> BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true> {
        BufGuard {
            data: self.data,
            slot: self.slot,
        }
    }
}

impl<'a, Device, BucketMutex, BlockMutex, const BLOCK_SIZE: usize, const VALID: bool>
    BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, VALID>
where
    Device: BlockDevice<BLOCK_SIZE>,
    BucketMutex: Mutex<Data = Bucket>,
    BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>> + 'a,
{
    /// Reads the block from disk if cached data is not valid.
    ///
    /// On error the guard is handed back together with the device error.
    #[expect(clippy::type_complexity)]
    pub fn read(
        mut self,
    ) -> Result<
        BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true>,
        (Self, Device::Error),
    > {
        if !self.data.valid {
            let cache = self.slot.cache;
            if let Err(e) = cache.device().read(self.slot.key, &mut self.data.data) {
                return Err((self, e));
            }
            self.data.valid = true;
            cache.stats.device_read();
            debug!(key = %self.slot.key, slot = self.slot.slot, "bcache: read");
        }
        Ok(self.into_valid())
    }
}

impl<'a, Device, BucketMutex, BlockMutex, const BLOCK_SIZE: usize>
    BufGuard<'a, Device, BucketMutex, BlockMutex, BLOCK_SIZE, true>
where
    BucketMutex: Mutex<Data = Bucket>,
    BlockMutex: SleepMutex<Data = BlockData<BLOCK_SIZE>> + 'a,
{
    /// Returns a reference to the block data bytes.
    pub fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.data.data
    }

    /// Returns a mutable reference to the block data bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.data.data
    }

    /// Returns a reference to the block data as POD.
    pub fn data<T>(&self) -> &T
    where
        T: Pod,
    {
        self.bytes().as_data_view().get(0)
    }

    /// Returns a mutable reference to the block data as POD.
    pub fn data_mut<T>(&mut self) -> &mut T
    where
        T: Pod,
    {
        self.bytes_mut().as_data_view_mut().get_mut(0)
    }

    /// Writes the block to disk.
    ///
    /// Does not release the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the buffer's lock.
    pub fn write(&mut self) -> Result<(), Device::Error>
    where
        Device: BlockDevice<BLOCK_SIZE>,
    {
        if !self.holding() {
            error!(key = %self.slot.key, "bcache: write without holding");
            panic!("bwrite: not holding");
        }
        let cache = self.slot.cache;
        cache.device().write(self.slot.key, &self.data.data)?;
        cache.stats.device_write();
        debug!(key = %self.slot.key, slot = self.slot.slot, "bcache: write");
        Ok(())
    }
}

/// A pin keeping a buffer resident without holding its lock.
///
/// Unpins on drop.
pub struct BufPin<'a, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    cache: &'a BufferCache<Device, BucketMutex, BlockMutex>,
    key: BlockKey,
    slot: usize,
}

impl<Device, BucketMutex, BlockMutex> fmt::Debug for BufPin<'_, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufPin")
            .field("key", &self.key)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<Device, BucketMutex, BlockMutex> Drop for BufPin<'_, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    fn drop(&mut self) {
        self.cache.put(self.key, self.slot, false);
        trace!(key = %self.key, slot = self.slot, "bcache: unpin");
    }
}

impl<Device, BucketMutex, BlockMutex> BufPin<'_, Device, BucketMutex, BlockMutex>
where
    BucketMutex: Mutex<Data = Bucket>,
{
    /// Returns the pinned block.
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// Returns the index of the pinned buffer in the pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Unpins the buffer. Same as dropping the pin.
    pub fn unpin(self) {}
}
