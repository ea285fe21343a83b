//! Buffer cache for block I/O.
//!
//! The cache holds a fixed pool of block-sized buffers with cached copies of
//! disk block contents. Caching reduces the number of disk reads and gives
//! concurrent kernel threads a single synchronization point per block.
//!
//! Buffers are spread over hash buckets keyed by block number. Each bucket
//! has its own short-held lock protecting bucket membership and reference
//! counts; the contents of each buffer are protected by a sleep lock that the
//! user holds for as long as it works with the block.
//!
//! Interface:
//!
//! * To get a buffer for a particular disk block, call
//!   [`BufferCache::read`].
//! * After changing buffer data, call [`BufGuard::write`] to write it to
//!   disk.
//! * When done with the buffer, call [`BufGuard::release`] or drop it.
//! * Only one thread at a time can use a buffer, so do not keep them longer
//!   than necessary.
//! * To keep a block resident without holding its lock (e.g. until a log
//!   commit installs it), take a [`BufPin`] with [`BufGuard::pin`].
#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::boxed::Box;

mod bucket;
mod cache;
mod config;
mod guard;
mod key;
mod stats;

pub use self::{
    bucket::Bucket,
    cache::{BufferCache, SlotInfo},
    config::{CacheConfig, ConfigError, EvictionScan},
    guard::{BufGuard, BufPin},
    key::{BlockKey, BlockNo, DeviceNo},
    stats::CacheStats,
};

/// A trait representing a block device with a fixed block size.
///
/// # Constants
///
/// * `BLOCK_SIZE`: The size of each block in bytes.
pub trait BlockDevice<const BLOCK_SIZE: usize> {
    /// The error type that can be returned by the block device operations.
    ///
    /// The cache passes these errors through without inspecting them.
    type Error;

    /// Reads the block identified by `key` into `data`.
    fn read(&self, key: BlockKey, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error>;

    /// Writes `data` to the block identified by `key`.
    fn write(&self, key: BlockKey, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error>;
}

impl<Device, const BLOCK_SIZE: usize> BlockDevice<BLOCK_SIZE> for &Device
where
    Device: BlockDevice<BLOCK_SIZE> + ?Sized,
{
    type Error = Device::Error;

    fn read(&self, key: BlockKey, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        (**self).read(key, data)
    }

    fn write(&self, key: BlockKey, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        (**self).write(key, data)
    }
}

/// Contents of a buffer, guarded by the buffer's sleep lock.
pub struct BlockData<const BLOCK_SIZE: usize = { bcache_params::BLOCK_SIZE }> {
    /// Block the contents belong to.
    ///
    /// Differs from the bucket's key after the buffer was recycled and
    /// nobody has locked it since.
    pub(crate) key: Option<BlockKey>,
    /// Has data been read from disk?
    pub(crate) valid: bool,
    pub(crate) data: Box<[u8; BLOCK_SIZE]>,
}

impl<const BLOCK_SIZE: usize> Default for BlockData<BLOCK_SIZE> {
    fn default() -> Self {
        Self {
            key: None,
            valid: false,
            data: Box::new([0; BLOCK_SIZE]),
        }
    }
}
