//! Compile-time parameters of the buffer cache.

#![no_std]

/// Max # of blocks any FS op writes.
pub const MAX_OP_BLOCKS: usize = 10;

/// Size of disk block cache.
pub const NBUF: usize = MAX_OP_BLOCKS * 3;

/// Number of hash buckets the cache is split into.
///
/// Prime, so that block numbers with a common stride still spread out.
pub const NBUCKET: usize = 13;

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Device number of file system root disk.
pub const ROOT_DEV: u32 = 1;
