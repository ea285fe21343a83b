//! Identity of a cached block.

use core::fmt;

/// Device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DeviceNo(u32);

impl fmt::Display for DeviceNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DeviceNo {
    /// Device holding the root file system.
    pub const ROOT: Self = Self(bcache_params::ROOT_DEV);

    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Block number within a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockNo(u32);

impl fmt::Display for BlockNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BlockNo {
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// Cache key: a block on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub dev: DeviceNo,
    pub block_no: BlockNo,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.block_no)
    }
}

impl BlockKey {
    #[must_use]
    pub const fn new(dev: DeviceNo, block_no: BlockNo) -> Self {
        Self { dev, block_no }
    }

    /// Returns the hash bucket this key belongs to when the cache has
    /// `num_buckets` buckets.
    #[must_use]
    pub const fn bucket_index(self, num_buckets: usize) -> usize {
        self.block_no.as_index() % num_buckets
    }
}
