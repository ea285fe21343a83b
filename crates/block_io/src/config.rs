//! Cache construction parameters.

use bcache_params::{NBUCKET, NBUF};
use strum::{Display, EnumString};

/// How a cache miss finds a free buffer in other buckets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum EvictionScan {
    /// Keeps the home bucket locked while visiting every other bucket in
    /// circular order, starting just after the home bucket.
    ///
    /// The home bucket itself is never searched for a free buffer. Two
    /// concurrent misses with different home buckets may each hold their
    /// own home lock while waiting for the other's, so this order can
    /// deadlock.
    #[default]
    HoldHome,

    /// Never holds a bucket lock while waiting for a lower-indexed one.
    ///
    /// The home lock is dropped after the lookup miss. Each donor bucket is
    /// then locked together with the home bucket in increasing index order,
    /// and the home bucket is searched again before a buffer is moved. The
    /// home bucket is visited last as a donor.
    LockOrdered,
}

/// An error in [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("buffer cache needs at least one buffer")]
    NoBuffers,
    #[error("buffer cache needs at least one bucket")]
    NoBuckets,
    #[error("`hold-home` eviction cannot serve a miss with a single bucket")]
    SingleBucketHoldHome,
}

/// Parameters of a [`BufferCache`](crate::BufferCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of buffers in the pool.
    pub num_buffers: usize,
    /// Number of hash buckets.
    pub num_buckets: usize,
    /// Cross-bucket eviction strategy.
    pub eviction: EvictionScan,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_buffers: NBUF,
            num_buckets: NBUCKET,
            eviction: EvictionScan::default(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn with_num_buffers(mut self, num_buffers: usize) -> Self {
        self.num_buffers = num_buffers;
        self
    }

    #[must_use]
    pub const fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    #[must_use]
    pub const fn with_eviction(mut self, eviction: EvictionScan) -> Self {
        self.eviction = eviction;
        self
    }

    /// Checks that a cache can be built from this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_buffers == 0 {
            return Err(ConfigError::NoBuffers);
        }
        if self.num_buckets == 0 {
            return Err(ConfigError::NoBuckets);
        }
        if self.num_buckets == 1 && self.eviction == EvictionScan::HoldHome {
            return Err(ConfigError::SingleBucketHoldHome);
        }
        Ok(())
    }
}
