//! A simple mutex API.
//!
//! Two kinds of locks are described here:
//!
//! * [`Mutex`]: a plain mutual-exclusion lock. Spin locks implement this and
//!   must never be held across an operation that may block.
//! * [`SleepMutex`]: a lock whose holder may block (e.g. wait for disk I/O)
//!   while holding it. It remembers its holder, so callers can check lock
//!   discipline with [`SleepMutex::holding`].
#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::ops::DerefMut;

#[cfg(any(test, feature = "std"))]
mod sleep_lock;

#[cfg(any(test, feature = "std"))]
pub use self::sleep_lock::{StdSleepLock, StdSleepLockGuard};

/// A mutex.
pub trait Mutex {
    /// The type of the data that the mutex protects.
    type Data;

    /// The type of the guard that the `lock` method returns.
    type Guard<'a>: DerefMut<Target = Self::Data>
    where
        Self: 'a;

    /// Creates a new mutex.
    fn new(data: Self::Data) -> Self;

    /// Locks the mutex.
    fn lock(&self) -> Self::Guard<'_>;
}

/// A mutex that can be held while the holder sleeps.
pub trait SleepMutex: Mutex {
    /// Returns `true` if the current execution context holds the lock.
    fn holding(&self) -> bool;
}

#[cfg(any(test, feature = "std"))]
impl<T> Mutex for std::sync::Mutex<T> {
    type Data = T;
    type Guard<'a>
        = std::sync::MutexGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(feature = "spin")]
impl<T> Mutex for spin::Mutex<T> {
    type Data = T;
    type Guard<'a>
        = spin::MutexGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}
