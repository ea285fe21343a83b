//! Sleep lock for hosted (`std`) environments.
//!
//! Blocked lockers park on a condition variable instead of a process wait
//! channel. The holder is identified by its thread.

use std::{
    cell::UnsafeCell,
    fmt,
    ops::{Deref, DerefMut},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use crate::SleepMutex;

/// A long-term lock backed by [`std::sync::Condvar`].
pub struct StdSleepLock<T> {
    /// Thread holding the lock, if any.
    holder: Mutex<Option<ThreadId>>,
    cond: Condvar,
    value: UnsafeCell<T>,
}

unsafe impl<T> Sync for StdSleepLock<T> where T: Send {}

impl<T> Default for StdSleepLock<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for StdSleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdSleepLock")
            .field("holder", &*self.holder())
            .finish_non_exhaustive()
    }
}

impl<T> StdSleepLock<T> {
    /// Creates a new unlocked sleep lock.
    pub const fn new(value: T) -> Self {
        Self {
            holder: Mutex::new(None),
            cond: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) {
        let mut holder = self.holder();
        while holder.is_some() {
            holder = self
                .cond
                .wait(holder)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *holder = Some(thread::current().id());
    }

    fn release(&self) {
        *self.holder() = None;
        self.cond.notify_one();
    }

    /// Acquires the lock, blocking the current thread until it is available.
    pub fn lock(&self) -> StdSleepLockGuard<'_, T> {
        self.acquire();
        StdSleepLockGuard { lock: self }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<StdSleepLockGuard<'_, T>> {
        let mut holder = self.holder();
        if holder.is_some() {
            return None;
        }
        *holder = Some(thread::current().id());
        Some(StdSleepLockGuard { lock: self })
    }

    /// Returns `true` if the current thread holds the lock.
    pub fn holding(&self) -> bool {
        *self.holder() == Some(thread::current().id())
    }
}

impl<T> crate::Mutex for StdSleepLock<T> {
    type Data = T;
    type Guard<'a>
        = StdSleepLockGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}

impl<T> SleepMutex for StdSleepLock<T> {
    fn holding(&self) -> bool {
        self.holding()
    }
}

/// Guard of [`StdSleepLock`]. Releases the lock and wakes one waiter on drop.
pub struct StdSleepLockGuard<'a, T> {
    lock: &'a StdSleepLock<T>,
}

// A guard may be handed to another thread. That thread is then not the
// recorded holder, which `holding()` reports.
unsafe impl<T> Send for StdSleepLockGuard<'_, T> where T: Send {}
unsafe impl<T> Sync for StdSleepLockGuard<'_, T> where T: Sync {}

impl<T> Drop for StdSleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl<T> Deref for StdSleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for StdSleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.value.get() }
    }
}
