// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    wait::{
        suspend_if,
        suspend_with_options,
        FifoWaitQueue,
        WaitQueue,
        WaitQueueGuard,
    },
    Deadline,
    WakeupSource,
};
use ::std::{
    cell::UnsafeCell,
    ops::{
        Deref,
        DerefMut,
    },
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A mutex whose acquire suspends the calling task instead of blocking the worker thread. Contended acquires park on
/// a FIFO wait queue; release wakes the longest waiter, though a task that shows up at exactly the right moment may
/// still grab the lock ahead of it.
pub struct Mutex<T> {
    /// Whether the mutex is held. Cleared under the waiter queue's lock on the release path.
    locked: AtomicBool,
    /// Tasks parked on a contended acquire.
    waiters: FifoWaitQueue,
    /// The protected data.
    data: UnsafeCell<T>,
}

/// Scoped access to the data protected by a [Mutex]. Releases the mutex on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> Mutex<T> {
    pub fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: FifoWaitQueue::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the mutex and returns the protected data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Attempts to acquire the mutex without suspending.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Acquires the mutex, suspending the calling task while it is held elsewhere.
    pub async fn lock(&self) -> Result<MutexGuard<'_, T>, Fail> {
        self.lock_until(Deadline::unreachable()).await
    }

    /// Acquires the mutex, giving up once `wake_time` passes.
    pub async fn lock_until(&self, wake_time: Deadline) -> Result<MutexGuard<'_, T>, Fail> {
        loop {
            if let Some(guard) = self.try_lock() {
                return Ok(guard);
            }
            match suspend_if(&self.waiters, wake_time, || self.locked.load(Ordering::Acquire)).await {
                None | Some(WakeupSource::Signal) => continue,
                Some(WakeupSource::Deadline) => return Err(Fail::timed_out("timed out waiting for mutex")),
                Some(WakeupSource::Cancel) => return Err(Fail::cancelled("cancelled while waiting for mutex")),
            }
        }
    }

    /// Acquires the mutex even if the calling task has a cancellation pending. Used where a guard must be handed back
    /// to the caller no matter what, e.g. when a condition variable re-acquires after a wait.
    pub(crate) async fn lock_uninterruptible(&self) -> MutexGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            let _ = suspend_with_options(&self.waiters, Deadline::unreachable(), false, || {
                self.locked.load(Ordering::Acquire)
            })
            .await;
        }
    }

    fn unlock(&self) {
        let mut guard = self.waiters.lock();
        self.locked.store(false, Ordering::Release);
        guard.wakeup_one();
    }
}

impl<'a, T> MutexGuard<'a, T> {
    /// The mutex this guard locks. Lets a condition variable release and re-acquire it around a wait.
    pub(crate) fn get_mutex(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

// The mutex hands out access to the protected data from whichever worker thread runs the owning task.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
