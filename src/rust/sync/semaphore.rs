// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    wait::{
        suspend_if,
        FifoWaitQueue,
        WaitQueue,
        WaitQueueGuard,
    },
    Deadline,
    WakeupSource,
};
use ::std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A counted semaphore: at most `permits` tasks hold it at a time, the rest park on a FIFO wait queue. Returning a
/// permit wakes the longest waiter.
pub struct Semaphore {
    /// Permits still available. Incremented under the waiter queue's lock on the release path.
    permits: AtomicUsize,
    /// Tasks parked waiting for a permit.
    waiters: FifoWaitQueue,
}

/// One held permit. Returned to the semaphore on drop.
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: AtomicUsize::new(permits),
            waiters: FifoWaitQueue::new(),
        }
    }

    /// Attempts to take a permit without suspending.
    pub fn try_acquire(&self) -> Option<SemaphoreGuard<'_>> {
        loop {
            let available: usize = self.permits.load(Ordering::Acquire);
            if available == 0 {
                return None;
            }
            if self
                .permits
                .compare_exchange(available, available - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(SemaphoreGuard { semaphore: self });
            }
        }
    }

    /// Takes a permit, suspending the calling task while none is available.
    pub async fn acquire(&self) -> Result<SemaphoreGuard<'_>, Fail> {
        self.acquire_until(Deadline::unreachable()).await
    }

    /// Takes a permit, giving up once `wake_time` passes.
    pub async fn acquire_until(&self, wake_time: Deadline) -> Result<SemaphoreGuard<'_>, Fail> {
        loop {
            if let Some(guard) = self.try_acquire() {
                return Ok(guard);
            }
            match suspend_if(&self.waiters, wake_time, || self.permits.load(Ordering::Acquire) == 0).await {
                None | Some(WakeupSource::Signal) => continue,
                Some(WakeupSource::Deadline) => return Err(Fail::timed_out("timed out waiting for semaphore")),
                Some(WakeupSource::Cancel) => return Err(Fail::cancelled("cancelled while waiting for semaphore")),
            }
        }
    }

    fn release(&self) {
        let mut guard = self.waiters.lock();
        self.permits.fetch_add(1, Ordering::Release);
        guard.wakeup_one();
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
