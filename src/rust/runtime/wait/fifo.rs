// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    task::{
        SharedTaskContext,
        WakeupSource,
    },
    wait::{
        WaitQueue,
        WaitQueueGuard,
    },
};
use ::parking_lot::{
    Mutex,
    MutexGuard,
};
use ::std::collections::VecDeque;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A wait queue that holds any number of tasks and wakes them in FIFO order, bounding how long a waiter can be
/// starved. Backed by a regular mutex: the critical section walks the queue and may allocate, which is more than a
/// spinlock should protect.
pub struct FifoWaitQueue {
    waiters: Mutex<VecDeque<SharedTaskContext>>,
}

/// Scoped lock over a [FifoWaitQueue].
pub struct FifoWaitQueueGuard<'a>(MutexGuard<'a, VecDeque<SharedTaskContext>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl FifoWaitQueue {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }
}

#[cfg(test)]
impl FifoWaitQueueGuard<'_> {
    pub(crate) fn num_waiters(&self) -> usize {
        self.0.len()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for FifoWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue for FifoWaitQueue {
    type Guard<'a>
        = FifoWaitQueueGuard<'a>
    where
        Self: 'a;

    fn lock(&self) -> Self::Guard<'_> {
        FifoWaitQueueGuard(self.waiters.lock())
    }
}

impl WaitQueueGuard for FifoWaitQueueGuard<'_> {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn append(&mut self, context: SharedTaskContext) {
        self.0.push_back(context);
    }

    fn remove(&mut self, context: &SharedTaskContext) {
        self.0.retain(|waiter| waiter != context);
    }

    fn wakeup_one(&mut self) {
        // Entries whose sleep was already claimed by a deadline or cancellation are on their way out anyway; skip
        // them so this wakeup lands on a task that can still use it.
        while let Some(context) = self.0.pop_front() {
            if context.wakeup(WakeupSource::Signal) {
                return;
            }
            trace!(
                "wakeup_one(): skipping waiter whose sleep was already claimed: id={:?}",
                context.get_id()
            );
        }
    }

    fn wakeup_all(&mut self) {
        while let Some(context) = self.0.pop_front() {
            if !context.wakeup(WakeupSource::Signal) {
                trace!(
                    "wakeup_all(): waiter's sleep was already claimed: id={:?}",
                    context.get_id()
                );
            }
        }
    }
}
