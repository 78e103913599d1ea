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
use ::spin::{
    Mutex,
    MutexGuard,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A wait queue that holds at most one task. Used by primitives whose semantics guarantee mutual exclusivity among
/// waiters (e.g., a single-consumer event), where a full queue would be wasted. The critical section is a handful of
/// instructions, so a spinlock is enough to guard it.
pub struct SingleWaiterQueue {
    slot: Mutex<Option<SharedTaskContext>>,
}

/// Scoped lock over a [SingleWaiterQueue].
pub struct SingleWaiterQueueGuard<'a>(MutexGuard<'a, Option<SharedTaskContext>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SingleWaiterQueue {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SingleWaiterQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue for SingleWaiterQueue {
    type Guard<'a>
        = SingleWaiterQueueGuard<'a>
    where
        Self: 'a;

    fn lock(&self) -> Self::Guard<'_> {
        SingleWaiterQueueGuard(self.slot.lock())
    }
}

impl WaitQueueGuard for SingleWaiterQueueGuard<'_> {
    fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    fn append(&mut self, context: SharedTaskContext) {
        // A second waiter means two primitives (or two tasks) share a queue that promises room for one. That is a bug
        // in the caller, not a runtime condition, so fail loudly instead of corrupting the slot.
        if let Some(occupant) = self.0.as_ref() {
            panic!(
                "single-waiter queue already occupied: occupant={:?}, appended={:?}",
                occupant.get_id(),
                context.get_id()
            );
        }
        *self.0 = Some(context);
    }

    fn remove(&mut self, context: &SharedTaskContext) {
        if self.0.as_ref() == Some(context) {
            *self.0 = None;
        }
    }

    fn wakeup_one(&mut self) {
        if let Some(context) = self.0.take() {
            if !context.wakeup(WakeupSource::Signal) {
                trace!(
                    "wakeup_one(): waiter's sleep was already claimed: id={:?}",
                    context.get_id()
                );
            }
        }
    }

    fn wakeup_all(&mut self) {
        self.wakeup_one();
    }
}
