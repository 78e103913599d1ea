// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Wait queues.
//!
//! A wait queue holds the tasks blocked on one condition. Every mutation of a queue goes through a scoped lock guard,
//! so operations on one queue instance never interleave; which mutual-exclusion primitive backs the guard is the
//! queue's own choice (the single-waiter queue uses a spinlock, the FIFO queue a regular mutex). A task is registered
//! on at most one wait queue at a time, and only while it is inside a suspend call against that queue.

mod fifo;
mod single;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    fifo::FifoWaitQueue,
    single::SingleWaiterQueue,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    request,
    scheduler,
    task::{
        SharedTaskContext,
        SleepToken,
        WakeupSource,
    },
    Deadline,
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Scoped mutation capability over one wait queue. Holding the guard is holding the queue's lock: all five queue
/// operations live here, so none of them can be reached without the lock.
pub trait WaitQueueGuard {
    /// Checks whether any task is registered on the queue.
    fn is_empty(&self) -> bool;

    /// Registers a task on the queue.
    fn append(&mut self, context: SharedTaskContext);

    /// Deregisters a specific task from the queue. No-op if the task is not registered, so wakeup paths and the
    /// suspending task itself can race to remove the same entry without coordination beyond this lock.
    fn remove(&mut self, context: &SharedTaskContext);

    /// Wakes one registered task. Entries whose sleep was already claimed by a deadline or cancellation are skipped
    /// and dropped from the queue, so the wakeup is not wasted on a task that is already leaving.
    fn wakeup_one(&mut self);

    /// Wakes every registered task.
    fn wakeup_all(&mut self);
}

/// A queue of tasks waiting for one condition.
pub trait WaitQueue {
    /// Scoped lock guard of this queue flavor.
    type Guard<'a>: WaitQueueGuard
    where
        Self: 'a;

    /// Acquires the queue's lock.
    fn lock(&self) -> Self::Guard<'_>;
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Suspends the calling task on `wait_queue` until an explicit wakeup, expiry of the effective wake time, or
/// cancellation, whichever claims the sleep first. The effective wake time is the sooner of `wake_time` and the
/// deadline inherited from the current unit of work, and expiry of either is reported identically.
pub async fn suspend<Q: WaitQueue>(wait_queue: &Q, wake_time: Deadline) -> WakeupSource {
    match suspend_if(wait_queue, wake_time, || true).await {
        Some(source) => source,
        None => unreachable!("an unconditional suspend always sleeps"),
    }
}

/// Like [suspend], but only parks the task if `should_sleep` still holds once the queue's lock is acquired. Returns
/// None without sleeping when the condition fails, which is how primitives close the gap between checking their state
/// and registering as a waiter. Cancellation and already-passed wake times short-circuit the sleep entirely.
pub async fn suspend_if<Q, F>(wait_queue: &Q, wake_time: Deadline, should_sleep: F) -> Option<WakeupSource>
where
    Q: WaitQueue,
    F: FnOnce() -> bool,
{
    suspend_with_options(wait_queue, wake_time, true, should_sleep).await
}

/// Full-control variant of [suspend_if]. A non-interruptible suspend ignores the task's cancellation flag, which is
/// needed when a primitive must finish a protocol step before it can surface the cancellation (e.g., a condition
/// variable re-acquiring its mutex).
pub(crate) async fn suspend_with_options<Q, F>(
    wait_queue: &Q,
    wake_time: Deadline,
    interruptible: bool,
    should_sleep: F,
) -> Option<WakeupSource>
where
    Q: WaitQueue,
    F: FnOnce() -> bool,
{
    let context: SharedTaskContext = scheduler::current();
    if interruptible && context.is_cancellation_requested() {
        return Some(WakeupSource::Cancel);
    }

    let effective: Deadline = effective_wake_time(wake_time);
    let token: SleepToken = context.prepare_sleep(interruptible);
    {
        let mut guard: Q::Guard<'_> = wait_queue.lock();
        if !should_sleep() {
            return None;
        }
        if effective.passed() {
            return Some(WakeupSource::Deadline);
        }
        guard.append(context.clone());
    }

    let source: WakeupSource = token.wait(effective).await;
    {
        // The entry may already be gone: an explicit wakeup removes it, and that removal may have lost the race
        // against the deadline or a cancellation that actually claimed the sleep.
        let mut guard: Q::Guard<'_> = wait_queue.lock();
        guard.remove(&context);
    }
    Some(source)
}

/// Computes the effective wake time of a suspend call: the sooner of the explicit wake time and the deadline
/// inherited from the current unit of work.
pub(crate) fn effective_wake_time(wake_time: Deadline) -> Deadline {
    match request::get_current_task_inherited_deadline_unchecked() {
        Some(inherited) => wake_time.earliest(inherited),
        None => wake_time,
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
