// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Deadline timer.
//!
//! One timer thread per scheduler owns a min-heap of pending expirations. Entries hold weak task references and the
//! epoch of the sleep they were registered for, so an entry that outlives its sleep (the common case: the task was
//! woken explicitly first) expires into a no-op instead of waking a later sleep.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    task::{
        SharedTaskContext,
        TaskContext,
        WakeupSource,
    },
    SharedObject,
};
use ::core::cmp::Reverse;
use ::parking_lot::{
    Condvar,
    Mutex,
};
use ::std::{
    collections::BinaryHeap,
    ops::Deref,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Weak,
    },
    time::Instant,
};

//==============================================================================
// Structures
//==============================================================================

struct TimerQueueEntry {
    expiry: Instant,
    task: Weak<TaskContext>,
    epoch: u64,
}

/// Timer that holds one or more events for future wake up.
pub struct Timer {
    // Use a reverse to get a min heap.
    heap: Mutex<BinaryHeap<Reverse<TimerQueueEntry>>>,
    /// Nudges the timer thread when a new entry lands or shutdown is requested.
    wakeup: Condvar,
    shutdown: AtomicBool,
}

#[derive(Clone)]
pub struct SharedTimer(SharedObject<Timer>);

//==============================================================================
// Associate Functions
//==============================================================================

impl SharedTimer {
    pub fn new() -> Self {
        Self(SharedObject::new(Timer {
            heap: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }))
    }

    /// Registers a deadline wakeup for the sleep identified by `epoch` on `task`.
    pub(crate) fn enqueue(&self, expiry: Instant, task: &SharedTaskContext, epoch: u64) {
        let entry = TimerQueueEntry {
            expiry,
            task: task.downgrade(),
            epoch,
        };
        let mut heap = self.heap.lock();
        heap.push(Reverse(entry));
        self.wakeup.notify_one();
    }

    /// Body of the timer thread: fires expired entries and sleeps until the next expiry.
    pub(crate) fn run(&self) {
        let mut heap = self.heap.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let now: Instant = Instant::now();
            while let Some(Reverse(entry)) = heap.peek() {
                if now < entry.expiry {
                    break;
                }
                let entry: TimerQueueEntry = heap.pop().expect("heap cannot be empty after a successful peek").0;
                // The task may be gone, or this entry may belong to a sleep that was already claimed.
                if let Some(context) = entry.task.upgrade() {
                    if context.wakeup_at_epoch(WakeupSource::Deadline, entry.epoch) {
                        trace!("run(): deadline expired: id={:?}", context.get_id());
                    }
                }
            }
            match heap.peek() {
                Some(Reverse(entry)) => {
                    let expiry: Instant = entry.expiry;
                    let _ = self.wakeup.wait_until(&mut heap, expiry);
                },
                None => self.wakeup.wait(&mut heap),
            }
        }
    }

    /// Asks the timer thread to exit. Pending entries are abandoned.
    pub(crate) fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.heap.lock();
        self.wakeup.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn num_pending(&self) -> usize {
        self.heap.lock().len()
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for SharedTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SharedTimer {
    type Target = Timer;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &TimerQueueEntry) -> bool {
        // This is technically not correct. However for the usage in this module
        // we only need to compare timers by expiration.
        self.expiry == other.expiry
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &TimerQueueEntry) -> Option<core::cmp::Ordering> {
        // Compare timer queue entries by expiration time
        self.expiry.partial_cmp(&other.expiry)
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &TimerQueueEntry) -> core::cmp::Ordering {
        self.expiry.cmp(&other.expiry)
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::SharedTimer;
    use crate::runtime::{
        task::{
            SharedTaskContext,
            TaskId,
            WakeupSource,
        },
        Deadline,
    };
    use ::anyhow::Result;
    use ::futures::task::noop_waker_ref;
    use ::std::{
        future::Future,
        pin::Pin,
        task::{
            Context,
            Poll,
        },
        thread,
        time::{
            Duration,
            Instant,
        },
    };

    #[test]
    fn expired_entry_claims_the_sleep_it_was_registered_for() -> Result<()> {
        let mut ctx: Context = Context::from_waker(noop_waker_ref());
        let timer: SharedTimer = SharedTimer::new();
        let runner: thread::JoinHandle<()> = {
            let timer: SharedTimer = timer.clone();
            thread::spawn(move || timer.run())
        };

        let (ready_tx, _ready_rx) = crossbeam_channel::unbounded();
        let context: SharedTaskContext =
            SharedTaskContext::new(TaskId(1), "sleeper".to_string(), ready_tx, timer.clone());

        let token = context.prepare_sleep(true);
        let wait_future = token.wait(Deadline::from_duration(Duration::from_millis(20)));
        futures::pin_mut!(wait_future);

        crate::ensure_eq!(Future::poll(Pin::new(&mut wait_future), &mut ctx).is_pending(), true);

        // Give the timer thread room to fire the entry.
        let give_up: Instant = Instant::now() + Duration::from_secs(5);
        loop {
            thread::sleep(Duration::from_millis(5));
            if let Poll::Ready(source) = Future::poll(Pin::new(&mut wait_future), &mut ctx) {
                crate::ensure_eq!(source, WakeupSource::Deadline);
                break;
            }
            if Instant::now() > give_up {
                anyhow::bail!("timer never fired");
            }
        }
        crate::ensure_eq!(timer.num_pending(), 0);

        timer.stop();
        let _ = runner.join();
        Ok(())
    }
}
