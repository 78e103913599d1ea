// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    wait::{
        suspend_if,
        SingleWaiterQueue,
        WaitQueue,
        WaitQueueGuard,
    },
    Deadline,
    WakeupSource,
};
use ::std::sync::atomic::{
    AtomicBool,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A one-shot signal with exactly one consumer. `send` raises the signal and wakes the waiting task, if any; `wait`
/// consumes the signal, parking the calling task until one arrives. At most one task may wait at a time, which is
/// what lets the event get away with a single-waiter queue; a second concurrent waiter is a usage contract violation.
pub struct SingleConsumerEvent {
    /// Whether a signal is pending. Mutated under the waiter queue's lock on the send path.
    signaled: AtomicBool,
    /// The consumer, while it is parked.
    waiter: SingleWaiterQueue,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SingleConsumerEvent {
    pub fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
            waiter: SingleWaiterQueue::new(),
        }
    }

    /// Raises the signal and wakes the consumer if it is parked. Signals do not accumulate: sending twice before the
    /// consumer runs is indistinguishable from sending once.
    pub fn send(&self) {
        let mut guard = self.waiter.lock();
        self.signaled.store(true, Ordering::SeqCst);
        guard.wakeup_one();
    }

    /// Consumes a pending signal without waiting.
    pub fn try_consume(&self) -> bool {
        self.signaled.swap(false, Ordering::SeqCst)
    }

    /// Suspends the calling task until a signal arrives, then consumes it.
    pub async fn wait(&self) -> Result<(), Fail> {
        self.wait_until(Deadline::unreachable()).await
    }

    /// Suspends the calling task until a signal arrives or `wake_time` passes, whichever comes first.
    pub async fn wait_until(&self, wake_time: Deadline) -> Result<(), Fail> {
        loop {
            if self.try_consume() {
                return Ok(());
            }
            match suspend_if(&self.waiter, wake_time, || !self.signaled.load(Ordering::SeqCst)).await {
                // Either the signal arrived while we were registering or we were woken by the sender; in both cases
                // go around and try to consume it.
                None | Some(WakeupSource::Signal) => continue,
                Some(WakeupSource::Deadline) => return Err(Fail::timed_out("timed out waiting for event")),
                Some(WakeupSource::Cancel) => return Err(Fail::cancelled("cancelled while waiting for event")),
            }
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SingleConsumerEvent {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::SingleConsumerEvent;
    use crate::runtime::{
        scheduler::Scheduler,
        sleep_for,
        Deadline,
    };
    use ::anyhow::Result;
    use ::std::{
        sync::Arc,
        time::Duration,
    };

    #[test]
    fn signal_sent_before_wait_is_consumed_immediately() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let event: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());

        event.send();
        let handle = scheduler.spawn("consumer", {
            let event: Arc<SingleConsumerEvent> = event.clone();
            async move { event.wait().await.is_ok() }
        });
        crate::ensure_eq!(handle.join()?, true);
        Ok(())
    }

    #[test]
    fn signal_wakes_parked_consumer() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let event: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());

        let consumer = scheduler.spawn("consumer", {
            let event: Arc<SingleConsumerEvent> = event.clone();
            async move { event.wait().await.is_ok() }
        });
        let producer = scheduler.spawn("producer", {
            let event: Arc<SingleConsumerEvent> = event.clone();
            async move {
                // Give the consumer a chance to park first.
                let _ = sleep_for(Duration::from_millis(10)).await;
                event.send();
            }
        });

        producer.join()?;
        crate::ensure_eq!(consumer.join()?, true);
        Ok(())
    }

    #[test]
    fn wait_reports_deadline_expiry() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let event: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());

        let handle = scheduler.spawn("consumer", {
            let event: Arc<SingleConsumerEvent> = event.clone();
            async move {
                event
                    .wait_until(Deadline::from_duration(Duration::from_millis(20)))
                    .await
            }
        });

        let result = handle.join()?;
        crate::ensure_eq!(result.is_err(), true);
        crate::ensure_eq!(result.unwrap_err().is_timeout(), true);
        Ok(())
    }

    #[test]
    fn signals_do_not_accumulate() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let event: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());

        event.send();
        event.send();
        let handle = scheduler.spawn("consumer", {
            let event: Arc<SingleConsumerEvent> = event.clone();
            async move {
                let first: bool = event.wait().await.is_ok();
                let second: bool = event
                    .wait_until(Deadline::from_duration(Duration::from_millis(10)))
                    .await
                    .is_ok();
                (first, second)
            }
        });

        let (first, second): (bool, bool) = handle.join()?;
        crate::ensure_eq!(first, true);
        crate::ensure_eq!(second, false);
        Ok(())
    }
}
