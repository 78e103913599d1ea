// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::Fail,
        scheduler,
        task::{
            SharedTaskContext,
            SleepToken,
            WakeupSource,
        },
        wait::{
            effective_wake_time,
            FifoWaitQueue,
            WaitQueue,
            WaitQueueGuard,
        },
        Deadline,
    },
    sync::mutex::{
        Mutex,
        MutexGuard,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A condition variable over the engine's [Mutex]. `wait` atomically registers the calling task as a waiter and
/// releases the guard, so a notification sent after the release cannot slip by; the mutex is re-acquired before
/// control returns to the caller, whatever the outcome of the wait.
pub struct ConditionVariable {
    waiters: FifoWaitQueue,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ConditionVariable {
    pub fn new() -> Self {
        Self {
            waiters: FifoWaitQueue::new(),
        }
    }

    /// Wakes the longest-waiting task.
    pub fn notify_one(&self) {
        let mut guard = self.waiters.lock();
        guard.wakeup_one();
    }

    /// Wakes every waiting task.
    pub fn notify_all(&self) {
        let mut guard = self.waiters.lock();
        guard.wakeup_all();
    }

    /// Releases `guard` and suspends the calling task until notified. Returns the re-acquired guard together with
    /// the outcome of the wait.
    pub async fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> (MutexGuard<'a, T>, Result<(), Fail>) {
        self.wait_until(guard, Deadline::unreachable()).await
    }

    /// Releases `guard` and suspends the calling task until notified or until `wake_time` passes. The guard handed
    /// back is always re-acquired, even when the wait ends in a timeout or cancellation.
    pub async fn wait_until<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        wake_time: Deadline,
    ) -> (MutexGuard<'a, T>, Result<(), Fail>) {
        let mutex: &'a Mutex<T> = guard.get_mutex();
        let context: SharedTaskContext = scheduler::current();
        if context.is_cancellation_requested() {
            return (guard, Err(Fail::cancelled("cancelled while waiting on condition variable")));
        }

        let effective: Deadline = effective_wake_time(wake_time);
        let token: SleepToken = context.prepare_sleep(true);
        {
            let mut waiters = self.waiters.lock();
            waiters.append(context.clone());
        }
        // Release the mutex only after registering as a waiter, so a notify issued by the next lock holder finds us.
        drop(guard);

        let source: WakeupSource = token.wait(effective).await;
        {
            let mut waiters = self.waiters.lock();
            waiters.remove(&context);
        }

        let guard: MutexGuard<'a, T> = mutex.lock_uninterruptible().await;
        let result: Result<(), Fail> = match source {
            WakeupSource::Signal => Ok(()),
            WakeupSource::Deadline => Err(Fail::timed_out("timed out waiting on condition variable")),
            WakeupSource::Cancel => Err(Fail::cancelled("cancelled while waiting on condition variable")),
        };
        (guard, result)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::ConditionVariable;
    use crate::{
        runtime::{
            scheduler::Scheduler,
            sleep_for,
            Deadline,
        },
        sync::mutex::Mutex,
    };
    use ::anyhow::Result;
    use ::std::{
        sync::Arc,
        time::Duration,
    };

    #[test]
    fn notify_one_wakes_a_waiter_with_the_mutex_reacquired() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let state: Arc<(Mutex<bool>, ConditionVariable)> = Arc::new((Mutex::new(false), ConditionVariable::new()));

        let consumer = scheduler.spawn("consumer", {
            let state: Arc<(Mutex<bool>, ConditionVariable)> = state.clone();
            async move {
                let (mutex, condvar) = (&state.0, &state.1);
                let mut guard = mutex.lock().await.expect("uncontended lock");
                while !*guard {
                    let (reacquired, result) = condvar.wait(guard).await;
                    guard = reacquired;
                    if result.is_err() {
                        return false;
                    }
                }
                *guard
            }
        });
        let producer = scheduler.spawn("producer", {
            let state: Arc<(Mutex<bool>, ConditionVariable)> = state.clone();
            async move {
                let _ = sleep_for(Duration::from_millis(10)).await;
                let (mutex, condvar) = (&state.0, &state.1);
                let mut guard = mutex.lock().await.expect("lock for producing");
                *guard = true;
                drop(guard);
                condvar.notify_one();
            }
        });

        producer.join()?;
        crate::ensure_eq!(consumer.join()?, true);
        Ok(())
    }

    #[test]
    fn notify_all_wakes_every_waiter() -> Result<()> {
        const NUM_WAITERS: usize = 3;
        let scheduler: Scheduler = Scheduler::new(4)?;
        let state: Arc<(Mutex<bool>, ConditionVariable)> = Arc::new((Mutex::new(false), ConditionVariable::new()));

        let mut handles = Vec::with_capacity(NUM_WAITERS);
        for i in 0..NUM_WAITERS {
            let state: Arc<(Mutex<bool>, ConditionVariable)> = state.clone();
            handles.push(scheduler.spawn(&format!("waiter-{}", i), async move {
                let (mutex, condvar) = (&state.0, &state.1);
                let mut guard = mutex.lock().await.expect("uncontended lock");
                while !*guard {
                    let (reacquired, result) = condvar.wait(guard).await;
                    guard = reacquired;
                    if result.is_err() {
                        return false;
                    }
                }
                true
            }));
        }

        let producer = scheduler.spawn("producer", {
            let state: Arc<(Mutex<bool>, ConditionVariable)> = state.clone();
            async move {
                let _ = sleep_for(Duration::from_millis(20)).await;
                let (mutex, condvar) = (&state.0, &state.1);
                let mut guard = mutex.lock().await.expect("lock for producing");
                *guard = true;
                drop(guard);
                condvar.notify_all();
            }
        });

        producer.join()?;
        for handle in handles {
            crate::ensure_eq!(handle.join()?, true);
        }
        Ok(())
    }

    #[test]
    fn wait_until_reports_deadline_expiry_with_the_mutex_reacquired() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let state: Arc<(Mutex<u64>, ConditionVariable)> = Arc::new((Mutex::new(7), ConditionVariable::new()));

        let handle = scheduler.spawn("waiter", {
            let state: Arc<(Mutex<u64>, ConditionVariable)> = state.clone();
            async move {
                let (mutex, condvar) = (&state.0, &state.1);
                let guard = mutex.lock().await.expect("uncontended lock");
                let (guard, result) = condvar
                    .wait_until(guard, Deadline::from_duration(Duration::from_millis(20)))
                    .await;
                // Even a timed-out wait hands the mutex back.
                (*guard, result.is_err())
            }
        });

        let (value, timed_out): (u64, bool) = handle.join()?;
        crate::ensure_eq!(value, 7);
        crate::ensure_eq!(timed_out, true);
        Ok(())
    }
}
