// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod deadline;
pub mod fail;
pub mod logging;
pub mod poll;
pub mod request;
pub mod scheduler;
pub mod task;
pub mod timer;
pub mod wait;

pub use self::{
    deadline::Deadline,
    poll::yield_now,
    request::RequestDeadlineInfo,
    scheduler::{
        current,
        try_current,
    },
    task::WakeupSource,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::wait::{
    suspend,
    SingleWaiterQueue,
};
use ::std::{
    ops::Deref,
    sync::Arc,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// The SharedObject wraps an object that will be shared across tasks and worker threads. Mutation goes through the
/// interior synchronization of the wrapped object; the wrapper itself only hands out shared references.
pub struct SharedObject<T: ?Sized>(Arc<T>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Arc::new(object))
    }
}

impl<T: ?Sized> SharedObject<T> {
    pub(crate) fn from_arc(object: Arc<T>) -> Self {
        Self(object)
    }

    pub(crate) fn arc(&self) -> &Arc<T> {
        &self.0
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Suspends the calling task until `wake_time` passes. The sleep is interruptible: it also ends on cancellation or
/// on expiry of a sooner deadline inherited from the current unit of work, and the returned [WakeupSource] tells
/// which one happened.
pub async fn sleep_until(wake_time: Deadline) -> WakeupSource {
    // A private queue nobody signals: the only ways out are the timer and cancellation.
    let wait_queue: SingleWaiterQueue = SingleWaiterQueue::new();
    suspend(&wait_queue, wake_time).await
}

/// Suspends the calling task for `duration`. See [sleep_until].
pub async fn sleep_for(duration: Duration) -> WakeupSource {
    sleep_until(Deadline::from_duration(duration)).await
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Dereferences a shared object for use.
impl<T: ?Sized> Deref for SharedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl<T: ?Sized> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use crate::runtime::{
        scheduler::Scheduler,
        sleep_for,
        WakeupSource,
    };
    use ::anyhow::Result;
    use ::std::time::{
        Duration,
        Instant,
    };

    #[test]
    fn sleep_for_wakes_on_deadline() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let start_time: Instant = Instant::now();
        let handle = scheduler.spawn("sleeper", async { sleep_for(Duration::from_millis(30)).await });

        crate::ensure_eq!(handle.join()?, WakeupSource::Deadline);
        let elapsed: Duration = start_time.elapsed();
        crate::ensure_eq!(elapsed >= Duration::from_millis(25), true);
        crate::ensure_eq!(elapsed < Duration::from_secs(2), true);
        Ok(())
    }

    #[test]
    fn sleep_is_interruptible_by_cancellation() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let handle = scheduler.spawn("sleeper", async { sleep_for(Duration::from_secs(30)).await });

        handle.request_cancellation();
        crate::ensure_eq!(handle.join()?, WakeupSource::Cancel);
        Ok(())
    }
}
