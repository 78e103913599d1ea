// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! End-to-end tests driving the engine the way a server would: one task per unit of work, a deadline attached at the
//! top, and blocking-looking collaborators that park the task instead of the worker thread.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use ::weft::{
    config::Config,
    ensure_eq,
    runtime::{
        logging,
        request::{
            get_current_request_deadline_info_unchecked,
            RequestDeadlineInfo,
            RequestDeadlineScope,
        },
        sleep_for,
        Deadline,
    },
    sync::{
        Mutex,
        Semaphore,
        SingleConsumerEvent,
    },
    Scheduler,
};

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// One simulated request: phase one is answered by a backend task in time, phase two waits on a reply that never
/// comes and must be cut short by the deadline inherited from the request, not by any explicit timeout.
#[test]
fn request_deadline_bounds_every_wait_in_the_handler() -> Result<()> {
    logging::initialize();
    let config: Config = match Config::load_from_str("engine:\n  worker_threads: 2\n") {
        Ok(config) => config,
        Err(e) => anyhow::bail!("config should parse: {:?}", e),
    };
    let scheduler: Scheduler = Scheduler::from_config(&config)?;

    let first_reply: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());
    let second_reply: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());

    let backend = scheduler.spawn("backend", {
        let first_reply: Arc<SingleConsumerEvent> = first_reply.clone();
        async move {
            let _ = sleep_for(Duration::from_millis(10)).await;
            first_reply.send();
            // The second reply is never sent.
        }
    });

    let handler = scheduler.spawn("request-handler", {
        let first_reply: Arc<SingleConsumerEvent> = first_reply.clone();
        let second_reply: Arc<SingleConsumerEvent> = second_reply.clone();
        async move {
            let start_time: Instant = Instant::now();
            let deadline: Deadline = Deadline::from_duration(Duration::from_millis(60));
            let _scope: RequestDeadlineScope = RequestDeadlineScope::new(RequestDeadlineInfo::new(start_time, deadline));

            let first = first_reply.wait().await;
            let second = second_reply.wait().await;
            (start_time.elapsed(), first.is_ok(), second)
        }
    });

    let (elapsed, first_ok, second): (Duration, bool, _) = handler.join()?;
    ensure_eq!(first_ok, true);
    ensure_eq!(second.is_err(), true);
    ensure_eq!(second.unwrap_err().is_timeout(), true);
    ensure_eq!(elapsed >= Duration::from_millis(55), true);
    ensure_eq!(elapsed < Duration::from_secs(2), true);
    backend.join()?;
    Ok(())
}

/// The deadline must not leak into later units of work processed by the same task.
#[test]
fn deadline_does_not_leak_across_units_of_work() -> Result<()> {
    let scheduler: Scheduler = Scheduler::new(2)?;
    let handle = scheduler.spawn("handler", async {
        {
            let _scope: RequestDeadlineScope = RequestDeadlineScope::new(RequestDeadlineInfo::new(
                Instant::now(),
                Deadline::from_duration(Duration::from_millis(10)),
            ));
        }
        // The previous unit of work is over: this sleep must run its full course.
        ensure_eq!(get_current_request_deadline_info_unchecked(), None);
        let start_time: Instant = Instant::now();
        let _ = sleep_for(Duration::from_millis(30)).await;
        ensure_eq!(start_time.elapsed() >= Duration::from_millis(25), true);
        Ok(())
    });
    handle.join()?
}

/// A small pipeline mixing the primitives: a bounded pool of "connections" (semaphore), a shared counter (mutex), and
/// per-task replies (events). Everything must drain cleanly.
#[test]
fn primitives_compose_under_load() -> Result<()> {
    const NUM_REQUESTS: usize = 16;
    const POOL_SIZE: usize = 3;

    let scheduler: Scheduler = Scheduler::new(4)?;
    let pool: Arc<Semaphore> = Arc::new(Semaphore::new(POOL_SIZE));
    let completed: Arc<Mutex<u64>> = Arc::new(Mutex::new(0));

    let mut handles = Vec::with_capacity(NUM_REQUESTS);
    for i in 0..NUM_REQUESTS {
        let pool: Arc<Semaphore> = pool.clone();
        let completed: Arc<Mutex<u64>> = completed.clone();
        handles.push(scheduler.spawn(&format!("request-{}", i), async move {
            let _connection = match pool.acquire().await {
                Ok(guard) => guard,
                Err(_) => return false,
            };
            let _ = sleep_for(Duration::from_millis(2)).await;
            let mut count = match completed.lock().await {
                Ok(guard) => guard,
                Err(_) => return false,
            };
            *count += 1;
            true
        }));
    }

    for handle in handles {
        ensure_eq!(handle.join()?, true);
    }
    let final_count: u64 = match Arc::try_unwrap(completed) {
        Ok(mutex) => mutex.into_inner(),
        Err(_) => anyhow::bail!("all requests completed, so no other reference should remain"),
    };
    ensure_eq!(final_count, NUM_REQUESTS as u64);
    Ok(())
}

/// Cancelling a request-handling task interrupts whatever it is waiting on and keeps reporting cancellation until
/// the task acknowledges it.
#[test]
fn cancellation_interrupts_a_parked_handler() -> Result<()> {
    let scheduler: Scheduler = Scheduler::new(2)?;
    let never_sent: Arc<SingleConsumerEvent> = Arc::new(SingleConsumerEvent::new());

    let handler = scheduler.spawn("handler", {
        let never_sent: Arc<SingleConsumerEvent> = never_sent.clone();
        async move {
            let first = never_sent.wait().await;
            let second = never_sent.wait().await;
            (first, second)
        }
    });

    // Let the handler park, then cancel it.
    std::thread::sleep(Duration::from_millis(20));
    handler.request_cancellation();

    let (first, second) = handler.join()?;
    ensure_eq!(first.is_err(), true);
    ensure_eq!(first.unwrap_err().is_cancellation(), true);
    ensure_eq!(second.is_err(), true);
    ensure_eq!(second.unwrap_err().is_cancellation(), true);
    Ok(())
}
