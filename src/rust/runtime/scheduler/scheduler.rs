// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Implementation of our cooperative task scheduler.
//!
//! Lightweight tasks are pinned, boxed coroutines multiplexed over a small pool of worker OS threads. Workers pull
//! runnable tasks from one shared ready queue; a task occupies a worker only while it is being polled and goes back
//! to the queue on every wakeup. Deadlines are serviced by a dedicated timer thread owned by the scheduler.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    config::Config,
    runtime::{
        fail::Fail,
        task::{
            SharedTaskContext,
            TaskCoroutine,
            TaskHandle,
            TaskId,
        },
        timer::SharedTimer,
        SharedObject,
    },
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::futures::task::waker;
use ::parking_lot::Mutex;
use ::std::{
    cell::RefCell,
    future::Future,
    panic::{
        catch_unwind,
        AssertUnwindSafe,
    },
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    task::{
        Context,
        Poll,
        Waker,
    },
    thread,
};

//======================================================================================================================
// Thread Local Variables
//======================================================================================================================

thread_local! {
    /// The task the calling worker thread is currently polling, if any. This is how suspend operations find their own
    /// control block without threading it through every call.
    static CURRENT_TASK: RefCell<Option<SharedTaskContext>> = const { RefCell::new(None) };
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Unit of work handed to a worker thread.
pub(crate) enum WorkerOp {
    /// Poll this task.
    Run(SharedTaskContext),
    /// Exit the worker loop.
    Exit,
}

/// Task Scheduler
pub struct Scheduler {
    /// Producer side of the ready queue. Cloned into every task so wakeups can re-enqueue it.
    ready_tx: Sender<WorkerOp>,
    /// Timer servicing deadline wakeups for all tasks of this scheduler.
    timer: SharedTimer,
    /// Worker threads.
    workers: Vec<thread::JoinHandle<()>>,
    /// Timer thread.
    timer_thread: Option<thread::JoinHandle<()>>,
    /// Next task id to hand out.
    next_task_id: AtomicU64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Scheduler {
    /// Creates a scheduler with `worker_threads` workers and starts its timer thread.
    pub fn new(worker_threads: usize) -> Result<Self, Fail> {
        let worker_threads: usize = worker_threads.max(1);
        let (ready_tx, ready_rx): (Sender<WorkerOp>, Receiver<WorkerOp>) = crossbeam_channel::unbounded();
        let timer: SharedTimer = SharedTimer::new();

        let mut workers: Vec<thread::JoinHandle<()>> = Vec::with_capacity(worker_threads);
        for i in 0..worker_threads {
            let ready_rx: Receiver<WorkerOp> = ready_rx.clone();
            let handle: thread::JoinHandle<()> = thread::Builder::new()
                .name(format!("weft-worker-{}", i))
                .spawn(move || Self::worker_loop(ready_rx))?;
            workers.push(handle);
        }

        let timer_thread: thread::JoinHandle<()> = {
            let timer: SharedTimer = timer.clone();
            thread::Builder::new()
                .name("weft-timer".to_string())
                .spawn(move || timer.run())?
        };

        trace!("new(): started scheduler: worker_threads={:?}", worker_threads);
        Ok(Self {
            ready_tx,
            timer,
            workers,
            timer_thread: Some(timer_thread),
            next_task_id: AtomicU64::new(1),
        })
    }

    /// Creates a scheduler sized from a configuration file.
    pub fn from_config(config: &Config) -> Result<Self, Fail> {
        Self::new(config.worker_threads()?)
    }

    /// Inserts the coroutine named `task_name` into the scheduler, returning a handle for joining and cancellation.
    pub fn spawn<F, R>(&self, task_name: &str, coroutine: F) -> TaskHandle<R>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let task_id: TaskId = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let context: SharedTaskContext = SharedTaskContext::new(
            task_id,
            task_name.to_string(),
            self.ready_tx.clone(),
            self.timer.clone(),
        );

        let result: SharedObject<Mutex<Option<R>>> = SharedObject::new(Mutex::new(None));
        let (done_tx, done_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
        let wrapper: TaskCoroutine = {
            let result: SharedObject<Mutex<Option<R>>> = result.clone();
            Box::pin(async move {
                let output: R = coroutine.await;
                *result.lock() = Some(output);
                let _ = done_tx.send(());
            })
        };
        context.set_coroutine(wrapper);

        trace!("spawn(): name={:?}, id={:?}", task_name, task_id);
        context.schedule();
        TaskHandle::new(context, result, done_rx)
    }

    /// Worker thread body: poll runnable tasks until told to exit.
    fn worker_loop(ready_rx: Receiver<WorkerOp>) {
        while let Ok(op) = ready_rx.recv() {
            match op {
                WorkerOp::Run(context) => Self::run_task(context),
                WorkerOp::Exit => break,
            }
        }
    }

    /// Polls one runnable task. The task's coroutine is taken out of the control block for the duration of the poll,
    /// and the control block arbitrates wakeups that arrive while we are polling.
    fn run_task(context: SharedTaskContext) {
        if !context.try_begin_running() {
            // A stale wakeup raced with completion.
            trace!("run_task(): skipping task that is no longer runnable: id={:?}", context.get_id());
            return;
        }
        let mut coroutine: TaskCoroutine = match context.take_coroutine() {
            Some(coroutine) => coroutine,
            None => {
                warn!("run_task(): task has no coroutine: id={:?}", context.get_id());
                return;
            },
        };

        CURRENT_TASK.with(|current| *current.borrow_mut() = Some(context.clone()));
        let waker: Waker = waker(context.clone_arc());
        let mut poll_context: Context = Context::from_waker(&waker);
        let poll_result: Result<Poll<()>, _> =
            catch_unwind(AssertUnwindSafe(|| Future::poll(coroutine.as_mut(), &mut poll_context)));
        CURRENT_TASK.with(|current| *current.borrow_mut() = None);

        match poll_result {
            Ok(Poll::Ready(())) => context.complete(),
            Ok(Poll::Pending) => {
                context.put_coroutine(coroutine);
                context.release_after_poll();
            },
            Err(cause) => {
                // The coroutine panicked. Tear the task down but keep the worker alive; the panic surfaces to anyone
                // joining the task as a missing result.
                error!("run_task(): task panicked: id={:?}, cause={:?}", context.get_id(), cause);
                context.complete();
            },
        }
    }

    /// Stops all worker threads and the timer thread. Tasks still parked or queued are abandoned.
    fn stop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.ready_tx.send(WorkerOp::Exit);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.timer.stop();
        if let Some(handle) = self.timer_thread.take() {
            let _ = handle.join();
        }
        trace!("stop(): scheduler stopped");
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Returns the task the calling worker thread is currently polling, if any.
pub fn try_current() -> Option<SharedTaskContext> {
    CURRENT_TASK.with(|current| current.borrow().clone())
}

/// Returns the task the calling worker thread is currently polling. Calling this from outside a task is a usage
/// contract violation.
pub fn current() -> SharedTaskContext {
    try_current().expect("must be called from within a task")
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::Scheduler;
    use crate::runtime::{
        sleep_until,
        task::TaskState,
        yield_now,
        Deadline,
    };
    use ::anyhow::Result;
    use ::std::{
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        thread,
        time::{
            Duration,
            Instant,
        },
    };

    fn eventually<F: Fn() -> bool>(condition: F) -> bool {
        let give_up: Instant = Instant::now() + Duration::from_secs(5);
        while !condition() {
            if Instant::now() > give_up {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    #[test]
    fn spawned_task_returns_its_result() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let handle = scheduler.spawn("answer", async { 42 });
        crate::ensure_eq!(handle.join()?, 42);
        Ok(())
    }

    #[test]
    fn spawned_tasks_get_unique_ids() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let first = scheduler.spawn("first", async {});
        let second = scheduler.spawn("second", async {});
        crate::ensure_neq!(first.get_id(), second.get_id());
        Ok(())
    }

    #[test]
    fn many_yielding_tasks_all_run_to_completion() -> Result<()> {
        const NUM_TASKS: usize = 100;
        let scheduler: Scheduler = Scheduler::new(4)?;
        let counter: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(NUM_TASKS);
        for i in 0..NUM_TASKS {
            let counter: Arc<AtomicUsize> = counter.clone();
            handles.push(scheduler.spawn(&format!("task-{}", i), async move {
                yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.join()?;
        }
        crate::ensure_eq!(counter.load(Ordering::SeqCst), NUM_TASKS);
        Ok(())
    }

    #[test]
    fn completed_task_reaches_finished_state() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let handle = scheduler.spawn("finisher", async {});
        crate::ensure_eq!(eventually(|| handle.has_completed()), true);
        crate::ensure_eq!(handle.get_state(), TaskState::Finished);
        Ok(())
    }

    /// A task that completes while its cancellation flag is still raised ends in the cancelled terminal state.
    #[test]
    fn cancelled_task_reaches_cancelled_state() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let handle = scheduler.spawn("cancellee", async {
            let _ = sleep_until(Deadline::unreachable()).await;
        });

        crate::ensure_eq!(eventually(|| handle.get_state() == TaskState::Suspended), true);
        handle.request_cancellation();
        crate::ensure_eq!(eventually(|| handle.has_completed()), true);
        crate::ensure_eq!(handle.get_state(), TaskState::Cancelled);
        Ok(())
    }

    #[test]
    fn panicking_task_surfaces_as_missing_result() -> Result<()> {
        let scheduler: Scheduler = Scheduler::new(2)?;
        let handle = scheduler.spawn("panicker", async {
            panic!("deliberate");
        });
        crate::ensure_eq!(handle.join().is_err(), true);

        // The worker survived the panic and keeps servicing tasks.
        let handle = scheduler.spawn("survivor", async { 7 });
        crate::ensure_eq!(handle.join()?, 7);
        Ok(())
    }
}
