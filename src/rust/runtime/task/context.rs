// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Control block for one lightweight task.
//!
//! A [TaskContext] is shared between the scheduler's ready queue, at most one wait queue, the timer and any external
//! [crate::runtime::task::TaskHandle]. All of them hold strong references, so the context is only reclaimed once the
//! task has reached a terminal state and the last holder lets go. The context also carries the sleep slot that
//! arbitrates wakeup races: whichever of {explicit wakeup, deadline expiry, cancellation} claims the slot first wins,
//! and the losers degrade to no-ops.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    scheduler::WorkerOp,
    timer::SharedTimer,
    Deadline,
    RequestDeadlineInfo,
    SharedObject,
};
use ::crossbeam_channel::Sender;
use ::futures::task::ArcWake;
use ::parking_lot::Mutex;
use ::std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{
            AtomicBool,
            AtomicU8,
            Ordering,
        },
        Arc,
        Weak,
    },
    task::{
        Context,
        Poll,
        Waker,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Internal scheduling states. These refine the externally visible [TaskState]: `NOTIFIED` means a wakeup arrived while
// a worker was still polling the task, so the worker re-enqueues the task instead of parking it.
const STATE_CREATED: u8 = 0;
const STATE_QUEUED: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_NOTIFIED: u8 = 3;
const STATE_SUSPENDED: u8 = 4;
const STATE_FINISHED: u8 = 5;
const STATE_CANCELLED: u8 = 6;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Externally visible task identifier.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct TaskId(pub u64);

/// Externally visible lifecycle state of a task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    /// Spawned but not enqueued yet.
    Created,
    /// Sitting in the ready queue, waiting for a worker.
    Runnable,
    /// Being polled by a worker right now.
    Running,
    /// Parked until a wakeup, deadline expiry or cancellation.
    Suspended,
    /// Ran to completion.
    Finished,
    /// Completed while a cancellation request was still raised.
    Cancelled,
}

/// Why a suspended task resumed. Exactly one source claims each sleep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeupSource {
    /// Another task explicitly woke this one through a wait queue.
    Signal,
    /// The effective deadline passed before any explicit wakeup arrived.
    Deadline,
    /// Cancellation was requested while the task was suspended.
    Cancel,
}

/// The boxed coroutine driven by the scheduler on behalf of a task.
pub(crate) type TaskCoroutine = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// State of the sleep currently in progress, if any. The slot mutex is the arbiter for the exactly-once wakeup
/// guarantee: all competing wakeup paths funnel through it.
struct SleepSlot {
    /// Bumped on every new sleep so that stale timer entries cannot wake a later sleep.
    epoch: u64,
    /// Whether a sleep is in progress.
    armed: bool,
    /// The source that claimed this sleep, if any.
    source: Option<WakeupSource>,
    /// Waker registered by the sleeping coroutine.
    waker: Option<Waker>,
}

/// Control block for one lightweight task.
pub struct TaskContext {
    /// Task identifier.
    id: TaskId,
    /// Task name. Callers should use this to identify what the task does.
    name: String,
    /// Internal scheduling state, one of the `STATE_*` constants.
    sched_state: AtomicU8,
    /// Level-persistent cancellation flag. Owned by the task: only the task itself may clear it.
    cancellation_requested: AtomicBool,
    /// Sleep currently in progress, if any.
    sleep_slot: Mutex<SleepSlot>,
    /// Deadline information for the unit of work this task is currently processing, if any.
    request_deadline: Mutex<Option<RequestDeadlineInfo>>,
    /// The coroutine to drive. Taken out by a worker for the duration of each poll.
    coroutine: Mutex<Option<TaskCoroutine>>,
    /// Channel for re-enqueueing this task on the scheduler's ready queue.
    ready: Sender<WorkerOp>,
    /// Timer used to turn deadlines into wakeups.
    timer: SharedTimer,
}

/// Shared handle to a [TaskContext].
#[derive(Clone)]
pub struct SharedTaskContext(SharedObject<TaskContext>);

/// One pending sleep of a task. Awaiting the token parks the coroutine until a wakeup source claims the sleep.
pub(crate) struct SleepToken {
    context: SharedTaskContext,
    epoch: u64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TaskContext {
    pub fn get_id(&self) -> TaskId {
        self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Returns the externally visible lifecycle state of this task.
    pub fn get_state(&self) -> TaskState {
        match self.sched_state.load(Ordering::Acquire) {
            STATE_CREATED => TaskState::Created,
            STATE_QUEUED => TaskState::Runnable,
            STATE_RUNNING | STATE_NOTIFIED => TaskState::Running,
            STATE_SUSPENDED => TaskState::Suspended,
            STATE_FINISHED => TaskState::Finished,
            STATE_CANCELLED => TaskState::Cancelled,
            state => unreachable!("invalid scheduling state: {:?}", state),
        }
    }

    /// Checks whether this task has reached a terminal state.
    pub fn has_completed(&self) -> bool {
        matches!(self.get_state(), TaskState::Finished | TaskState::Cancelled)
    }

    /// Requests that this task abandon its current and all future suspensions. If the task is suspended, it is woken
    /// with [WakeupSource::Cancel]; otherwise the raised flag makes its next suspension return immediately. The flag
    /// stays raised until the task itself clears it with [Self::clear_cancellation_request].
    pub fn request_cancellation(&self) {
        self.cancellation_requested.store(true, Ordering::SeqCst);
        if self.wakeup(WakeupSource::Cancel) {
            trace!("request_cancellation(): woke suspended task: id={:?}", self.id);
        }
    }

    /// Checks whether cancellation has been requested for this task.
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancellation_requested.load(Ordering::SeqCst)
    }

    /// Lowers the cancellation flag. Only the task itself should call this, once it has acknowledged the request.
    pub fn clear_cancellation_request(&self) {
        self.cancellation_requested.store(false, Ordering::SeqCst);
    }

    /// Attempts to claim the sleep currently in progress for `source`. Returns false if no sleep is in progress or
    /// another source already claimed it.
    pub(crate) fn wakeup(&self, source: WakeupSource) -> bool {
        let mut slot = self.sleep_slot.lock();
        if !slot.armed || slot.source.is_some() {
            return false;
        }
        slot.source = Some(source);
        let waker: Option<Waker> = slot.waker.take();
        drop(slot);
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Like [Self::wakeup], but only claims the sleep identified by `epoch`. Used by the timer, whose queue entries
    /// may outlive the sleep they were registered for.
    pub(crate) fn wakeup_at_epoch(&self, source: WakeupSource, epoch: u64) -> bool {
        let mut slot = self.sleep_slot.lock();
        if slot.epoch != epoch || !slot.armed || slot.source.is_some() {
            return false;
        }
        slot.source = Some(source);
        let waker: Option<Waker> = slot.waker.take();
        drop(slot);
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Accessor for the per-task request deadline slot.
    pub(crate) fn request_deadline_slot(&self) -> &Mutex<Option<RequestDeadlineInfo>> {
        &self.request_deadline
    }

    pub(crate) fn get_timer(&self) -> &SharedTimer {
        &self.timer
    }

    /// Installs the coroutine this task will run. Must be called exactly once, before the task is first scheduled.
    pub(crate) fn set_coroutine(&self, coroutine: TaskCoroutine) {
        let previous: Option<TaskCoroutine> = self.coroutine.lock().replace(coroutine);
        assert!(previous.is_none(), "task {:?} already has a coroutine", self.id);
    }

    /// Takes the coroutine out for polling. Returns None if the task already completed.
    pub(crate) fn take_coroutine(&self) -> Option<TaskCoroutine> {
        self.coroutine.lock().take()
    }

    /// Puts the coroutine back after a poll that returned pending.
    pub(crate) fn put_coroutine(&self, coroutine: TaskCoroutine) {
        let previous: Option<TaskCoroutine> = self.coroutine.lock().replace(coroutine);
        debug_assert!(previous.is_none());
    }

    /// Transitions this task from the ready queue into the running state. Returns false if the task is no longer
    /// runnable (e.g., it completed while a stale wakeup was still queued).
    pub(crate) fn try_begin_running(&self) -> bool {
        self.sched_state
            .compare_exchange(STATE_QUEUED, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks this task terminal. The terminal state is `Cancelled` if the cancellation flag is still raised when the
    /// coroutine completes, and `Finished` otherwise.
    pub(crate) fn complete(&self) {
        let state: u8 = if self.is_cancellation_requested() {
            STATE_CANCELLED
        } else {
            STATE_FINISHED
        };
        self.sched_state.store(state, Ordering::Release);
        trace!("complete(): id={:?}, name={:?}, state={:?}", self.id, self.name, self.get_state());
    }
}

impl SharedTaskContext {
    /// Creates the control block for a new task. The coroutine is installed separately with
    /// [TaskContext::set_coroutine] because it usually captures shared state that outlives the spawn call.
    pub(crate) fn new(id: TaskId, name: String, ready: Sender<WorkerOp>, timer: SharedTimer) -> Self {
        Self(SharedObject::new(TaskContext {
            id,
            name,
            sched_state: AtomicU8::new(STATE_CREATED),
            cancellation_requested: AtomicBool::new(false),
            sleep_slot: Mutex::new(SleepSlot {
                epoch: 0,
                armed: false,
                source: None,
                waker: None,
            }),
            request_deadline: Mutex::new(None),
            coroutine: Mutex::new(None),
            ready,
            timer,
        }))
    }

    pub(crate) fn from_arc(context: Arc<TaskContext>) -> Self {
        Self(SharedObject::from_arc(context))
    }

    pub(crate) fn clone_arc(&self) -> Arc<TaskContext> {
        self.0.arc().clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<TaskContext> {
        Arc::downgrade(self.0.arc())
    }

    /// Enqueues this task on the scheduler's ready queue, unless it is already queued, completed, or being polled (in
    /// which case the polling worker re-enqueues it).
    pub(crate) fn schedule(&self) {
        Self::schedule_arc(self.0.arc());
    }

    fn schedule_arc(context: &Arc<TaskContext>) {
        loop {
            let state: u8 = context.sched_state.load(Ordering::Acquire);
            match state {
                STATE_CREATED | STATE_SUSPENDED => {
                    if context
                        .sched_state
                        .compare_exchange(state, STATE_QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        let task: SharedTaskContext = SharedTaskContext::from_arc(context.clone());
                        if context.ready.send(WorkerOp::Run(task)).is_err() {
                            warn!("schedule(): scheduler is shut down, dropping wakeup: id={:?}", context.id);
                        }
                        return;
                    }
                },
                STATE_RUNNING => {
                    if context
                        .sched_state
                        .compare_exchange(STATE_RUNNING, STATE_NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                },
                // Already queued, notified, or terminal: nothing to do.
                _ => return,
            }
        }
    }

    /// Releases the running state after a poll that returned pending. If a wakeup arrived while the worker was
    /// polling, the task goes straight back to the ready queue instead of parking.
    pub(crate) fn release_after_poll(&self) {
        if self
            .sched_state
            .compare_exchange(STATE_RUNNING, STATE_SUSPENDED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // The only state that can replace RUNNING mid-poll is NOTIFIED.
            self.sched_state.store(STATE_QUEUED, Ordering::Release);
            if self.ready.send(WorkerOp::Run(self.clone())).is_err() {
                warn!("release_after_poll(): scheduler is shut down, dropping wakeup: id={:?}", self.id);
            }
        }
    }

    /// Arms a new sleep for this task and returns the token to await on. If `interruptible` is set and cancellation
    /// is already requested, the sleep comes pre-claimed by [WakeupSource::Cancel] so the caller observes the
    /// cancellation without parking.
    pub(crate) fn prepare_sleep(&self, interruptible: bool) -> SleepToken {
        let mut slot = self.sleep_slot.lock();
        debug_assert!(!slot.armed, "task {:?} armed a sleep while one was in progress", self.id);
        slot.epoch += 1;
        slot.armed = true;
        slot.waker = None;
        slot.source = if interruptible && self.is_cancellation_requested() {
            Some(WakeupSource::Cancel)
        } else {
            None
        };
        SleepToken {
            context: self.clone(),
            epoch: slot.epoch,
        }
    }
}

impl SleepToken {
    /// Parks the calling coroutine until a wakeup source claims this sleep. If `wake_time` is reachable, a timer
    /// entry is registered so that deadline expiry claims the sleep with [WakeupSource::Deadline].
    pub(crate) async fn wait(self, wake_time: Deadline) -> WakeupSource {
        if let Some(expiry) = wake_time.time_point() {
            let timer: SharedTimer = self.context.get_timer().clone();
            timer.enqueue(expiry, &self.context, self.epoch);
        }
        self.await
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl std::ops::Deref for SharedTaskContext {
    type Target = TaskContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Contexts compare by identity: two handles are equal when they refer to the same task.
impl PartialEq for SharedTaskContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.0.arc(), other.0.arc())
    }
}

impl Eq for SharedTaskContext {}

impl fmt::Debug for SharedTaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.get_state())
            .finish()
    }
}

/// Wakers handed to coroutines route back into the scheduler through the task's control block.
impl ArcWake for TaskContext {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        SharedTaskContext::schedule_arc(arc_self);
    }
}

impl Future for SleepToken {
    type Output = WakeupSource;

    fn poll(self: Pin<&mut Self>, context: &mut Context) -> Poll<Self::Output> {
        let self_: &mut Self = self.get_mut();
        let mut slot = self_.context.sleep_slot.lock();
        debug_assert_eq!(slot.epoch, self_.epoch, "sleep token outlived its sleep");
        match slot.source.take() {
            Some(source) => {
                slot.armed = false;
                slot.waker = None;
                Poll::Ready(source)
            },
            None => {
                slot.waker = Some(context.waker().clone());
                Poll::Pending
            },
        }
    }
}

/// Disarms the sleep if the token is dropped without resolving, so a stray wakeup cannot claim a later sleep.
impl Drop for SleepToken {
    fn drop(&mut self) {
        let mut slot = self.context.sleep_slot.lock();
        if slot.epoch == self.epoch {
            slot.armed = false;
            slot.source = None;
            slot.waker = None;
        }
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TaskId> for u64 {
    fn from(value: TaskId) -> Self {
        value.0
    }
}
