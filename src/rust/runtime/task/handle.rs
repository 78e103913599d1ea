// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    task::context::{
        SharedTaskContext,
        TaskId,
        TaskState,
    },
    SharedObject,
};
use ::crossbeam_channel::{
    Receiver,
    RecvTimeoutError,
};
use ::parking_lot::Mutex;
use ::std::time::Duration;

//======================================================================================================================
// Structures
//======================================================================================================================

/// External handle to a spawned task. The handle shares ownership of the task's control block, so it stays valid for
/// result retrieval even after the task reaches a terminal state.
pub struct TaskHandle<R> {
    /// Control block of the task.
    context: SharedTaskContext,
    /// Output value of the coroutine, filled in on completion.
    result: SharedObject<Mutex<Option<R>>>,
    /// Signaled (by closing) when the result becomes available or the task is torn down.
    done: Receiver<()>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<R> TaskHandle<R> {
    pub(crate) fn new(context: SharedTaskContext, result: SharedObject<Mutex<Option<R>>>, done: Receiver<()>) -> Self {
        Self { context, result, done }
    }

    pub fn get_id(&self) -> TaskId {
        self.context.get_id()
    }

    /// Returns the externally visible lifecycle state of the task.
    pub fn get_state(&self) -> TaskState {
        self.context.get_state()
    }

    /// Checks whether the task has reached a terminal state.
    pub fn has_completed(&self) -> bool {
        self.context.has_completed()
    }

    /// Requests that the task abandon its current and all future suspensions. Cooperative: the task observes the
    /// cancellation at its next (or current) suspension point and decides how to unwind.
    pub fn request_cancellation(&self) {
        self.context.request_cancellation();
    }

    /// Takes the task's result if it is already available, without blocking.
    pub fn try_result(&self) -> Option<R> {
        self.result.lock().take()
    }

    /// Blocks the calling OS thread until the task produces its result. Meant for code outside the engine (e.g., a
    /// main thread driving the scheduler); tasks themselves must use the engine's synchronization primitives instead.
    pub fn join(self) -> Result<R, Fail> {
        // The sender is dropped when the coroutine completes or is torn down, so an error here just means "done".
        let _ = self.done.recv();
        match self.result.lock().take() {
            Some(result) => Ok(result),
            None => Err(Fail::new(libc::ESRCH, "task terminated without producing a result")),
        }
    }

    /// Like [Self::join], but gives up after `timeout`.
    pub fn join_timeout(self, timeout: Duration) -> Result<R, Fail> {
        if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(timeout) {
            return Err(Fail::timed_out("timed out waiting for task to complete"));
        }
        match self.result.lock().take() {
            Some(result) => Ok(result),
            None => Err(Fail::new(libc::ESRCH, "task terminated without producing a result")),
        }
    }
}
