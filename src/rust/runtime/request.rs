// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Deadline propagation for units of work.
//!
//! Whoever drives one unit of work (e.g., a server dispatching one inbound request per task) records its start time
//! and deadline here at the beginning of handling. The information lives in a slot on the task's own control block,
//! so it follows the task across worker threads, and every suspend operation the task performs consults it to bound
//! its wait. Misuse of the registry (activating twice, reading with nothing active) is a bug in the driving
//! collaborator and fails loudly.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    scheduler,
    task::SharedTaskContext,
    Deadline,
};
use ::std::time::Instant;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Deadline information for one unit of work: when handling began, and by when it must complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestDeadlineInfo {
    /// When handling of the unit of work began.
    start_time: Instant,
    /// The point in time by which the unit of work must complete.
    deadline: Deadline,
}

/// Scoped activation of a [RequestDeadlineInfo] for the current task. Deactivates on drop, so the deadline cannot
/// leak into unrelated later work on the same task regardless of how the unit of work exits.
pub struct RequestDeadlineScope(());

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl RequestDeadlineInfo {
    pub fn new(start_time: Instant, deadline: Deadline) -> Self {
        Self { start_time, deadline }
    }

    pub fn get_start_time(&self) -> Instant {
        self.start_time
    }

    pub fn get_deadline(&self) -> Deadline {
        self.deadline
    }
}

impl RequestDeadlineScope {
    /// Activates `info` for the current task and deactivates it again when the returned scope is dropped.
    pub fn new(info: RequestDeadlineInfo) -> Self {
        set_current_request_deadline_info(info);
        Self(())
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Activates `info` for the current task. Activating while another [RequestDeadlineInfo] is active is a usage
/// contract violation: call sites must pair every activation with a reset.
pub fn set_current_request_deadline_info(info: RequestDeadlineInfo) {
    let context: SharedTaskContext = scheduler::current();
    let mut slot = context.request_deadline_slot().lock();
    assert!(
        slot.is_none(),
        "request deadline info is already active for task {:?}",
        context.get_id()
    );
    *slot = Some(info);
}

/// Returns the active [RequestDeadlineInfo] of the current task. Calling with none active is a usage contract
/// violation; callers that cannot structurally guarantee prior activation must use
/// [get_current_request_deadline_info_unchecked] instead.
pub fn get_current_request_deadline_info() -> RequestDeadlineInfo {
    get_current_request_deadline_info_unchecked().expect("no request deadline info is active for the current task")
}

/// Returns the active [RequestDeadlineInfo] of the current task, or None if none is active or the caller is not
/// running inside a task.
pub fn get_current_request_deadline_info_unchecked() -> Option<RequestDeadlineInfo> {
    let context: SharedTaskContext = scheduler::try_current()?;
    let info: Option<RequestDeadlineInfo> = *context.request_deadline_slot().lock();
    info
}

/// Deactivates the current task's [RequestDeadlineInfo]. Must be reached on every exit path of the unit of work;
/// prefer [RequestDeadlineScope] to make that structural.
pub fn reset_current_request_deadline_info() {
    let context: SharedTaskContext = scheduler::current();
    context.request_deadline_slot().lock().take();
}

/// Returns the deadline portion of the current task's active [RequestDeadlineInfo], or None. This is what suspend
/// operations consult to compute their effective wake time.
pub fn get_current_task_inherited_deadline_unchecked() -> Option<Deadline> {
    get_current_request_deadline_info_unchecked().map(|info| info.get_deadline())
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for RequestDeadlineScope {
    fn drop(&mut self) {
        // The scope can be torn down together with its coroutine if the scheduler shuts down mid-request; there is
        // no task slot left to clear in that case.
        if scheduler::try_current().is_some() {
            reset_current_request_deadline_info();
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
