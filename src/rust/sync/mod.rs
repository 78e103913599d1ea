// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Synchronization primitives for lightweight tasks.
//!
//! All primitives here are thin compositions over the engine's wait queues: they park the calling task instead of
//! blocking the worker thread, honor the deadline inherited from the current unit of work, and report cancellation
//! as an error instead of swallowing it.

mod condvar;
mod event;
mod mutex;
mod semaphore;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    condvar::ConditionVariable,
    event::SingleConsumerEvent,
    mutex::{
        Mutex,
        MutexGuard,
    },
    semaphore::{
        Semaphore,
        SemaphoreGuard,
    },
};
