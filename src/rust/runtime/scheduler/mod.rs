// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#[allow(clippy::module_inception)]
mod scheduler;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::scheduler::{
    current,
    try_current,
    Scheduler,
};

pub(crate) use self::scheduler::WorkerOp;
