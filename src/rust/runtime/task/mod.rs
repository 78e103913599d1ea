// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod context;
mod handle;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    context::{
        SharedTaskContext,
        TaskContext,
        TaskId,
        TaskState,
        WakeupSource,
    },
    handle::TaskHandle,
};

pub(crate) use self::context::{
    SleepToken,
    TaskCoroutine,
};
