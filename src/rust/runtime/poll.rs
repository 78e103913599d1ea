// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    future::Future,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Eq, PartialEq)]
/// The state of the task using this future.
enum YieldState {
    Running,
    Yielded,
}

/// This data structure implements a single future that will always sleep for one scheduling round and then wake again.
pub struct YieldFuture {
    /// State of the yield.
    state: YieldState,
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Gives the worker back to the scheduler for one round, letting other runnable tasks make progress.
pub async fn yield_now() {
    YieldFuture {
        state: YieldState::Running,
    }
    .await
}

//======================================================================================================================
// Trait Implementation
//======================================================================================================================

impl Future for YieldFuture {
    type Output = ();

    /// A yield for just one round. The first time that this future is polled, it is not ready but the next time it
    /// runs.
    fn poll(self: Pin<&mut Self>, context: &mut Context) -> Poll<Self::Output> {
        let self_: &mut Self = self.get_mut();
        if self_.state == YieldState::Running {
            self_.state = YieldState::Yielded;
            context.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
