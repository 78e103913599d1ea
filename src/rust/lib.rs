// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod runtime;
pub mod sync;

pub use crate::runtime::{
    scheduler::Scheduler,
    task::{
        TaskHandle,
        TaskId,
        TaskState,
        WakeupSource,
    },
    Deadline,
    SharedObject,
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the calling function with an error otherwise. This is meant
/// for tests that return [anyhow::Result], where a panicking assertion would abort the whole test binary.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(
                        "ensure failed: `(left == right)`\n  left: `{:?}`\n right: `{:?}`",
                        left_val,
                        right_val
                    );
                }
            },
        }
    }};
}

/// Ensures that two expressions are not equal, bailing out of the calling function with an error otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left != right)`\n  left: `{:?}`\n right: `{:?}`",
                        left_val,
                        right_val
                    );
                }
            },
        }
    }};
}
