// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Lifecycle protocol
//!
//! The fixed vocabulary every point understands, and the control transfer used to end a point.
//!

use crate::{Error, Fault, Message, Value};

/// First message delivered to every point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Start;

impl Message for Start {}

/// Request to tear down. Points are expected to clear their children and complete.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stop;

impl Message for Stop {}

/// Advisory request to suspend activity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pause;

impl Message for Pause {}

/// Advisory request to resume after a `Pause`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Resume;

impl Message for Resume {}

/// Last message of a point, sent to its parent with the completion value.
#[derive(Debug)]
pub struct Completed {
    /// What the point completed with.
    pub value: Value,
}

impl Completed {
    /// Wraps a completion value.
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Message for Completed {}

/// Runtime-private notice that the process is going down.
#[derive(Debug)]
pub(crate) struct Interrupt;

impl Message for Interrupt {}

/// Control transfer ending a point with a value.
///
/// A handler returns `Err(Completion)` to end its point. The dispatcher catches it, removes the
/// point from the directory and passes the value to the parent inside a [`Completed`].
#[derive(Debug)]
pub struct Completion(pub Value);

impl Completion {
    /// The value the point ends with.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Synchronous misuse inside a handler is fatal to the point that made it.
impl From<Error> for Completion {
    fn from(error: Error) -> Self {
        Completion(Value::from(Fault::faulted(
            "runtime error",
            &error.to_string(),
        )))
    }
}

/// Result of one handler invocation.
pub type Handled = Result<(), Completion>;

/// States a point moves through.
///
/// No transition ever leads back to `Active` once a point is `Terminating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Registered, `Start` not yet delivered.
    Unborn,
    /// Processing messages.
    Active,
    /// A completion was raised or a fault escaped; cleanup pending.
    Terminating,
    /// Directory entry removed and `Completed` sent.
    Dead,
}
