// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Two families live here. [`Error`] is returned synchronously to the caller of a runtime
//! operation. [`Fault`] travels asynchronously, as the completion value a point hands to its
//! parent when it ends badly.
//!

use crate::Address;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for synchronous runtime operations.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Misuse of the runtime by the calling code.
    #[error("Coding problem: {0}.")]
    CodingProblem(String),
    /// An OS thread could not be started.
    #[error("Can't spawn thread: {0}")]
    Spawn(String),
    /// An address expected to be registered is not.
    #[error("Address {0} not found.")]
    NotFound(Address),
    /// The runtime interrupted a blocked channel during shutdown.
    #[error("Interrupted by runtime shutdown.")]
    Interrupted,
    /// A channel wait elapsed without a matching message.
    #[error("Timed out waiting for a message.")]
    Timeout,
    /// The channel was halted from another thread.
    #[error("Channel halted.")]
    Halted,
    /// The clock service is not running.
    #[error("Clock service unavailable.")]
    Clock,
}

/// Abnormal completion values.
///
/// Every variant counts as a fault: a sequence stops on any of them and a supervisor sees them
/// through the same `Completed` message as a normal result.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Fault {
    /// Application failure with a condition and an explanation.
    #[error("{condition} ({explanation})")]
    Faulted {
        /// Short description of what went wrong.
        condition: String,
        /// Detail of the failure.
        explanation: String,
    },
    /// The point was asked to stop before it produced a result.
    #[error("aborted")]
    Aborted,
    /// A timer started by the point expired before it produced a result.
    #[error("timed out after {seconds}s")]
    TimedOut {
        /// The span that expired.
        seconds: f64,
    },
}

impl Fault {
    /// Builds a `Faulted` value.
    pub fn faulted(condition: &str, explanation: &str) -> Self {
        Fault::Faulted {
            condition: condition.to_owned(),
            explanation: explanation.to_owned(),
        }
    }

    /// Builds a `TimedOut` value from a duration.
    pub fn timed_out(after: std::time::Duration) -> Self {
        Fault::TimedOut {
            seconds: after.as_secs_f64(),
        }
    }

    /// The fault a dispatcher reports for a point it had to interrupt.
    pub(crate) fn compromised(explanation: &str) -> Self {
        Fault::faulted("object compromised", explanation)
    }

    /// The fault a dispatcher reports for a point whose handler panicked.
    pub(crate) fn unhandled(explanation: &str) -> Self {
        Fault::faulted("object faulted", explanation)
    }
}
