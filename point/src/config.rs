// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Runtime configuration
//!

use crate::Error;

use serde::{Deserialize, Serialize};

/// Queue length past which a drop-oldest mailbox starts discarding.
pub const PEAK_BEFORE_DROPPED: usize = 1_000_000;

/// Thread class of points that do not name one.
pub const DEFAULT_THREAD_CLASS: &str = "default";

/// What a mailbox does when a put finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxPolicy {
    /// Never full.
    Unbounded,
    /// The sender waits for space.
    Blocking {
        /// Maximum number of queued envelopes.
        capacity: usize,
    },
    /// The oldest queued envelope is discarded to make room.
    DropOldest {
        /// Queue length that triggers discarding.
        peak: usize,
    },
}

impl Default for MailboxPolicy {
    fn default() -> Self {
        MailboxPolicy::DropOldest {
            peak: PEAK_BEFORE_DROPPED,
        }
    }
}

/// Where a point runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On a thread of its own.
    Dedicated,
    /// Multiplexed with the other points of the named thread class.
    Shared(&'static str),
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch::Shared(DEFAULT_THREAD_CLASS)
    }
}

/// Runtime configuration.
///
/// ```ignore
/// use point::{MailboxPolicy, RuntimeConfig};
///
/// let config = RuntimeConfig {
///     shared_mailbox: MailboxPolicy::Blocking { capacity: 1024 },
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Mailbox of each point with a dedicated thread.
    pub dedicated_mailbox: MailboxPolicy,
    /// Mailbox of each shared dispatcher thread.
    pub shared_mailbox: MailboxPolicy,
    /// Mailbox of each channel and routine.
    pub channel_mailbox: MailboxPolicy,
    /// Record point creation and destruction.
    pub lifecycle: bool,
    /// Record every send.
    pub message_trail: bool,
    /// Record every receive.
    pub execution_trace: bool,
}

impl RuntimeConfig {
    /// Checks that every mailbox policy can accept an envelope.
    ///
    /// # Errors
    ///
    /// `CodingProblem` for a blocking mailbox of capacity zero.
    ///
    pub fn validate(&self) -> Result<(), Error> {
        let mailboxes = [
            ("dedicated", self.dedicated_mailbox),
            ("shared", self.shared_mailbox),
            ("channel", self.channel_mailbox),
        ];
        for (name, policy) in mailboxes {
            if let MailboxPolicy::Blocking { capacity: 0 } = policy {
                return Err(Error::CodingProblem(format!(
                    "{} mailbox has no capacity",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dedicated_mailbox: MailboxPolicy::default(),
            shared_mailbox: MailboxPolicy::default(),
            channel_mailbox: MailboxPolicy::Unbounded,
            lifecycle: true,
            message_trail: true,
            execution_trace: true,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(
            config.dedicated_mailbox,
            MailboxPolicy::DropOldest {
                peak: PEAK_BEFORE_DROPPED
            }
        );
        assert_eq!(config.channel_mailbox, MailboxPolicy::Unbounded);
        assert_eq!(Dispatch::default(), Dispatch::Shared("default"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = RuntimeConfig {
            shared_mailbox: MailboxPolicy::Blocking { capacity: 0 },
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            Error::CodingProblem("shared mailbox has no capacity".to_owned())
        );
    }
}
