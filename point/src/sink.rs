// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Log sink
//!
//! Points produce structured log records: who logged, in which state, with which tag. Every
//! record goes out as a `tracing` event. When a [`LogSink`] is registered on the runtime the
//! record is also handed to it, which lets an application keep its own log of point activity
//! (a file, a ring buffer, a test recorder).
//!

use crate::Address;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use std::fmt;
use std::time::SystemTime;

/// Kind of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// A point reported a fault.
    Fault,
    /// Something unexpected but recoverable.
    Warning,
    /// Operator-facing information.
    Console,
    /// Detailed execution trail.
    Trace,
    /// Developer diagnostics.
    Debug,
    /// A point was created.
    Created,
    /// A point was destroyed.
    Destroyed,
    /// A message was sent.
    Sent,
    /// A message was received.
    Received,
    /// A sampled value.
    Sample,
    /// A failed check.
    Check,
}

impl Tag {
    /// Single-letter form of the tag.
    pub fn letter(&self) -> char {
        match self {
            Tag::Fault => 'X',
            Tag::Warning => 'W',
            Tag::Console => '^',
            Tag::Trace => '~',
            Tag::Debug => '_',
            Tag::Created => '+',
            Tag::Destroyed => '-',
            Tag::Sent => '>',
            Tag::Received => '<',
            Tag::Sample => '&',
            Tag::Check => '?',
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// One structured log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// When the record was made.
    pub stamp: SystemTime,
    /// Kind of the record.
    pub tag: Tag,
    /// Address of the point that logged.
    pub address: Address,
    /// Name of the point type.
    pub name: &'static str,
    /// Current state of the point, when it has named states.
    pub state: Option<&'static str>,
    /// Free text.
    pub text: String,
}

impl LogRecord {
    /// Builds a record stamped with the current time.
    pub fn new(
        tag: Tag,
        address: Address,
        name: &'static str,
        state: Option<&'static str>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            stamp: SystemTime::now(),
            tag,
            address,
            name,
            state,
            text: text.into(),
        }
    }

    /// Emits the record as a `tracing` event at the level matching its tag.
    pub(crate) fn trace(&self) {
        let state = self.state.unwrap_or("");
        match self.tag {
            Tag::Fault => {
                error!(address = %self.address, name = self.name, state, "{}", self.text)
            }
            Tag::Warning | Tag::Check => {
                warn!(address = %self.address, name = self.name, state, "{}", self.text)
            }
            Tag::Console => {
                info!(address = %self.address, name = self.name, state, "{}", self.text)
            }
            Tag::Debug | Tag::Created | Tag::Destroyed => {
                debug!(address = %self.address, name = self.name, state, "{}", self.text)
            }
            Tag::Trace | Tag::Sent | Tag::Received | Tag::Sample => {
                trace!(address = %self.address, name = self.name, state, "{}", self.text)
            }
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            Some(state) => write!(
                f,
                "{} {} {}[{}] - {}",
                self.tag, self.address, self.name, state, self.text
            ),
            None => write!(f, "{} {} {} - {}", self.tag, self.address, self.name, self.text),
        }
    }
}

/// Consumer of log records.
///
/// Called on the thread of the point that logged, so implementations must be quick and must
/// not block.
pub trait LogSink: Send + Sync + 'static {
    /// Takes one record.
    fn record(&self, record: LogRecord);
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::collections::HashSet;
    use std::sync::Mutex;

    struct Memory(Mutex<Vec<LogRecord>>);

    impl LogSink for Memory {
        fn record(&self, record: LogRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    #[test]
    fn test_record_display() {
        let record = LogRecord::new(
            Tag::Console,
            Address::new(0x2a),
            "Server",
            Some("READY"),
            "listening",
        );
        assert_eq!(record.to_string(), "^ <0000002a> Server[READY] - listening");

        let record = LogRecord::new(Tag::Sent, Address::new(1), "Client", None, "Ping");
        assert_eq!(record.to_string(), "> <00000001> Client - Ping");
    }

    #[test]
    fn test_letters_are_distinct() {
        let tags = [
            Tag::Fault,
            Tag::Warning,
            Tag::Console,
            Tag::Trace,
            Tag::Debug,
            Tag::Created,
            Tag::Destroyed,
            Tag::Sent,
            Tag::Received,
            Tag::Sample,
            Tag::Check,
        ];
        let letters: HashSet<char> = tags.iter().map(Tag::letter).collect();
        assert_eq!(letters.len(), tags.len());
        assert_eq!(Tag::Destroyed.letter(), '-');
        assert_eq!(Tag::Fault.letter(), 'X');
    }

    #[test]
    fn test_sink_receives_records() {
        let sink = Memory(Mutex::new(Vec::new()));
        sink.record(LogRecord::new(Tag::Debug, Address::new(3), "Worker", None, "one"));
        sink.record(LogRecord::new(Tag::Fault, Address::new(3), "Worker", None, "two"));
        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tag, Tag::Fault);
    }
}
