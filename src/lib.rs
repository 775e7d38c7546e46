// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the Waypoint runtime.
//! Provides the foundational components for building systems out of concurrent points:
//! addresses, messages, dispatchers, timers and the composition helpers built on them.

pub use point::{
    Address, AnyMessage, Channel, Completed, Completion, Concurrently, Context, Continuation,
    DEFAULT_THREAD_CLASS, Directory, Dispatch, Entry, Envelope, Error as PointError, Fault,
    GetResponse, Handled, Item, Job, Lifecycle, LogRecord, LogSink, Mailbox, MailboxPolicy,
    Message, OnCompleted, OnJoin, PEAK_BEFORE_DROPPED, Pause, Point, Resume, Runtime,
    RuntimeConfig, Sequentially, Start, Stop, T1, T2, T3, T4, Tag, Value,
};
