// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Point runtime
//!
//! A concurrent-object runtime for building multi-threaded systems out of independent units of
//! execution, called points. Each point has an opaque address, communicates exclusively by
//! asynchronous messages and runs either on a thread of its own or multiplexed with other points
//! on a shared dispatcher thread.
//!
//! ## Overview
//!
//! In response to a message a point can:
//! - update its private state;
//! - create child points and keep track of them as jobs;
//! - send messages to any address, including its own;
//! - start and cancel timers;
//! - end itself with a completion value, which its parent receives as `Completed`.
//!
//! ## Core architecture
//!
//! ### Address directory and mailboxes
//!
//! The directory maps each live address to its receiver and to the mailbox feeding it. Sending
//! resolves the destination and enqueues an envelope; an address that can't be resolved drops
//! the message silently. The directory and the mailboxes are the only structures shared between
//! threads, each behind a short critical section.
//!
//! ### Dispatchers
//!
//! A dispatcher pulls envelopes and invokes the addressed point, one message at a time. It also
//! owns termination: however a point ends, it is removed from the directory and exactly one
//! `Completed` reaches its parent.
//!
//! ### Lifecycle
//!
//! Every point receives `Start` first. `Stop` asks it to clear its children and complete;
//! `Pause` and `Resume` are advisory. Cancellation is cooperative: nothing interrupts a running
//! handler.
//!
//! ### Migration
//!
//! A point can hand its address to another point for a while and reclaim it later, with queued
//! traffic redistributed and any loss reported.
//!
//! ### Composition
//!
//! [`GetResponse`], [`Concurrently`] and [`Sequentially`] are ready-made points for
//! request/response, fan-out/fan-in and ordered chaining.
//!
//! ## Getting started
//!
//! ```ignore
//! use point::{AnyMessage, Context, Handled, Point, Runtime, RuntimeConfig, Start, Value};
//!
//! struct Greeter;
//!
//! impl Point for Greeter {
//!     fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
//!         if message.is::<Start>() {
//!             return ctx.complete(Value::new("hello"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let runtime = Runtime::create(RuntimeConfig::default())?;
//! let mut channel = runtime.open_channel()?;
//! channel.create(Greeter)?;
//! let (value, _) = channel.wait_completed()?;
//! assert_eq!(value.downcast::<&str>().ok(), Some("hello"));
//! runtime.shutdown();
//! ```
//!

mod address;
mod channel;
mod clock;
mod compose;
mod config;
mod directory;
mod dispatcher;
mod error;
mod job;
mod lifecycle;
mod mailbox;
mod message;
mod migration;
mod point;
mod runtime;
mod sink;

//
// Identity and messages
//

/// Opaque identity of a point, channel or dispatcher.
pub use address::Address;

/// Messages, their type-erased form and the envelope that carries them.
pub use message::{AnyMessage, Envelope, Message, Value};

//
// Points
//

/// The base contract of every unit of concurrency, and its execution context.
pub use point::{Context, Point};

/// Outstanding-child bookkeeping.
pub use job::{Continuation, Job, OnCompleted, OnJoin};

/// The lifecycle vocabulary and the completion control transfer.
pub use lifecycle::{Completed, Completion, Handled, Lifecycle, Pause, Resume, Start, Stop};

pub(crate) use lifecycle::Interrupt;

//
// Runtime
//

/// Runtime handle, channels for blocking code and configuration.
pub use channel::Channel;
pub use config::{DEFAULT_THREAD_CLASS, Dispatch, MailboxPolicy, PEAK_BEFORE_DROPPED, RuntimeConfig};
pub use runtime::Runtime;

/// Address registry and mailbox.
pub use directory::{Directory, Entry};
pub use mailbox::Mailbox;

/// Predeclared timer kinds.
pub use clock::{T1, T2, T3, T4};

//
// Errors and logging
//

/// Synchronous errors and completion faults.
pub use error::{Error, Fault};

/// Structured log records and their consumer.
pub use sink::{LogRecord, LogSink, Tag};

//
// Composition
//

/// Request/response, fan-out/fan-in and ordered chaining as points.
pub use compose::{Concurrently, GetResponse, Item, Sequentially};
