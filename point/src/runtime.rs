// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Runtime
//!
//! The `runtime` module provides the [`Runtime`] type, responsible for creating points, starting
//! the threads that run them and taking everything down again.
//!
//! Blocking code enters the runtime through a [`Channel`]:
//!
//! ```ignore
//! use point::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::create(RuntimeConfig::default())?;
//! let mut channel = runtime.open_channel()?;
//! let worker = channel.create(Worker::default())?;
//! let (value, _) = channel.wait_completed()?;
//! runtime.shutdown();
//! ```
//!

use crate::{
    Address, AnyMessage, Channel, Completed, Context, Dispatch, Envelope, Error, Fault,
    Interrupt, Point, RuntimeConfig, Start, Stop, Value,
    channel::Halt,
    clock::Clock,
    directory::{Directory, Entry, Occupant},
    dispatcher::{Dispatchable, Hosted, panic_text, run_dedicated, run_shared},
    mailbox::Mailbox,
    sink::{LogRecord, LogSink, Tag},
};

use parking_lot::Mutex;
use tracing::{debug, error};

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};

/// State shared by every handle to one runtime.
struct Core {
    directory: Arc<Directory>,
    config: RuntimeConfig,
    sink: Option<Arc<dyn LogSink>>,
    clock: Clock,
    /// Thread class to shared dispatcher.
    thread_classes: Mutex<HashMap<&'static str, (Address, Arc<Mailbox>)>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// Handle to a running runtime. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    core: Arc<Core>,
}

impl Runtime {
    /// Starts a runtime.
    ///
    /// # Errors
    ///
    /// `CodingProblem` for an invalid configuration, `Spawn` when the clock thread can't be
    /// started.
    ///
    pub fn create(config: RuntimeConfig) -> Result<Self, Error> {
        Self::build(config, None)
    }

    /// Starts a runtime whose log records also go to `sink`.
    pub fn create_with_sink(config: RuntimeConfig, sink: Arc<dyn LogSink>) -> Result<Self, Error> {
        Self::build(config, Some(sink))
    }

    fn build(config: RuntimeConfig, sink: Option<Arc<dyn LogSink>>) -> Result<Self, Error> {
        config.validate()?;
        let directory = Arc::new(Directory::new());
        let clock = Clock::spawn(directory.clone())?;
        debug!("Runtime created.");
        Ok(Self {
            core: Arc::new(Core {
                directory,
                config,
                sink,
                clock,
                thread_classes: Mutex::new(HashMap::new()),
                threads: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.core.config
    }

    pub(crate) fn directory(&self) -> &Directory {
        &self.core.directory
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.core.clock
    }

    /// True until `shutdown` is called.
    pub fn is_running(&self) -> bool {
        !self.core.stopped.load(Ordering::SeqCst)
    }

    /// True while something is registered at `address`.
    pub fn contains(&self, address: &Address) -> bool {
        self.core.directory.contains(address)
    }

    /// Opens a channel for the calling code.
    pub fn open_channel(&self) -> Result<Channel, Error> {
        self.check_running()?;
        let (address, mailbox) = self.register_channel("Channel");
        Ok(Channel::new(self.clone(), address, Address::none(), mailbox))
    }

    /// Marks the channel at `address` as halted and wakes it.
    ///
    /// # Returns
    ///
    /// False when nothing is registered at `address`.
    ///
    pub fn halt(&self, address: &Address) -> bool {
        let halted = self.core.directory.with_exclusive(address, |entry| {
            entry.halt();
            matches!(entry.occupant, Occupant::Channel)
        });
        match halted {
            Some(true) => {
                self.core
                    .directory
                    .deliver(AnyMessage::new(Halt), address, &Address::none());
                true
            }
            Some(false) => true,
            None => false,
        }
    }

    /// Number of timers pending for the point or channel at `address`.
    pub fn pending_timers(&self, address: &Address) -> Result<usize, Error> {
        let owner = self
            .core
            .directory
            .owner_of(address)
            .unwrap_or_else(|| address.id());
        self.core.clock.pending(owner)
    }

    /// Takes the runtime down.
    ///
    /// Every live point is interrupted and still notifies its parent, with a
    /// `Faulted("object compromised")`. Shared dispatchers are stopped, every runtime thread is
    /// joined and the clock is stopped. Must be called from outside the runtime's threads.
    pub fn shutdown(&self) {
        if self.core.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Shutting down runtime.");
        let none = Address::none();
        let mut seen = HashSet::new();
        for (address, entry) in self.core.directory.snapshot() {
            if !seen.insert(entry.owner) {
                continue;
            }
            match entry.occupant {
                Occupant::Dedicated | Occupant::Channel => {
                    self.core
                        .directory
                        .deliver(AnyMessage::new(Interrupt), &address, &none)
                }
                Occupant::Dispatcher => {
                    self.core
                        .directory
                        .deliver(AnyMessage::new(Stop), &address, &none)
                }
                Occupant::Hosted(_) => {}
            }
        }

        loop {
            let threads = std::mem::take(&mut *self.core.threads.lock());
            if threads.is_empty() {
                break;
            }
            for thread in threads {
                if thread.join().is_err() {
                    error!("A runtime thread panicked.");
                }
            }
        }
        self.core.thread_classes.lock().clear();
        self.core.clock.stop();
        debug!("Runtime stopped.");
    }

    fn check_running(&self) -> Result<(), Error> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::CodingProblem("runtime is shut down".to_owned()))
        }
    }

    /// Emits a log record and hands it to the sink.
    pub(crate) fn record(&self, record: LogRecord) {
        record.trace();
        if let Some(sink) = &self.core.sink {
            sink.record(record);
        }
    }

    fn spawn_thread(
        &self,
        name: String,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<(), Error> {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(body)
            .map_err(|e| Error::Spawn(e.to_string()))?;
        let mut threads = self.core.threads.lock();
        threads.retain(|thread| !thread.is_finished());
        threads.push(handle);
        Ok(())
    }

    fn register_channel(&self, name: &'static str) -> (Address, Arc<Mailbox>) {
        let address = self.core.directory.allocate();
        let mailbox = Arc::new(Mailbox::new(self.core.config.channel_mailbox));
        self.core.directory.register(
            address.clone(),
            Entry::new(&address, name, address.clone(), mailbox.clone(), Occupant::Channel),
        );
        (address, mailbox)
    }

    /// Shared dispatcher of `class`, started on first use.
    fn dispatcher(&self, class: &'static str) -> Result<(Address, Arc<Mailbox>), Error> {
        let mut classes = self.core.thread_classes.lock();
        if let Some((address, mailbox)) = classes.get(class) {
            return Ok((address.clone(), mailbox.clone()));
        }
        let address = self.core.directory.allocate();
        let mailbox = Arc::new(Mailbox::new(self.core.config.shared_mailbox));
        self.core.directory.register(
            address.clone(),
            Entry::new(
                &address,
                "Dispatcher",
                address.clone(),
                mailbox.clone(),
                Occupant::Dispatcher,
            ),
        );
        let body = {
            let runtime = self.clone();
            let address = address.clone();
            let mailbox = mailbox.clone();
            move || run_shared(runtime, address, mailbox)
        };
        if let Err(e) = self.spawn_thread(format!("dispatcher-{}", class), body) {
            self.core.directory.remove(&address);
            return Err(e);
        }
        debug!("Dispatcher {} started for class {}.", address, class);
        classes.insert(class, (address.clone(), mailbox.clone()));
        Ok((address, mailbox))
    }

    fn created(&self, address: &Address, name: &'static str, parent: &Address) {
        if self.core.config.lifecycle {
            self.record(LogRecord::new(
                Tag::Created,
                address.clone(),
                name,
                None,
                format!("Created by {}", parent),
            ));
        }
    }

    /// Registers a point and delivers its `Start`.
    pub(crate) fn spawn_point<P: Point>(
        &self,
        point: P,
        dispatch: Dispatch,
        parent: &Address,
    ) -> Result<Address, Error> {
        self.check_running()?;
        let address = self.core.directory.allocate();
        let context = Context::new(self.clone(), address.clone(), parent.clone());
        let hosted = Hosted::new(point, context);
        // Recorded before `Start` can run, so it always precedes the matching `Destroyed`.
        self.created(&address, P::name(), parent);

        match dispatch {
            Dispatch::Dedicated => {
                let mailbox = Arc::new(Mailbox::new(self.core.config.dedicated_mailbox));
                mailbox.put(Envelope::new(
                    AnyMessage::new(Start),
                    address.clone(),
                    parent.clone(),
                ));
                self.core.directory.register(
                    address.clone(),
                    Entry::new(
                        &address,
                        P::name(),
                        address.clone(),
                        mailbox.clone(),
                        Occupant::Dedicated,
                    ),
                );
                let name = format!("{}{}", P::name(), address);
                if let Err(e) = self.spawn_thread(name, move || run_dedicated(hosted, mailbox)) {
                    self.core.directory.remove(&address);
                    return Err(e);
                }
            }
            Dispatch::Shared(class) => {
                let (feed, mailbox) = self.dispatcher(class)?;
                let object: Arc<Mutex<dyn Dispatchable>> = Arc::new(Mutex::new(hosted));
                self.core.directory.register(
                    address.clone(),
                    Entry::new(&address, P::name(), feed, mailbox, Occupant::Hosted(object)),
                );
                self.core
                    .directory
                    .deliver(AnyMessage::new(Start), &address, parent);
            }
        }

        Ok(address)
    }

    /// Runs `routine` on a thread of its own with a channel at a fresh address.
    pub(crate) fn spawn_routine<F>(&self, routine: F, parent: &Address) -> Result<Address, Error>
    where
        F: FnOnce(&mut Channel) -> Result<Value, Error> + Send + 'static,
    {
        self.check_running()?;
        let (address, mailbox) = self.register_channel("Routine");
        let mut channel = Channel::new(self.clone(), address.clone(), parent.clone(), mailbox);
        let body = move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| routine(&mut channel)));
            let value = match outcome {
                Ok(Ok(value)) => value,
                Ok(Err(Error::Interrupted)) => {
                    Fault::compromised("interrupted by runtime").into()
                }
                Ok(Err(error)) => Fault::faulted("routine failed", &error.to_string()).into(),
                Err(panic) => Fault::unhandled(&panic_text(panic.as_ref())).into(),
            };
            channel.finish(value);
        };
        self.created(&address, "Routine", parent);
        self.spawn_thread(format!("Routine{}", address), body)?;
        Ok(address)
    }

    /// The single termination path: remove, disarm, notify the parent.
    pub(crate) fn finish(
        &self,
        created: &Address,
        parent: &Address,
        name: &'static str,
        value: Value,
    ) {
        self.core.directory.remove_owned(created);
        self.core.clock.cancel_all(created.id());
        if self.core.config.lifecycle {
            self.record(LogRecord::new(
                Tag::Destroyed,
                created.clone(),
                name,
                None,
                format!("Destroyed with {:?}", value),
            ));
        }
        self.core
            .directory
            .deliver(AnyMessage::new(Completed::new(value)), parent, created);
    }
}
