// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Channels
//!
//! A channel gives blocking code an address of its own. It owns a mailbox registered in the
//! directory and reads it on the calling thread, so a test, a `main` function or a routine can
//! create points, send to them and wait for their answers.
//!

use crate::{
    Address, AnyMessage, Completed, Dispatch, Envelope, Error, Interrupt, Message, Point, Runtime,
    Stop, Value, clock::make_timer, mailbox::Mailbox,
};

use tracing::{debug, trace};

use std::any::TypeId;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runtime-private wake-up for a channel halted from another thread.
#[derive(Debug)]
pub(crate) struct Halt;

impl Message for Halt {}

/// Address-owning endpoint for blocking code.
pub struct Channel {
    runtime: Runtime,
    address: Address,
    parent: Address,
    mailbox: Arc<Mailbox>,
    saved: VecDeque<Envelope>,
    jobs: BTreeMap<Address, Value>,
    return_address: Address,
}

impl Channel {
    pub(crate) fn new(
        runtime: Runtime,
        address: Address,
        parent: Address,
        mailbox: Arc<Mailbox>,
    ) -> Self {
        Self {
            runtime,
            address,
            parent,
            mailbox,
            saved: VecDeque::new(),
            jobs: BTreeMap::new(),
            return_address: Address::none(),
        }
    }

    /// Address of the channel.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Address of the creator; the sentinel for channels opened on the runtime.
    pub fn parent(&self) -> &Address {
        &self.parent
    }

    /// Return address of the last message received.
    pub fn return_address(&self) -> &Address {
        &self.return_address
    }

    /// Creates a child point where its type asks to run.
    pub fn create<P: Point>(&self, point: P) -> Result<Address, Error> {
        self.runtime.spawn_point(point, P::DISPATCH, &self.address)
    }

    /// Creates a child point on an explicit dispatch.
    pub fn create_on<P: Point>(&self, point: P, dispatch: Dispatch) -> Result<Address, Error> {
        self.runtime.spawn_point(point, dispatch, &self.address)
    }

    /// Runs a plain function as a child on a thread of its own.
    pub fn create_routine<F>(&self, routine: F) -> Result<Address, Error>
    where
        F: FnOnce(&mut Channel) -> Result<Value, Error> + Send + 'static,
    {
        self.runtime.spawn_routine(routine, &self.address)
    }

    /// Sends a message from this channel.
    pub fn send<M: Message>(&self, message: M, to: &Address) {
        self.runtime
            .directory()
            .deliver(AnyMessage::new(message), to, &self.address);
    }

    /// Sends a message to the sender of the last message received.
    pub fn reply<M: Message>(&self, message: M) {
        self.runtime
            .directory()
            .deliver(AnyMessage::new(message), &self.return_address, &self.address);
    }

    /// Relays a message as if sent by `as_if_from`.
    pub fn forward<M: Message>(&self, message: M, to: &Address, as_if_from: &Address) {
        self.runtime
            .directory()
            .deliver(AnyMessage::new(message), to, as_if_from);
    }

    /// Starts the timer of kind `T`, delivered to this channel after `after`.
    pub fn start<T: Message + Default>(&self, after: Duration) -> Result<(), Error> {
        self.runtime.clock().start(
            self.address.id(),
            TypeId::of::<T>(),
            self.address.clone(),
            after,
            false,
            make_timer::<T>,
        )
    }

    /// Cancels the timer of kind `T`.
    pub fn cancel<T: Message>(&self) -> Result<(), Error> {
        self.runtime
            .clock()
            .cancel(self.address.id(), TypeId::of::<T>())
    }

    /// Records an outstanding job for `address`.
    pub fn assign<T: std::any::Any + Send>(&mut self, address: Address, tag: T) {
        self.jobs.insert(address, Value::new(tag));
    }

    /// Consumes the job of the sender of the last message received.
    pub fn debrief(&mut self) -> Option<Value> {
        self.jobs.remove(&self.return_address)
    }

    /// Number of outstanding jobs.
    pub fn working(&self) -> usize {
        self.jobs.len()
    }

    /// Consumes the job recorded for `address`.
    pub fn debrief_of(&mut self, address: &Address) -> Option<Value> {
        self.jobs.remove(address)
    }

    /// The job of the sender of the last message received.
    pub fn progress(&self) -> Option<&Value> {
        self.jobs.get(&self.return_address)
    }

    /// The job recorded for `address`.
    pub fn progress_of(&self, address: &Address) -> Option<&Value> {
        self.jobs.get(address)
    }

    /// Every outstanding job with its address.
    pub fn running(&self) -> impl Iterator<Item = (&Value, &Address)> {
        self.jobs.iter().map(|(address, job)| (job, address))
    }

    /// Sends `Stop` to every outstanding job. Returns how many were asked.
    ///
    /// The jobs stay recorded until their `Completed` arrives.
    pub fn abort(&mut self) -> usize {
        for job in self.jobs.keys() {
            self.runtime
                .directory()
                .deliver(AnyMessage::new(Stop), job, &self.address);
        }
        self.jobs.len()
    }

    /// Stops every outstanding job and waits until all of them have completed.
    ///
    /// Returns the completion values by job address. `Completed` messages from anything that is
    /// not a job are kept for later receives.
    ///
    /// # Errors
    ///
    /// `Interrupted` when the runtime shuts down, `Halted` when the channel is halted. The jobs
    /// not yet completed stay recorded.
    ///
    pub fn clear(&mut self) -> Result<BTreeMap<Address, Value>, Error> {
        let asked = self.abort();
        debug!("Channel {} clearing {} jobs.", self.address, asked);
        let mut values = BTreeMap::new();
        let mut others = VecDeque::new();
        let result = loop {
            if self.jobs.is_empty() {
                break Ok(values);
            }
            match self.select::<Completed>() {
                Ok((completed, from)) => {
                    if self.jobs.remove(&from).is_some() {
                        values.insert(from, completed.value);
                    } else {
                        let message = AnyMessage::new(completed);
                        others.push_back(Envelope::new(message, self.address.clone(), from));
                    }
                }
                Err(e) => break Err(e),
            }
        };
        self.saved.extend(others);
        result
    }

    /// True once the channel was halted through the runtime.
    pub fn halted(&self) -> bool {
        self.runtime
            .directory()
            .lookup(&self.address)
            .is_some_and(|entry| entry.is_halted())
    }

    /// Waits for the next message.
    ///
    /// # Errors
    ///
    /// `Interrupted` when the runtime shuts down, `Halted` when the channel is halted.
    ///
    pub fn recv(&mut self) -> Result<(AnyMessage, Address), Error> {
        if let Some(envelope) = self.saved.pop_front() {
            return self.accept(envelope);
        }
        self.check_halted()?;
        let envelope = self.mailbox.pull();
        self.accept(envelope)
    }

    /// Waits at most `timeout` for the next message.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<(AnyMessage, Address), Error> {
        if let Some(envelope) = self.saved.pop_front() {
            return self.accept(envelope);
        }
        self.check_halted()?;
        let envelope = self.mailbox.pull_timeout(timeout).ok_or(Error::Timeout)?;
        self.accept(envelope)
    }

    /// Waits for a message of type `M`, keeping everything else for later receives.
    pub fn select<M: Message>(&mut self) -> Result<(M, Address), Error> {
        self.select_until::<M>(None)
    }

    /// Waits at most `timeout` for a message of type `M`.
    pub fn select_timeout<M: Message>(&mut self, timeout: Duration) -> Result<(M, Address), Error> {
        self.select_until::<M>(Some(Instant::now() + timeout))
    }

    /// Waits for the `Completed` of a child and debriefs it.
    pub fn wait_completed(&mut self) -> Result<(Value, Address), Error> {
        let (completed, from) = self.select::<Completed>()?;
        self.jobs.remove(&from);
        Ok((completed.value, from))
    }

    fn select_until<M: Message>(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(M, Address), Error> {
        if let Some(index) = self.saved.iter().position(|envelope| envelope.message.is::<M>()) {
            if let Some(envelope) = self.saved.remove(index) {
                return self.take::<M>(envelope);
            }
        }
        loop {
            self.check_halted()?;
            let envelope = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    self.mailbox.pull_timeout(left).ok_or(Error::Timeout)?
                }
                None => self.mailbox.pull(),
            };
            if envelope.message.is::<Interrupt>() {
                return Err(Error::Interrupted);
            }
            if envelope.message.is::<Halt>() {
                return Err(Error::Halted);
            }
            if envelope.message.is::<M>() {
                return self.take::<M>(envelope);
            }
            trace!("Channel {} saved {}.", self.address, envelope.message.name());
            self.saved.push_back(envelope);
        }
    }

    fn take<M: Message>(&mut self, envelope: Envelope) -> Result<(M, Address), Error> {
        let Envelope { message, from, .. } = envelope;
        self.return_address = from.clone();
        match message.downcast::<M>() {
            Ok(message) => Ok((message, from)),
            Err(message) => Err(Error::CodingProblem(format!(
                "selected {} is not the expected type",
                message.name()
            ))),
        }
    }

    fn accept(&mut self, envelope: Envelope) -> Result<(AnyMessage, Address), Error> {
        if envelope.message.is::<Interrupt>() {
            return Err(Error::Interrupted);
        }
        if envelope.message.is::<Halt>() {
            return Err(Error::Halted);
        }
        self.return_address = envelope.from.clone();
        Ok((envelope.message, envelope.from))
    }

    fn check_halted(&self) -> Result<(), Error> {
        if self.halted() {
            Err(Error::Halted)
        } else {
            Ok(())
        }
    }

    /// Ends a routine: cleans up and tells the parent, once.
    pub(crate) fn finish(&mut self, value: Value) {
        self.runtime
            .finish(&self.address, &self.parent, "Routine", value);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        debug!("Channel {} closed.", self.address);
        self.runtime.directory().remove_owned(&self.address);
        self.runtime.clock().cancel_all(self.address.id());
    }
}
