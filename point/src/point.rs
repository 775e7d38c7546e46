// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Point contract
//!
//! A point is the unit of concurrency: a value with its own address, reachable only by message.
//! Implementing [`Point`] is enough to run a type on the runtime; everything a point can do to
//! the outside world goes through its [`Context`].
//!
//! ## Execution
//!
//! Every `Context` operation runs on the thread currently dispatching the point. A dispatcher
//! hands a point one message at a time and never runs two messages of the same point at once,
//! so point state needs no locking.
//!
//! ## Termination
//!
//! A handler ends its point by returning `Err(Completion)`, usually through
//! [`Context::complete`]. A panic escaping the handler ends it too, as a fault. Either way the
//! dispatcher removes the point from the directory and sends exactly one `Completed` to the
//! parent.
//!
//! ## Children
//!
//! A parent tracks outstanding children in its job table. `assign` records a job, `debrief`
//! consumes it when the child's `Completed` arrives. `then` records a continuation instead,
//! which the dispatcher runs on arrival. `abort` asks every outstanding child to stop.
//!

use crate::{
    Address, AnyMessage, Channel, Completion, Dispatch, Error, Handled, Lifecycle, Message,
    Runtime, Stop, Value,
    clock::make_timer,
    config::DEFAULT_THREAD_CLASS,
    job::{Fastening, Job, OnCompleted, OnJoin},
    message::short_name,
    sink::{LogRecord, Tag},
};

use std::any::{TypeId, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// The base contract of every unit of concurrency.
///
/// # Examples
///
/// ```ignore
/// use point::{AnyMessage, Context, Handled, Point, Start, Value};
///
/// #[derive(Default)]
/// struct Hello;
///
/// impl Point for Hello {
///     fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
///         if message.is::<Start>() {
///             ctx.console("hello");
///             return ctx.complete(Value::new("done"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Point: Send + Sized + 'static {
    /// Where instances run unless the creator says otherwise.
    const DISPATCH: Dispatch = Dispatch::Shared(DEFAULT_THREAD_CLASS);

    /// Name of the point type, used in logs.
    fn name() -> &'static str {
        short_name(type_name::<Self>())
    }

    /// Name of the current state, for points organised as state machines.
    fn state(&self) -> Option<&'static str> {
        None
    }

    /// Handles one message.
    ///
    /// The sender is available as [`Context::return_address`]. Returning `Err(Completion)`
    /// ends the point.
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled;
}

/// Execution context of a point.
///
/// Owned by the dispatcher and lent to the point for the duration of each message.
pub struct Context<A: Point> {
    pub(crate) runtime: Runtime,
    /// Current address. Changes on hand-off and reclaim.
    pub(crate) address: Address,
    /// Address the point was created with.
    pub(crate) created: Address,
    pub(crate) parent: Address,
    pub(crate) to_address: Address,
    pub(crate) return_address: Address,
    pub(crate) jobs: BTreeMap<Address, Job<A>>,
    pub(crate) aborted: Option<Value>,
    pub(crate) aborting: bool,
    pub(crate) fastened: Option<Fastening<A>>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) state: Option<&'static str>,
}

impl<A: Point> Context<A> {
    pub(crate) fn new(runtime: Runtime, address: Address, parent: Address) -> Self {
        Self {
            runtime,
            created: address.clone(),
            address,
            parent,
            to_address: Address::none(),
            return_address: Address::none(),
            jobs: BTreeMap::new(),
            aborted: None,
            aborting: false,
            fastened: None,
            lifecycle: Lifecycle::Unborn,
            state: None,
        }
    }

    /// Current address of the point.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Address of the creator, the receiver of the final `Completed`.
    pub fn parent(&self) -> &Address {
        &self.parent
    }

    /// Address the message being handled was sent to.
    pub fn to_address(&self) -> &Address {
        &self.to_address
    }

    /// Return address of the message being handled.
    pub fn return_address(&self) -> &Address {
        &self.return_address
    }

    /// The runtime hosting this point.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Lifecycle state of the point.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    // Creation.

    /// Creates a child point where its type asks to run.
    ///
    /// Start is delivered asynchronously; the call returns as soon as the child is registered.
    ///
    /// # Errors
    ///
    /// `CodingProblem` once the runtime has shut down, `Spawn` when a thread can't be started.
    ///
    pub fn create<P: Point>(&self, point: P) -> Result<Address, Error> {
        self.create_on(point, P::DISPATCH)
    }

    /// Creates a child point on an explicit dispatch.
    pub fn create_on<P: Point>(&self, point: P, dispatch: Dispatch) -> Result<Address, Error> {
        self.runtime.spawn_point(point, dispatch, &self.address)
    }

    /// Runs a plain function as a child, on a thread of its own.
    ///
    /// The function gets a channel at the child's address. What it returns is the child's
    /// completion value; an error or a panic becomes a fault.
    pub fn create_routine<F>(&self, routine: F) -> Result<Address, Error>
    where
        F: FnOnce(&mut Channel) -> Result<Value, Error> + Send + 'static,
    {
        self.runtime.spawn_routine(routine, &self.address)
    }

    // Messaging.

    /// Sends a message. Delivery is not guaranteed and non-delivery is not reported.
    pub fn send<M: Message>(&self, message: M, to: &Address) {
        self.forward_any(AnyMessage::new(message), to, &self.address);
    }

    /// Sends a message that is already type-erased.
    pub fn send_any(&self, message: AnyMessage, to: &Address) {
        self.forward_any(message, to, &self.address);
    }

    /// Sends a message to the sender of the message being handled.
    pub fn reply<M: Message>(&self, message: M) {
        let to = self.return_address.clone();
        self.forward_any(AnyMessage::new(message), &to, &self.address);
    }

    /// Relays a message as if sent by `as_if_from`.
    pub fn forward<M: Message>(&self, message: M, to: &Address, as_if_from: &Address) {
        self.forward_any(AnyMessage::new(message), to, as_if_from);
    }

    /// Sends a message to the parent.
    pub fn advise<M: Message>(&self, message: M) {
        let to = self.parent.clone();
        self.forward_any(AnyMessage::new(message), &to, &self.address);
    }

    pub(crate) fn forward_any(&self, message: AnyMessage, to: &Address, from: &Address) {
        if self.runtime.config().message_trail {
            self.log(Tag::Sent, format!("{} to {}", message.name(), to));
        }
        self.runtime.directory().deliver(message, to, from);
    }

    // Timers.

    /// Starts the timer of kind `T`, delivered to this point after `after`.
    ///
    /// Starting a kind that is already pending resets its deadline. A timer may still arrive
    /// after it was cancelled or reset, handlers must tolerate it.
    pub fn start<T: Message + Default>(&self, after: Duration) {
        self.arm::<T>(after, false);
    }

    /// Starts the timer of kind `T`, delivered every `every` until cancelled.
    pub fn start_repeating<T: Message + Default>(&self, every: Duration) {
        self.arm::<T>(every, true);
    }

    /// Cancels the timer of kind `T`.
    pub fn cancel<T: Message>(&self) {
        if let Err(error) = self.runtime.clock().cancel(self.created.id(), TypeId::of::<T>()) {
            self.warning(format!("Can't cancel {}: {}", short_name(type_name::<T>()), error));
        }
    }

    fn arm<T: Message + Default>(&self, after: Duration, repeating: bool) {
        if let Err(error) = self.runtime.clock().start(
            self.created.id(),
            TypeId::of::<T>(),
            self.address.clone(),
            after,
            repeating,
            make_timer::<T>,
        ) {
            self.warning(format!("Can't start {}: {}", short_name(type_name::<T>()), error));
        }
    }

    // Termination.

    /// Ends the point with `value`.
    ///
    /// If an abort is in progress its remembered value is used instead. Meant to be returned
    /// straight from the handler:
    ///
    /// ```ignore
    /// return ctx.complete(Value::new(total));
    /// ```
    pub fn complete<T>(&mut self, value: Value) -> Result<T, Completion> {
        let value = self.aborted.take().unwrap_or(value);
        Err(Completion(value))
    }

    /// Sends `Stop` to every outstanding child and remembers `value` for a later `complete`.
    ///
    /// # Returns
    ///
    /// How many children were asked to stop. Zero means the point can complete right away.
    ///
    pub fn abort(&mut self, value: Option<Value>) -> usize {
        let children: Vec<Address> = self.jobs.keys().cloned().collect();
        for child in &children {
            self.send(Stop, child);
        }
        self.aborted = value;
        self.aborting = true;
        if let Some(fastening) = self.fastened.as_mut() {
            fastening.sent_stop = true;
        }
        children.len()
    }

    /// True once `abort` was called.
    pub fn aborting(&self) -> bool {
        self.aborting
    }

    // Job table.

    /// Records an outstanding job for `address`.
    pub fn assign(&mut self, address: Address, job: Job<A>) {
        self.jobs.insert(address, job);
    }

    /// Consumes the job of the sender of the message being handled.
    pub fn debrief(&mut self) -> Option<Job<A>> {
        let address = self.return_address.clone();
        self.jobs.remove(&address)
    }

    /// Consumes the job recorded for `address`.
    pub fn debrief_of(&mut self, address: &Address) -> Option<Job<A>> {
        self.jobs.remove(address)
    }

    /// Number of outstanding jobs.
    pub fn working(&self) -> usize {
        self.jobs.len()
    }

    /// The job of the sender of the message being handled.
    pub fn progress(&self) -> Option<&Job<A>> {
        self.jobs.get(&self.return_address)
    }

    /// The job recorded for `address`.
    pub fn progress_of(&self, address: &Address) -> Option<&Job<A>> {
        self.jobs.get(address)
    }

    /// Every outstanding job with its address.
    pub fn running(&self) -> impl Iterator<Item = (&Job<A>, &Address)> {
        self.jobs.iter().map(|(address, job)| (job, address))
    }

    /// Calls `then` with the completion value of `address` when it arrives.
    pub fn then(
        &mut self,
        address: Address,
        then: impl FnOnce(&mut A, &mut Context<A>, Value) -> Handled + Send + 'static,
    ) {
        self.assign(address, Job::Then(OnCompleted::new(then)));
    }

    // Fastening.

    /// Joins a fixed set of named children; the point completes with their values by name.
    ///
    /// The first child to complete causes one `Stop` to every other member.
    ///
    /// # Errors
    ///
    /// `CodingProblem` for an empty set, a repeated name or a second fastening.
    ///
    pub fn fasten<I, S>(&mut self, named: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (S, Address)>,
        S: Into<String>,
    {
        self.fasten_group(named, None)
    }

    /// Joins a fixed set of named children and calls `on_join` with their values by name.
    pub fn fasten_then<I, S>(
        &mut self,
        named: I,
        on_join: impl FnOnce(&mut A, &mut Context<A>, BTreeMap<String, Value>) -> Handled
        + Send
        + 'static,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (S, Address)>,
        S: Into<String>,
    {
        self.fasten_group(named, Some(Box::new(on_join)))
    }

    fn fasten_group<I, S>(
        &mut self,
        named: I,
        on_join: Option<OnJoin<A>>,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (S, Address)>,
        S: Into<String>,
    {
        if self.fastened.is_some() {
            return Err(Error::CodingProblem("already fastened".to_owned()));
        }
        let mut names = BTreeMap::new();
        for (name, address) in named {
            let name = name.into();
            if names.insert(name.clone(), address).is_some() {
                return Err(Error::CodingProblem(format!("fastened name {} repeated", name)));
            }
        }
        if names.is_empty() {
            return Err(Error::CodingProblem("nothing to fasten".to_owned()));
        }
        for (name, address) in &names {
            let name = name.clone();
            self.then(address.clone(), move |point, ctx, value| {
                ctx.joined(point, name, value)
            });
        }
        self.fastened = Some(Fastening::new(names, on_join));
        Ok(())
    }

    /// Address bound to `name` by `fasten`.
    pub fn fastened(&self, name: &str) -> Option<&Address> {
        self.fastened
            .as_ref()
            .and_then(|fastening| fastening.names.get(name))
    }

    fn joined(&mut self, point: &mut A, name: String, value: Value) -> Handled {
        let stop = match self.fastened.as_mut() {
            Some(fastening) => {
                fastening.values.insert(name, value);
                if fastening.sent_stop {
                    Vec::new()
                } else {
                    fastening.sent_stop = true;
                    fastening.outstanding()
                }
            }
            None => return Ok(()),
        };
        for address in &stop {
            self.send(Stop, address);
        }

        if !self.fastened.as_ref().is_some_and(|fastening| fastening.joined()) {
            return Ok(());
        }
        let Some(fastening) = self.fastened.take() else {
            return Ok(());
        };
        match fastening.on_join {
            Some(on_join) => on_join(point, self, fastening.values),
            None => self.complete(Value::new(fastening.values)),
        }
    }

    // Migration.

    /// Passes the current address to the point at `new` and steps aside to a caretaker address.
    ///
    /// # Returns
    ///
    /// The address given away, for a later [`Context::reclaim`].
    ///
    pub fn hand_off(&mut self, new: &Address) -> Result<Address, Error> {
        let (caretaker, dropped) = self.runtime.directory().hand_off(&self.address, new)?;
        if dropped > 0 {
            self.warning(format!("Lost {} message(s) during hand-off", dropped));
        }
        Ok(std::mem::replace(&mut self.address, caretaker))
    }

    /// Moves back into `original`, discarding the caretaker address.
    pub fn reclaim(&mut self, original: &Address) -> Result<(), Error> {
        let (address, dropped) = self.runtime.directory().reclaim(&self.address, original)?;
        if dropped > 0 {
            self.warning(format!("Lost {} message(s) during reclaim", dropped));
        }
        self.address = address;
        Ok(())
    }

    /// Removes the directory slot at `address`.
    pub fn discard(&self, address: &Address) {
        self.runtime.directory().remove(address);
    }

    // Logging.

    /// Records a log entry tagged `tag`.
    pub fn log(&self, tag: Tag, text: impl Into<String>) {
        self.runtime.record(LogRecord::new(
            tag,
            self.address.clone(),
            A::name(),
            self.state,
            text,
        ));
    }

    /// Records developer diagnostics.
    pub fn debug(&self, text: impl Into<String>) {
        self.log(Tag::Debug, text);
    }

    /// Records a step of the execution trail.
    pub fn trace(&self, text: impl Into<String>) {
        self.log(Tag::Trace, text);
    }

    /// Records operator-facing information.
    pub fn console(&self, text: impl Into<String>) {
        self.log(Tag::Console, text);
    }

    /// Records something unexpected but recoverable.
    pub fn warning(&self, text: impl Into<String>) {
        self.log(Tag::Warning, text);
    }

    /// Records a fault. The point keeps running.
    pub fn fault(&self, text: impl Into<String>) {
        self.log(Tag::Fault, text);
    }

    /// Records a named sample value.
    pub fn sample(&self, name: &str, value: impl fmt::Display) {
        self.log(Tag::Sample, format!("{}={}", name, value));
    }

    /// Records `note` as a failed check unless `condition` holds. Returns `condition`.
    pub fn test(&self, condition: bool, note: &str) -> bool {
        if !condition {
            self.log(Tag::Check, note);
        }
        condition
    }
}

impl<A: Point> fmt::Debug for Context<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("point", &A::name())
            .field("address", &self.address)
            .field("parent", &self.parent)
            .field("lifecycle", &self.lifecycle)
            .field("working", &self.jobs.len())
            .finish()
    }
}
