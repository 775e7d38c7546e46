// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dispatchers
//!
//! A dispatcher is the body of an OS thread: it pulls envelopes from one mailbox, routes each to
//! the point it is addressed to and handles the point's termination. It is the only caller of a
//! point's handler.
//!
//! ## Shapes
//!
//! - *Dedicated*: one thread for one point. The loop ends with the point.
//! - *Shared*: one thread for every point of a thread class. Points on the same dispatcher never
//!   run concurrently. A `Stop` sent to the dispatcher's own address ends the loop; points still
//!   hosted at that moment end as compromised.
//!
//! ## Termination
//!
//! Whether a handler completes, panics or is interrupted, the point goes through the same path:
//! its directory slots are removed, its timers cancelled and exactly one `Completed` goes to the
//! parent. Panics never cross the dispatcher boundary.
//!

use crate::{
    Address, AnyMessage, Completed, Completion, Context, Envelope, Fault, Handled, Interrupt,
    Lifecycle, Point, Runtime, Start, Stop, Value,
    directory::Occupant,
    job::Job,
    mailbox::Mailbox,
    sink::Tag,
};

use tracing::{debug, trace, warn};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A point together with its context, as seen by a dispatcher.
pub(crate) trait Dispatchable: Send {
    /// Handles one envelope. Returns the completion value when the point ended.
    fn dispatch(&mut self, envelope: Envelope) -> Option<Value>;

    /// Removes the point and notifies its parent. Does nothing the second time.
    fn finalize(&mut self, value: Value);
}

/// Text of a caught panic.
pub(crate) fn panic_text(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic".to_owned()
    }
}

/// A point and its context.
pub(crate) struct Hosted<A: Point> {
    point: A,
    ctx: Context<A>,
}

impl<A: Point> Hosted<A> {
    pub(crate) fn new(point: A, ctx: Context<A>) -> Self {
        Self { point, ctx }
    }
}

/// Routes one message to the point, running a pending continuation for a child's `Completed`.
fn received<A: Point>(point: &mut A, ctx: &mut Context<A>, message: AnyMessage) -> Handled {
    if !message.is::<Completed>() || !ctx.progress().is_some_and(Job::is_continuation) {
        return point.received(ctx, message);
    }
    let completed = match message.downcast::<Completed>() {
        Ok(completed) => completed,
        Err(message) => return point.received(ctx, message),
    };
    match ctx.debrief() {
        Some(Job::Then(then)) => then.invoke(point, ctx, completed.value),
        Some(job) => {
            // Not a continuation after all; put it back for the handler.
            let from = ctx.return_address.clone();
            ctx.assign(from, job);
            point.received(ctx, AnyMessage::new(completed))
        }
        None => point.received(ctx, AnyMessage::new(completed)),
    }
}

impl<A: Point> Dispatchable for Hosted<A> {
    fn dispatch(&mut self, envelope: Envelope) -> Option<Value> {
        let Hosted { point, ctx } = self;
        if ctx.lifecycle == Lifecycle::Dead {
            trace!("{} to finished point {}.", envelope.message.name(), envelope.to);
            return None;
        }
        let Envelope { message, to, from } = envelope;
        ctx.to_address = to;
        ctx.return_address = from;
        ctx.state = point.state();

        if message.is::<Interrupt>() {
            ctx.warning("Interrupted by runtime");
            ctx.lifecycle = Lifecycle::Terminating;
            return Some(Fault::compromised("interrupted by runtime").into());
        }
        if message.is::<Start>() && ctx.lifecycle == Lifecycle::Unborn {
            ctx.lifecycle = Lifecycle::Active;
        }
        if ctx.runtime.config().execution_trace {
            ctx.log(
                Tag::Received,
                format!("{} from {}", message.name(), ctx.return_address),
            );
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| received(point, ctx, message)));
        let value = match outcome {
            Ok(Ok(())) => return None,
            Ok(Err(Completion(value))) => value,
            Err(panic) => {
                let text = panic_text(panic.as_ref());
                ctx.fault(format!("Unhandled: {}", text));
                Fault::unhandled(&text).into()
            }
        };
        ctx.lifecycle = Lifecycle::Terminating;
        Some(value)
    }

    fn finalize(&mut self, value: Value) {
        let ctx = &mut self.ctx;
        if ctx.lifecycle == Lifecycle::Dead {
            return;
        }
        ctx.lifecycle = Lifecycle::Dead;
        ctx.runtime.finish(&ctx.created, &ctx.parent, A::name(), value);
    }
}

/// Thread body of a point with a dedicated thread.
///
/// The first envelope in the mailbox is the point's `Start`.
pub(crate) fn run_dedicated<A: Point>(mut hosted: Hosted<A>, mailbox: Arc<Mailbox>) {
    let runtime = hosted.ctx.runtime.clone();
    let owner = hosted.ctx.created.id();
    debug!("Dedicated thread for {} {} running.", A::name(), hosted.ctx.created);
    loop {
        let envelope = mailbox.pull();
        if !envelope.message.is::<Interrupt>()
            && runtime.directory().owner_of(&envelope.to) != Some(owner)
        {
            trace!("Stale {} to {} ignored.", envelope.message.name(), envelope.to);
            continue;
        }
        if let Some(value) = hosted.dispatch(envelope) {
            hosted.finalize(value);
            break;
        }
    }
    debug!("Dedicated thread for {} ended.", A::name());
}

/// Thread body of a shared dispatcher.
pub(crate) fn run_shared(runtime: Runtime, address: Address, mailbox: Arc<Mailbox>) {
    debug!("Dispatcher {} running.", address);
    loop {
        let envelope = mailbox.pull();
        if envelope.to == address {
            if envelope.message.is::<Stop>() || envelope.message.is::<Interrupt>() {
                break;
            }
            trace!("Dispatcher {} ignored {}.", address, envelope.message.name());
            continue;
        }
        let Some(entry) = runtime.directory().lookup(&envelope.to) else {
            trace!("{} to {} dropped, no such point.", envelope.message.name(), envelope.to);
            continue;
        };
        let Occupant::Hosted(object) = entry.occupant else {
            trace!("{} to {} dropped, not hosted.", envelope.message.name(), envelope.to);
            continue;
        };
        let mut object = object.lock();
        if let Some(value) = object.dispatch(envelope) {
            object.finalize(value);
        }
    }

    let orphans = runtime.directory().remove_fed_by(&address);
    if !orphans.is_empty() {
        warn!("Dispatcher {} stopped with {} points hosted.", address, orphans.len());
    }
    for (_, entry) in orphans {
        if let Occupant::Hosted(object) = entry.occupant {
            object
                .lock()
                .finalize(Fault::compromised("dispatcher stopped").into());
        }
    }
    runtime.directory().remove(&address);
    debug!("Dispatcher {} stopped.", address);
}
