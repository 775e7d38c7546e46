// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

use crate::{
    AnyMessage, Completed, Context, Fault, Handled, Job, Message, Point, Start, Stop, Value,
    compose::Item,
};

use std::collections::VecDeque;
use std::time::Duration;

/// Timer of a sequential run.
#[derive(Debug, Default)]
struct SequenceTimeout;

impl Message for SequenceTimeout {}

/// Ordered chaining.
///
/// Creates each item only after the previous one completed without a fault, and completes with
/// the values in order. The first fault ends the sequence with that fault; later items are never
/// created. `Stop` and timeout behave as for [`Concurrently`](super::Concurrently).
pub struct Sequentially {
    items: VecDeque<Item>,
    results: Vec<Value>,
    timeout: Option<Duration>,
}

impl Sequentially {
    /// Runs `items` one after the other.
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: items.into_iter().collect(),
            results: Vec::new(),
            timeout: None,
        }
    }

    /// Gives up after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn next(&mut self, ctx: &mut Context<Self>) -> Handled {
        let Some(item) = self.items.pop_front() else {
            let results = std::mem::take(&mut self.results);
            return ctx.complete(Value::new(results));
        };
        let index = self.results.len();
        match item.launch(ctx.runtime(), ctx.address()) {
            Ok(child) => {
                ctx.assign(child, Job::tag(index));
                Ok(())
            }
            Err(e) => ctx.complete(Fault::faulted("cannot create item", &e.to_string()).into()),
        }
    }

    fn give_up(&mut self, ctx: &mut Context<Self>, fault: Fault) -> Handled {
        // The first cause wins, the jobs already got their `Stop`.
        if ctx.aborting() {
            return Ok(());
        }
        if ctx.abort(Some(fault.into())) == 0 {
            return ctx.complete(Value::unit());
        }
        Ok(())
    }
}

impl Point for Sequentially {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            if let Some(timeout) = self.timeout {
                ctx.start::<SequenceTimeout>(timeout);
            }
            return self.next(ctx);
        }
        let message = match message.downcast::<Completed>() {
            Ok(completed) => {
                if ctx.debrief().is_none() {
                    return Ok(());
                }
                if ctx.aborting() {
                    return ctx.complete(Value::unit());
                }
                if completed.value.is_fault() {
                    return ctx.complete(completed.value);
                }
                self.results.push(completed.value);
                return self.next(ctx);
            }
            Err(message) => message,
        };
        if message.is::<Stop>() {
            return self.give_up(ctx, Fault::Aborted);
        }
        if message.is::<SequenceTimeout>() {
            let after = self.timeout.unwrap_or_default();
            return self.give_up(ctx, Fault::timed_out(after));
        }
        Ok(())
    }
}
