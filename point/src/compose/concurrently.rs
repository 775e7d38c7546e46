// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

use crate::{
    AnyMessage, Context, Fault, Handled, Message, Point, Start, Stop, Value, compose::Item,
};

use std::time::Duration;

/// Timer of a concurrent run.
#[derive(Debug, Default)]
struct ConcurrentTimeout;

impl Message for ConcurrentTimeout {}

/// Fan-out, fan-in.
///
/// Creates one child per item on `Start` and completes with a `Vec<Value>` holding each item's
/// value at the item's position, once every child has completed. A `Stop` or an expired timeout
/// stops the children still running and completes with `Aborted` or `TimedOut`. No items means
/// an immediate empty `Vec`.
pub struct Concurrently {
    items: Vec<Item>,
    results: Vec<Option<Value>>,
    timeout: Option<Duration>,
}

impl Concurrently {
    /// Runs `items` at once.
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

    fn collect(&mut self, ctx: &mut Context<Self>, index: usize, value: Value) -> Handled {
        if let Some(slot) = self.results.get_mut(index) {
            *slot = Some(value);
        }
        if ctx.working() > 0 {
            return Ok(());
        }
        let results: Vec<Value> = std::mem::take(&mut self.results)
            .into_iter()
            .map(|value| value.unwrap_or_else(Value::unit))
            .collect();
        ctx.complete(Value::new(results))
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

impl Point for Concurrently {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            let items = std::mem::take(&mut self.items);
            if items.is_empty() {
                return ctx.complete(Value::new(Vec::<Value>::new()));
            }
            self.results = items.iter().map(|_| None).collect();
            if let Some(timeout) = self.timeout {
                ctx.start::<ConcurrentTimeout>(timeout);
            }
            for (index, item) in items.into_iter().enumerate() {
                match item.launch(ctx.runtime(), ctx.address()) {
                    Ok(child) => {
                        ctx.then(child, move |me, ctx, value| me.collect(ctx, index, value))
                    }
                    Err(e) => {
                        ctx.fault(format!("Can't create item {}: {}", index, e));
                        let fault = Fault::faulted("cannot create item", &e.to_string());
                        return self.give_up(ctx, fault);
                    }
                }
            }
            return Ok(());
        }
        if message.is::<Stop>() {
            return self.give_up(ctx, Fault::Aborted);
        }
        if message.is::<ConcurrentTimeout>() {
            let after = self.timeout.unwrap_or_default();
            return self.give_up(ctx, Fault::timed_out(after));
        }
        Ok(())
    }
}
