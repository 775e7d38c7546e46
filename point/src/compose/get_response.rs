// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

use crate::{
    Address, AnyMessage, Context, Fault, Handled, Message, Point, Start, Stop, Value,
};

use std::time::Duration;

/// Timer of a pending response.
#[derive(Debug, Default)]
struct ResponseTimeout;

impl Message for ResponseTimeout {}

/// Request/response as a point.
///
/// On `Start` sends the request to the server. Completes with the first other message it
/// receives, taken as the answer. A `Stop` completes it with `Aborted`, an expired timeout with
/// `TimedOut`.
pub struct GetResponse {
    request: Option<AnyMessage>,
    server: Address,
    timeout: Option<Duration>,
}

impl GetResponse {
    /// Asks `server` with `request`.
    pub fn new<M: Message>(request: M, server: Address) -> Self {
        Self {
            request: Some(AnyMessage::new(request)),
            server,
            timeout: None,
        }
    }

    /// Gives up after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Point for GetResponse {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            if let Some(timeout) = self.timeout {
                ctx.start::<ResponseTimeout>(timeout);
            }
            if let Some(request) = self.request.take() {
                ctx.send_any(request, &self.server);
            }
            return Ok(());
        }
        if message.is::<Stop>() {
            return ctx.complete(Fault::Aborted.into());
        }
        if message.is::<ResponseTimeout>() {
            let after = self.timeout.unwrap_or_default();
            return ctx.complete(Fault::timed_out(after).into());
        }
        ctx.complete(Value::from(message))
    }
}
