// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Composition
//!
//! Ready-made points that combine other points:
//!
//! - [`GetResponse`] sends one request and completes with the answer.
//! - [`Concurrently`] runs a set of items at once and completes with every result, in order.
//! - [`Sequentially`] runs items one after the other and stops at the first fault.
//!
//! They are ordinary points: they only create, send, assign, debrief and abort. A `Stop` or an
//! expired timeout makes them abort their children and complete with `Aborted` or `TimedOut`,
//! never with a partial result.
//!

mod concurrently;
mod get_response;
mod sequentially;

pub use concurrently::Concurrently;
pub use get_response::GetResponse;
pub use sequentially::Sequentially;

use crate::{Address, Dispatch, Error, Message, Point, Runtime};

use std::time::Duration;

type Spawn = Box<dyn FnOnce(&Runtime, &Address) -> Result<Address, Error> + Send>;

/// One unit of work for [`Concurrently`] or [`Sequentially`].
pub struct Item {
    spawn: Spawn,
}

impl Item {
    /// An item run by a point of type `P`.
    pub fn create<P: Point>(point: P) -> Self {
        Self::create_on(point, P::DISPATCH)
    }

    /// An item run by a point of type `P` on an explicit dispatch.
    pub fn create_on<P: Point>(point: P, dispatch: Dispatch) -> Self {
        Self {
            spawn: Box::new(move |runtime, parent| runtime.spawn_point(point, dispatch, parent)),
        }
    }

    /// An item sending `request` to `server`; its result is the first reply.
    pub fn request<M: Message>(request: M, server: Address) -> Self {
        Self::create(GetResponse::new(request, server))
    }

    /// Like [`Item::request`], giving up after `timeout`.
    pub fn request_within<M: Message>(request: M, server: Address, timeout: Duration) -> Self {
        Self::create(GetResponse::new(request, server).with_timeout(timeout))
    }

    /// Creates the child for this item under `parent`.
    pub(crate) fn launch(self, runtime: &Runtime, parent: &Address) -> Result<Address, Error> {
        (self.spawn)(runtime, parent)
    }
}
