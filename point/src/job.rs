// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Jobs module.
//!
//! A parent keeps one job per outstanding child, from the moment it assigns the child until it
//! debriefs the child's `Completed`. A job is either an arbitrary tag the parent uses to
//! recognise the result, or a continuation the dispatcher calls with the child's value.
//!

use crate::{Address, Context, Handled, Point, Value};

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Deferred call invoked with a child's completion value.
pub type Continuation<A> = Box<dyn FnOnce(&mut A, &mut Context<A>, Value) -> Handled + Send>;

/// Call made once every fastened child has completed, with the values by name.
pub type OnJoin<A> =
    Box<dyn FnOnce(&mut A, &mut Context<A>, BTreeMap<String, Value>) -> Handled + Send>;

/// A continuation waiting for one child.
pub struct OnCompleted<A: Point> {
    call: Continuation<A>,
}

impl<A: Point> OnCompleted<A> {
    /// Wraps a function of the point, its context and the child's value.
    pub fn new(
        call: impl FnOnce(&mut A, &mut Context<A>, Value) -> Handled + Send + 'static,
    ) -> Self {
        Self {
            call: Box::new(call),
        }
    }

    /// Runs the continuation.
    pub(crate) fn invoke(self, point: &mut A, ctx: &mut Context<A>, value: Value) -> Handled {
        (self.call)(point, ctx, value)
    }
}

/// Job descriptor held for an outstanding child.
pub enum Job<A: Point> {
    /// A tag recognised by the parent when the child completes.
    Tag(Value),
    /// A continuation called with the child's completion value.
    Then(OnCompleted<A>),
}

impl<A: Point> Job<A> {
    /// Job identified by `tag`.
    pub fn tag<T: Any + Send>(tag: T) -> Self {
        Job::Tag(Value::new(tag))
    }

    /// Borrows the tag as a `T`.
    pub fn tag_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Job::Tag(value) => value.downcast_ref::<T>(),
            Job::Then(_) => None,
        }
    }

    /// True for continuation jobs.
    pub fn is_continuation(&self) -> bool {
        matches!(self, Job::Then(_))
    }
}

impl<A: Point> fmt::Debug for Job<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Tag(value) => write!(f, "Tag({})", value.name()),
            Job::Then(_) => write!(f, "Then"),
        }
    }
}

/// A fixed set of named children joined as one.
///
/// The first completion stops the rest, once. The last completion joins.
pub(crate) struct Fastening<A: Point> {
    pub(crate) names: BTreeMap<String, Address>,
    pub(crate) values: BTreeMap<String, Value>,
    pub(crate) sent_stop: bool,
    pub(crate) on_join: Option<OnJoin<A>>,
}

impl<A: Point> Fastening<A> {
    pub(crate) fn new(names: BTreeMap<String, Address>, on_join: Option<OnJoin<A>>) -> Self {
        Self {
            names,
            values: BTreeMap::new(),
            sent_stop: false,
            on_join,
        }
    }

    /// Addresses of members that have not completed yet.
    pub(crate) fn outstanding(&self) -> Vec<Address> {
        self.names
            .iter()
            .filter(|(name, _)| !self.values.contains_key(*name))
            .map(|(_, address)| address.clone())
            .collect()
    }

    /// True once every member has completed.
    pub(crate) fn joined(&self) -> bool {
        self.values.len() == self.names.len()
    }
}
