// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Addresses
//!
//! The `address` module provides the `Address` type. An address is the opaque identity of a point
//! inside one process: an ordered sequence of integers where only the last element is significant.
//!

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt::{Error, Formatter};
use std::hash::{Hash, Hasher};

/// Identity value reserved for "no address".
pub(crate) const NO_SUCH_ID: u64 = 0;

/// Opaque identity of a point, channel or dispatcher.
///
/// An address is a sequence of integers. Leading elements describe a route and are carried along
/// untouched; the last element is the identity. Two addresses with the same last element compare
/// equal and hash the same, whatever their route.
///
/// Identities are handed out by the address directory from a process-wide counter, so a live
/// address is never reused. The reserved sentinel [`Address::none`] names nothing and every
/// delivery to it is dropped.
///
/// # Display
///
/// Addresses print as the eight-digit hexadecimal form of their identity, e.g. `<0000002a>`.
///
/// ```ignore
/// use point::Address;
///
/// let a = Address::new(42);
/// assert_eq!(a.to_string(), "<0000002a>");
/// assert_eq!(a.prefixed(7), a);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Address(Vec<u64>);

impl Address {
    /// Creates a process-local address with the given identity.
    pub fn new(id: u64) -> Self {
        Address(vec![id])
    }

    /// The reserved "no address" sentinel.
    pub fn none() -> Self {
        Address(vec![NO_SUCH_ID])
    }

    /// True when this is the "no address" sentinel.
    pub fn is_none(&self) -> bool {
        self.id() == NO_SUCH_ID
    }

    /// The identity element of the address.
    ///
    /// An empty sequence has the sentinel identity.
    pub fn id(&self) -> u64 {
        self.0.last().copied().unwrap_or(NO_SUCH_ID)
    }

    /// The full sequence, route first and identity last.
    pub fn route(&self) -> &[u64] {
        &self.0
    }

    /// Number of elements in the sequence.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// A copy of this address with one more route element in front.
    ///
    /// The identity is unchanged, so the result is equal to `self`.
    pub fn prefixed(&self, hop: u64) -> Self {
        let mut route = Vec::with_capacity(self.0.len() + 1);
        route.push(hop);
        route.extend_from_slice(&self.0);
        Address(route)
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::none()
    }
}

impl From<u64> for Address {
    fn from(id: u64) -> Self {
        Address::new(id)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "<{:08x}>", self.id())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self.level().cmp(&1) {
            Ordering::Greater => {
                let route: Vec<String> =
                    self.0.iter().map(|e| format!("{:x}", e)).collect();
                write!(f, "<{}>", route.join("."))
            }
            _ => write!(f, "<{:08x}>", self.id()),
        }
    }
}
