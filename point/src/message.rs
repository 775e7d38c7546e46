// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages
//!
//! Points receive messages of any registered type over the same substrate. A message travels
//! type-erased inside an [`Envelope`] and is recovered by the receiver through downcasting.
//!

use crate::{Address, Fault};

use std::any::{Any, type_name};
use std::fmt;

/// Trait implemented by every type that can be sent between points.
///
/// Sending consumes the message, so a receiver never shares state with the sender, whatever
/// thread either one runs on.
///
/// # Examples
///
/// ```ignore
/// use point::Message;
///
/// #[derive(Debug)]
/// struct Ping(u32);
///
/// impl Message for Ping {}
/// ```
pub trait Message: Any + Send + fmt::Debug {}

/// Last path segment of a type name, kept whole for generic types.
pub(crate) fn short_name(full: &'static str) -> &'static str {
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}

/// A message with its type erased.
pub struct AnyMessage {
    body: Box<dyn Any + Send>,
    name: &'static str,
}

impl AnyMessage {
    /// Erases the type of `message`.
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            body: Box::new(message),
            name: short_name(type_name::<M>()),
        }
    }

    /// Short type name of the carried message.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True when the carried message is an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.body.is::<M>()
    }

    /// Borrows the carried message as an `M`.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.body.downcast_ref::<M>()
    }

    /// Recovers the carried message, or gives the envelope content back untouched.
    pub fn downcast<M: Message>(self) -> Result<M, AnyMessage> {
        let name = self.name;
        match self.body.downcast::<M>() {
            Ok(message) => Ok(*message),
            Err(body) => Err(AnyMessage { body, name }),
        }
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyMessage({})", self.name)
    }
}

/// One message with its destination and return addresses.
///
/// An envelope is placed on exactly one mailbox. Only migration rewrites its destination.
#[derive(Debug)]
pub struct Envelope {
    /// The message.
    pub message: AnyMessage,
    /// Destination address.
    pub to: Address,
    /// Return address, the sender unless forwarded.
    pub from: Address,
}

impl Envelope {
    /// Builds an envelope.
    pub fn new(message: AnyMessage, to: Address, from: Address) -> Self {
        Self { message, to, from }
    }
}

/// The value a point completes with.
///
/// Any `Send` type can be a value. Faults are values too, carried as a [`Fault`].
pub struct Value {
    body: Box<dyn Any + Send>,
    name: &'static str,
}

impl Value {
    /// Wraps any sendable value.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            body: Box::new(value),
            name: short_name(type_name::<T>()),
        }
    }

    /// The empty value.
    pub fn unit() -> Self {
        Value::new(())
    }

    /// Short type name of the carried value.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True when the carried value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.body.is::<T>()
    }

    /// Borrows the carried value as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }

    /// Recovers the carried value, or gives it back untouched.
    pub fn downcast<T: Any>(self) -> Result<T, Value> {
        let name = self.name;
        match self.body.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(body) => Err(Value { body, name }),
        }
    }

    /// The fault carried by this value, if it is one.
    pub fn fault(&self) -> Option<&Fault> {
        self.downcast_ref::<Fault>()
    }

    /// True when this value is a fault.
    pub fn is_fault(&self) -> bool {
        self.is::<Fault>()
    }
}

impl From<Fault> for Value {
    fn from(fault: Fault) -> Self {
        Value::new(fault)
    }
}

impl From<AnyMessage> for Value {
    fn from(message: AnyMessage) -> Self {
        Value {
            body: message.body,
            name: message.name,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fault() {
            Some(fault) => write!(f, "Value({:?})", fault),
            None => write!(f, "Value({})", self.name),
        }
    }
}
