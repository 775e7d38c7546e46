// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Address directory
//!
//! The directory maps every live address to the thing that receives its messages, together with
//! the mailbox feeding it. It is one of only two structures shared between threads, and every
//! operation holds its lock for a short, non-blocking critical section.
//!
//! A slot is one of four occupants:
//!
//! - a shared dispatcher, which owns a mailbox and serves many hosted points;
//! - a dedicated point, which owns a mailbox and a thread;
//! - a hosted point, fed by the mailbox of its shared dispatcher;
//! - a channel, which owns a mailbox read by blocking code.
//!

use crate::{
    Address, AnyMessage, Envelope, address::NO_SUCH_ID, dispatcher::Dispatchable,
    mailbox::Mailbox,
};

use parking_lot::Mutex;
use tracing::trace;

use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// What occupies a directory slot.
#[derive(Clone)]
pub(crate) enum Occupant {
    /// A shared dispatcher thread.
    Dispatcher,
    /// A point running on its own thread.
    Dedicated,
    /// A point multiplexed on a shared dispatcher.
    Hosted(Arc<Mutex<dyn Dispatchable>>),
    /// A sync object read by blocking code.
    Channel,
}

/// Directory entry: the receiver registered at an address.
///
/// Migration may register the same entry under a second address. Both slots then share the
/// `owner`, the identity the point was created with.
#[derive(Clone)]
pub struct Entry {
    pub(crate) owner: u64,
    pub(crate) name: &'static str,
    pub(crate) feed: Address,
    pub(crate) mailbox: Arc<Mailbox>,
    pub(crate) occupant: Occupant,
    pub(crate) halted: bool,
}

impl Entry {
    pub(crate) fn new(
        owner: &Address,
        name: &'static str,
        feed: Address,
        mailbox: Arc<Mailbox>,
        occupant: Occupant,
    ) -> Self {
        Self {
            owner: owner.id(),
            name,
            feed,
            mailbox,
            occupant,
            halted: false,
        }
    }

    /// Identity the occupant was created with.
    pub fn owner(&self) -> Address {
        Address::new(self.owner)
    }

    /// Name of the occupant type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Address of the mailbox owner feeding this slot.
    pub fn feed(&self) -> &Address {
        &self.feed
    }

    /// Marks the occupant as halted.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// True once `halt` was called on this slot.
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

/// Thread-safe registry of live addresses plus the address allocator.
pub struct Directory {
    pub(crate) entries: Mutex<HashMap<Address, Entry>>,
    next: AtomicU64,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next: AtomicU64::new(NO_SUCH_ID + 1),
        }
    }

    /// Returns a fresh address. Never the sentinel, never one handed out before.
    pub fn allocate(&self) -> Address {
        Address::new(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Registers `entry` at `address`, replacing any previous occupant.
    pub(crate) fn register(&self, address: Address, entry: Entry) {
        let mut entries = self.entries.lock();
        entries.insert(address, entry);
    }

    /// Removes the slot at `address`. A missing slot is not an error.
    pub fn remove(&self, address: &Address) -> bool {
        let mut entries = self.entries.lock();
        entries.remove(address).is_some()
    }

    /// Removes every slot owned by `owner`. Returns how many went.
    pub(crate) fn remove_owned(&self, owner: &Address) -> usize {
        let owner = owner.id();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.owner != owner);
        before - entries.len()
    }

    /// Removes every hosted point fed by `feed`, with all of its slots.
    ///
    /// Returns one slot per point, the one it was created at when still held.
    pub(crate) fn remove_fed_by(&self, feed: &Address) -> Vec<(Address, Entry)> {
        let mut entries = self.entries.lock();
        let mut orphans: HashMap<u64, (Address, Entry)> = HashMap::new();
        for (address, entry) in entries.iter() {
            if !matches!(entry.occupant, Occupant::Hosted(_)) || entry.feed != *feed {
                continue;
            }
            let canonical = address.id() == entry.owner;
            if canonical || !orphans.contains_key(&entry.owner) {
                orphans.insert(entry.owner, (address.clone(), entry.clone()));
            }
        }
        entries.retain(|_, entry| {
            !(matches!(entry.occupant, Occupant::Hosted(_)) && orphans.contains_key(&entry.owner))
        });
        orphans.into_values().collect()
    }

    /// Returns a copy of the entry at `address`.
    ///
    /// The copy shares the receiver and mailbox with the slot. It does not keep the slot alive:
    /// a later `remove` goes ahead regardless and a later `lookup` reports nothing.
    pub fn lookup(&self, address: &Address) -> Option<Entry> {
        let entries = self.entries.lock();
        entries.get(address).cloned()
    }

    /// True when `address` is registered.
    pub fn contains(&self, address: &Address) -> bool {
        let entries = self.entries.lock();
        entries.contains_key(address)
    }

    /// Owner identity of the slot at `address`.
    pub(crate) fn owner_of(&self, address: &Address) -> Option<u64> {
        let entries = self.entries.lock();
        entries.get(address).map(|entry| entry.owner)
    }

    /// Runs `f` on the entry at `address` with the directory lock held.
    ///
    /// Returns `None` when the address is not registered.
    pub fn with_exclusive<R>(
        &self,
        address: &Address,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock();
        entries.get_mut(address).map(f)
    }

    /// Copies of every slot, for runtime teardown.
    pub(crate) fn snapshot(&self) -> Vec<(Address, Entry)> {
        let entries = self.entries.lock();
        entries
            .iter()
            .map(|(address, entry)| (address.clone(), entry.clone()))
            .collect()
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `message` to `to` as if sent by `from`.
    ///
    /// Resolves the receiver and the mailbox feeding it, then enqueues. If either cannot be
    /// resolved the message is dropped: non-delivery is a normal outcome, never retried and
    /// never reported to the sender.
    pub fn deliver(&self, message: AnyMessage, to: &Address, from: &Address) {
        self.deliver_envelope(Envelope::new(message, to.clone(), from.clone()));
    }

    pub(crate) fn deliver_envelope(&self, envelope: Envelope) {
        let mut envelope = envelope;
        loop {
            let mailbox = {
                let entries = self.entries.lock();
                let Some(entry) = entries.get(&envelope.to) else {
                    trace!(
                        "Dropped {} to {}, no such address.",
                        envelope.message.name(),
                        envelope.to
                    );
                    return;
                };
                match entry.mailbox.try_put(envelope) {
                    Ok(()) => return,
                    Err(rejected) => {
                        envelope = rejected;
                        entry.mailbox.clone()
                    }
                }
            };
            // Full blocking mailbox, wait outside the directory lock and resolve again.
            mailbox.wait_for_space();
        }
    }
}
