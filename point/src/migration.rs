// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Address migration
//!
//! Hand-off lets a point pass its address to another point for a while, typically a session
//! handler taking over a connection, and step aside to a caretaker address. Reclaim puts things
//! back. Both run entirely under the directory lock, so no delivery ever sees a half-migrated
//! directory. The only visible effect is potential message loss, reported as a count.
//!

use crate::{Address, Directory, Envelope, Error, mailbox::Mailbox};

use tracing::debug;

use std::sync::Arc;

/// Drains `mailbox`, rewrites each envelope with `rewrite` and queues the survivors again.
///
/// Returns how many envelopes were discarded by `rewrite` or did not fit.
fn rework(mailbox: &Mailbox, mut rewrite: impl FnMut(Envelope) -> Option<Envelope>) -> usize {
    let drained = mailbox.drain();
    let before = drained.len();
    let kept: Vec<Envelope> = drained.into_iter().filter_map(&mut rewrite).collect();
    let discarded = before - kept.len();
    discarded + mailbox.requeue(kept)
}

impl Directory {
    /// Passes `current` to the point registered at `new`.
    ///
    /// The point at `current` becomes reachable only through the returned caretaker address.
    /// Envelopes already queued for `current` are rewritten to the caretaker, in order, so they
    /// still reach the point they were sent to. Afterwards senders holding `current` reach the
    /// point at `new`.
    pub fn hand_off(&self, current: &Address, new: &Address) -> Result<(Address, usize), Error> {
        let mut entries = self.entries.lock();
        let original = entries
            .get(current)
            .cloned()
            .ok_or_else(|| Error::NotFound(current.clone()))?;
        let incoming = entries
            .get(new)
            .cloned()
            .ok_or_else(|| Error::NotFound(new.clone()))?;

        let caretaker = self.allocate();
        let mailbox = original.mailbox.clone();
        entries.insert(caretaker.clone(), original);
        entries.insert(current.clone(), incoming);

        let dropped = rework(&mailbox, |mut envelope| {
            if envelope.to == *current {
                envelope.to = caretaker.clone();
            }
            Some(envelope)
        });
        debug!(
            "Handed {} to {}, caretaker {}, {} dropped.",
            current, new, caretaker, dropped
        );
        Ok((caretaker, dropped))
    }

    /// Moves the point at `caretaker` back into the `original` slot.
    ///
    /// The caretaker slot is discarded along with every envelope still addressed to it.
    /// Envelopes for `original` waiting in the interim occupant's mailbox move to the reclaiming
    /// point's mailbox, keeping their order.
    pub fn reclaim(
        &self,
        caretaker: &Address,
        original: &Address,
    ) -> Result<(Address, usize), Error> {
        let mut entries = self.entries.lock();
        let reclaimed = entries
            .get(caretaker)
            .cloned()
            .ok_or_else(|| Error::NotFound(caretaker.clone()))?;

        let mailbox = reclaimed.mailbox.clone();
        let interim = entries.insert(original.clone(), reclaimed);
        entries.remove(caretaker);

        let mut dropped = rework(&mailbox, |envelope| {
            (envelope.to != *caretaker).then_some(envelope)
        });

        if let Some(interim) = interim {
            if !Arc::ptr_eq(&interim.mailbox, &mailbox) {
                let mut moved = Vec::new();
                dropped += rework(&interim.mailbox, |envelope| {
                    if envelope.to == *original {
                        moved.push(envelope);
                        None
                    } else {
                        Some(envelope)
                    }
                });
                // Moved envelopes were counted as discarded above.
                dropped -= moved.len();
                dropped += mailbox.requeue(moved);
            }
        }
        debug!(
            "Reclaimed {} from caretaker {}, {} dropped.",
            original, caretaker, dropped
        );
        Ok((original.clone(), dropped))
    }
}
