// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! A mailbox is the envelope queue feeding one dispatcher thread, and the only place where work
//! crosses from one thread to another. Senders `put`, the owning thread `pull`s. The policy set at
//! construction decides what a put does when the queue is full.
//!
//! Lock order is directory first, mailbox second. A put that must wait for space never waits
//! while the directory lock is held: the directory releases it, waits here and retries.
//!

use crate::{Envelope, MailboxPolicy};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Queue state guarded by the mailbox lock.
struct Queue {
    envelopes: VecDeque<Envelope>,
    dropped: u64,
}

/// Bounded or unbounded blocking envelope queue.
pub struct Mailbox {
    queue: Mutex<Queue>,
    not_empty: Condvar,
    not_full: Condvar,
    policy: MailboxPolicy,
}

impl Mailbox {
    /// Creates an empty mailbox with the given policy.
    ///
    /// A blocking mailbox holds at least one envelope.
    pub fn new(policy: MailboxPolicy) -> Self {
        let policy = match policy {
            MailboxPolicy::Blocking { capacity } => MailboxPolicy::Blocking {
                capacity: capacity.max(1),
            },
            policy => policy,
        };
        Self {
            queue: Mutex::new(Queue {
                envelopes: VecDeque::new(),
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            policy,
        }
    }

    /// The policy of this mailbox.
    pub fn policy(&self) -> MailboxPolicy {
        self.policy
    }

    /// Appends an envelope without waiting.
    ///
    /// A full blocking mailbox hands the envelope back. A drop-oldest mailbox at its peak
    /// discards its oldest envelope and accepts the new one.
    pub fn try_put(&self, envelope: Envelope) -> Result<(), Envelope> {
        let mut queue = self.queue.lock();
        match self.policy {
            MailboxPolicy::Unbounded => {}
            MailboxPolicy::Blocking { capacity } => {
                if queue.envelopes.len() >= capacity {
                    return Err(envelope);
                }
            }
            MailboxPolicy::DropOldest { peak } => {
                if queue.envelopes.len() >= peak {
                    if let Some(oldest) = queue.envelopes.pop_front() {
                        queue.dropped += 1;
                        warn!(
                            "Mailbox past peak of {}, dropped {} to {}.",
                            peak,
                            oldest.message.name(),
                            oldest.to
                        );
                    }
                }
            }
        }
        queue.envelopes.push_back(envelope);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Waits until a blocking mailbox has room for one more envelope.
    pub fn wait_for_space(&self) {
        if let MailboxPolicy::Blocking { capacity } = self.policy {
            let mut queue = self.queue.lock();
            while queue.envelopes.len() >= capacity {
                self.not_full.wait(&mut queue);
            }
        }
    }

    /// Appends an envelope, waiting for room when the policy says so.
    pub fn put(&self, envelope: Envelope) {
        let mut envelope = envelope;
        loop {
            match self.try_put(envelope) {
                Ok(()) => return,
                Err(rejected) => {
                    envelope = rejected;
                    self.wait_for_space();
                }
            }
        }
    }

    /// Removes the oldest envelope, waiting for one to arrive.
    pub fn pull(&self) -> Envelope {
        let mut queue = self.queue.lock();
        loop {
            if let Some(envelope) = queue.envelopes.pop_front() {
                self.not_full.notify_one();
                return envelope;
            }
            self.not_empty.wait(&mut queue);
        }
    }

    /// Removes the oldest envelope, waiting at most `timeout` for one to arrive.
    pub fn pull_timeout(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(envelope) = queue.envelopes.pop_front() {
                self.not_full.notify_one();
                return Some(envelope);
            }
            if self.not_empty.wait_until(&mut queue, deadline).timed_out() {
                let envelope = queue.envelopes.pop_front();
                if envelope.is_some() {
                    self.not_full.notify_one();
                }
                return envelope;
            }
        }
    }

    /// Takes every queued envelope, oldest first.
    pub(crate) fn drain(&self) -> Vec<Envelope> {
        let mut queue = self.queue.lock();
        let drained: Vec<Envelope> = queue.envelopes.drain(..).collect();
        self.not_full.notify_all();
        drained
    }

    /// Appends envelopes in order, ignoring the waiting policy. Returns how many did not fit.
    pub(crate) fn requeue(&self, envelopes: Vec<Envelope>) -> usize {
        let mut queue = self.queue.lock();
        let limit = match self.policy {
            MailboxPolicy::Unbounded => usize::MAX,
            MailboxPolicy::Blocking { capacity } => capacity,
            MailboxPolicy::DropOldest { peak } => peak,
        };
        let mut lost = 0;
        for envelope in envelopes {
            if queue.envelopes.len() >= limit {
                lost += 1;
                continue;
            }
            queue.envelopes.push_back(envelope);
        }
        queue.dropped += lost as u64;
        if !queue.envelopes.is_empty() {
            self.not_empty.notify_all();
        }
        lost
    }

    /// Number of queued envelopes.
    pub fn len(&self) -> usize {
        self.queue.lock().envelopes.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Envelopes this mailbox has discarded so far.
    pub fn dropped(&self) -> u64 {
        self.queue.lock().dropped
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{Address, AnyMessage, Message};

    use std::sync::Arc;
    use std::thread;

    #[derive(Debug)]
    struct Number(usize);

    impl Message for Number {}

    fn envelope(n: usize) -> Envelope {
        Envelope::new(AnyMessage::new(Number(n)), Address::new(1), Address::new(2))
    }

    fn number(envelope: Envelope) -> usize {
        envelope.message.downcast::<Number>().unwrap().0
    }

    #[test]
    fn test_fifo() {
        let mailbox = Mailbox::new(MailboxPolicy::Unbounded);
        for n in 0..5 {
            mailbox.put(envelope(n));
        }
        let pulled: Vec<usize> = (0..5).map(|_| number(mailbox.pull())).collect();
        assert_eq!(pulled, vec![0, 1, 2, 3, 4]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_drop_oldest_past_peak() {
        let mailbox = Mailbox::new(MailboxPolicy::DropOldest { peak: 2 });
        for n in 0..4 {
            mailbox.put(envelope(n));
        }
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.dropped(), 2);
        assert_eq!(number(mailbox.pull()), 2);
        assert_eq!(number(mailbox.pull()), 3);
    }

    #[test]
    fn test_blocking_rejects_then_waits() {
        let mailbox = Arc::new(Mailbox::new(MailboxPolicy::Blocking { capacity: 1 }));
        mailbox.put(envelope(0));
        let rejected = mailbox.try_put(envelope(1)).unwrap_err();
        assert_eq!(number(rejected), 1);

        let producer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.put(envelope(1)))
        };
        assert_eq!(number(mailbox.pull()), 0);
        producer.join().unwrap();
        assert_eq!(number(mailbox.pull()), 1);
    }

    #[test]
    fn test_pull_timeout() {
        let mailbox = Mailbox::new(MailboxPolicy::Unbounded);
        assert!(mailbox.pull_timeout(Duration::from_millis(20)).is_none());
        mailbox.put(envelope(9));
        let pulled = mailbox.pull_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(number(pulled), 9);
    }

    #[test]
    fn test_drain_and_requeue() {
        let mailbox = Mailbox::new(MailboxPolicy::DropOldest { peak: 3 });
        for n in 0..3 {
            mailbox.put(envelope(n));
        }
        let mut drained = mailbox.drain();
        assert!(mailbox.is_empty());
        drained.push(envelope(3));
        assert_eq!(mailbox.requeue(drained), 1);
        let pulled: Vec<usize> = (0..3).map(|_| number(mailbox.pull())).collect();
        assert_eq!(pulled, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mailbox = Mailbox::new(MailboxPolicy::Blocking { capacity: 0 });
        assert_eq!(mailbox.policy(), MailboxPolicy::Blocking { capacity: 1 });
        assert!(mailbox.try_put(envelope(1)).is_ok());
        assert!(mailbox.try_put(envelope(2)).is_err());
        assert_eq!(number(mailbox.pull()), 1);
    }
}
