// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Clock service
//!
//! Timers are kept by one service thread driving a single-threaded `tokio` runtime. Points
//! submit start and cancel requests over a channel; on expiry the service delivers a fresh
//! timer message to the point through the directory, like any other send.
//!
//! A timer is private to the point that started it and is keyed by its message type, so
//! starting the same kind again re-arms it instead of adding a second one.
//!

use crate::{Address, AnyMessage, Directory, Error, Message};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::{
    sync::CancellationToken,
    time::{DelayQueue, delay_queue::Key},
};
use tracing::{debug, error, trace};

use parking_lot::Mutex;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Predeclared timer kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct T1;

impl Message for T1 {}

/// Predeclared timer kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct T2;

impl Message for T2 {}

/// Predeclared timer kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct T3;

impl Message for T3 {}

/// Predeclared timer kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct T4;

impl Message for T4 {}

/// Builds a fresh timer message for each expiry.
pub(crate) fn make_timer<T: Message + Default>() -> AnyMessage {
    AnyMessage::new(T::default())
}

/// Timer identity: owning point and timer kind.
type TimerId = (u64, TypeId);

/// A pending timer.
struct Timer {
    owner: u64,
    kind: TypeId,
    to: Address,
    after: Duration,
    repeating: bool,
    make: fn() -> AnyMessage,
}

impl Timer {
    fn id(&self) -> TimerId {
        (self.owner, self.kind)
    }
}

/// Requests accepted by the service.
enum Command {
    Start(Timer),
    Cancel(TimerId),
    CancelAll(u64),
    Pending {
        owner: u64,
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the clock service thread.
pub(crate) struct Clock {
    commands: mpsc::UnboundedSender<Command>,
    token: CancellationToken,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Starts the service thread.
    pub(crate) fn spawn(directory: Arc<Directory>) -> Result<Self, Error> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let thread = {
            let token = token.clone();
            thread::Builder::new()
                .name("clock".to_owned())
                .spawn(move || run(directory, receiver, token))
                .map_err(|e| Error::Spawn(e.to_string()))?
        };
        Ok(Self {
            commands,
            token,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn submit(&self, command: Command) -> Result<(), Error> {
        self.commands.send(command).map_err(|_| Error::Clock)
    }

    /// Arms, or re-arms, the timer of kind `kind` for `owner`.
    pub(crate) fn start(
        &self,
        owner: u64,
        kind: TypeId,
        to: Address,
        after: Duration,
        repeating: bool,
        make: fn() -> AnyMessage,
    ) -> Result<(), Error> {
        self.submit(Command::Start(Timer {
            owner,
            kind,
            to,
            after,
            repeating,
            make,
        }))
    }

    /// Disarms one timer. Unknown timers are ignored.
    pub(crate) fn cancel(&self, owner: u64, kind: TypeId) -> Result<(), Error> {
        self.submit(Command::Cancel((owner, kind)))
    }

    /// Disarms every timer of `owner`.
    pub(crate) fn cancel_all(&self, owner: u64) {
        if self.submit(Command::CancelAll(owner)).is_err() {
            trace!("Clock gone, timers of {} discarded with it.", owner);
        }
    }

    /// Number of timers pending for `owner`. Blocks the calling thread for the answer.
    pub(crate) fn pending(&self, owner: u64) -> Result<usize, Error> {
        let (reply, answer) = oneshot::channel();
        self.submit(Command::Pending { owner, reply })?;
        answer.blocking_recv().map_err(|_| Error::Clock)
    }

    /// Stops the service and waits for its thread.
    pub(crate) fn stop(&self) {
        self.token.cancel();
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                error!("Clock thread panicked.");
            }
        }
    }
}

/// Body of the service thread.
fn run(
    directory: Arc<Directory>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    token: CancellationToken,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Can't build clock runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let mut queue: DelayQueue<Timer> = DelayQueue::new();
        let mut keys: HashMap<TimerId, Key> = HashMap::new();
        debug!("Clock running.");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    match command {
                        Command::Start(timer) => {
                            let id = timer.id();
                            if let Some(key) = keys.remove(&id) {
                                queue.remove(&key);
                            }
                            let after = timer.after;
                            keys.insert(id, queue.insert(timer, after));
                        }
                        Command::Cancel(id) => {
                            if let Some(key) = keys.remove(&id) {
                                queue.remove(&key);
                            }
                        }
                        Command::CancelAll(owner) => {
                            let ids: Vec<TimerId> =
                                keys.keys().filter(|(o, _)| *o == owner).copied().collect();
                            for id in ids {
                                if let Some(key) = keys.remove(&id) {
                                    queue.remove(&key);
                                }
                            }
                        }
                        Command::Pending { owner, reply } => {
                            let count = keys.keys().filter(|(o, _)| *o == owner).count();
                            let _ = reply.send(count);
                        }
                    }
                }
                Some(expired) = queue.next(), if !queue.is_empty() => {
                    let timer = expired.into_inner();
                    keys.remove(&timer.id());
                    directory.deliver((timer.make)(), &timer.to, &timer.to);
                    if timer.repeating {
                        let id = timer.id();
                        let after = timer.after;
                        keys.insert(id, queue.insert(timer, after));
                    }
                }
            }
        }
        debug!("Clock stopped, {} timers discarded.", queue.len());
    });
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{
        MailboxPolicy,
        directory::{Entry, Occupant},
        mailbox::Mailbox,
    };

    fn target(directory: &Directory) -> (Address, Arc<Mailbox>) {
        let address = directory.allocate();
        let mailbox = Arc::new(Mailbox::new(MailboxPolicy::Unbounded));
        directory.register(
            address.clone(),
            Entry::new(&address, "Target", address.clone(), mailbox.clone(), Occupant::Channel),
        );
        (address, mailbox)
    }

    fn make_t1() -> AnyMessage {
        AnyMessage::new(T1)
    }

    #[test]
    fn test_timer_fires_once() {
        let directory = Arc::new(Directory::new());
        let (address, mailbox) = target(&directory);
        let clock = Clock::spawn(directory.clone()).unwrap();

        let after = Duration::from_millis(20);
        clock
            .start(address.id(), TypeId::of::<T1>(), address.clone(), after, false, make_t1)
            .unwrap();
        let envelope = mailbox.pull_timeout(Duration::from_secs(2)).unwrap();
        assert!(envelope.message.is::<T1>());
        assert_eq!(clock.pending(address.id()).unwrap(), 0);
        assert!(mailbox.pull_timeout(Duration::from_millis(60)).is_none());
        clock.stop();
    }

    #[test]
    fn test_restart_keeps_one_pending() {
        let directory = Arc::new(Directory::new());
        let (address, mailbox) = target(&directory);
        let clock = Clock::spawn(directory.clone()).unwrap();
        let kind = TypeId::of::<T1>();

        clock
            .start(address.id(), kind, address.clone(), Duration::from_millis(30), false, make_t1)
            .unwrap();
        clock
            .start(address.id(), kind, address.clone(), Duration::from_secs(30), false, make_t1)
            .unwrap();
        assert_eq!(clock.pending(address.id()).unwrap(), 1);
        // The later, longer deadline is in effect.
        assert!(mailbox.pull_timeout(Duration::from_millis(150)).is_none());

        clock.cancel(address.id(), kind).unwrap();
        assert_eq!(clock.pending(address.id()).unwrap(), 0);
        clock.stop();
    }

    #[test]
    fn test_repeating_and_cancel_all() {
        let directory = Arc::new(Directory::new());
        let (address, mailbox) = target(&directory);
        let clock = Clock::spawn(directory.clone()).unwrap();

        let every = Duration::from_millis(10);
        clock
            .start(address.id(), TypeId::of::<T1>(), address.clone(), every, true, make_t1)
            .unwrap();
        for _ in 0..3 {
            let envelope = mailbox.pull_timeout(Duration::from_secs(2)).unwrap();
            assert!(envelope.message.is::<T1>());
        }
        assert_eq!(clock.pending(address.id()).unwrap(), 1);
        clock.cancel_all(address.id());
        assert_eq!(clock.pending(address.id()).unwrap(), 0);
        clock.stop();
        assert!(clock.pending(address.id()).is_err());
    }
}
