// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for points, dispatchers, timers and migration.

use point::{
    Address, AnyMessage, Context, Dispatch, Error, Fault, Handled, LogRecord, LogSink, Message,
    Point, Runtime, RuntimeConfig, Start, Stop, T1, T2, Tag, Value,
};

use tracing_subscriber::EnvFilter;

use std::collections::BTreeMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

// Messages shared by the test points.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping(pub u32);

impl Message for Ping {}

#[derive(Debug, Clone, PartialEq)]
pub struct Pong(pub u32);

impl Message for Pong {}

#[derive(Debug)]
pub struct Move(pub Address);

impl Message for Move {}

#[derive(Debug)]
pub struct Moved(pub Address);

impl Message for Moved {}

#[derive(Debug)]
pub struct Reclaim(pub Address);

impl Message for Reclaim {}

#[derive(Debug)]
pub struct Reclaimed;

impl Message for Reclaimed {}

// Answers every ping, completes on stop.
pub struct Echo;

impl Point for Echo {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if let Some(Ping(n)) = message.downcast_ref::<Ping>() {
            ctx.reply(Pong(*n));
        } else if message.is::<Stop>() {
            return ctx.complete(Value::new("stopped"));
        } else if let Some(Move(new)) = message.downcast_ref::<Move>() {
            let original = ctx.hand_off(new)?;
            ctx.reply(Moved(original));
        } else if let Some(Reclaim(original)) = message.downcast_ref::<Reclaim>() {
            ctx.reclaim(original)?;
            ctx.reply(Reclaimed);
        }
        Ok(())
    }
}

// Panics on the first ping.
pub struct Fragile;

impl Point for Fragile {
    const DISPATCH: Dispatch = Dispatch::Dedicated;

    fn received(&mut self, _ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Ping>() {
            panic!("boom");
        }
        Ok(())
    }
}

// Does nothing until taken down.
pub struct Idle;

impl Point for Idle {
    const DISPATCH: Dispatch = Dispatch::Dedicated;

    fn received(&mut self, _ctx: &mut Context<Self>, _message: AnyMessage) -> Handled {
        Ok(())
    }
}

// Completes after three ticks of a repeating timer.
#[derive(Default)]
pub struct Ticker {
    ticks: u32,
}

impl Point for Ticker {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            ctx.start_repeating::<T1>(Duration::from_millis(10));
        } else if message.is::<T1>() {
            self.ticks += 1;
            if self.ticks == 3 {
                return ctx.complete(Value::new(self.ticks));
            }
        }
        Ok(())
    }
}

// Completes with its value on start.
pub struct Constant(pub u32);

impl Point for Constant {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            return ctx.complete(Value::new(self.0));
        }
        Ok(())
    }
}

// Waits for a stop and completes with its value.
pub struct Stoppable(pub u32);

impl Point for Stoppable {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Stop>() {
            return ctx.complete(Value::new(self.0));
        }
        Ok(())
    }
}

// Fastens a quick and a slow child and completes with the join.
pub struct Joiner;

impl Point for Joiner {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            let quick = ctx.create(Constant(1))?;
            let slow = ctx.create(Stoppable(2))?;
            ctx.fasten([("quick", quick), ("slow", slow)])?;
        }
        Ok(())
    }
}

// Counts stops and completes a little after each one.
pub struct Straggler(pub Arc<AtomicUsize>);

impl Point for Straggler {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Stop>() {
            self.0.fetch_add(1, Ordering::SeqCst);
            ctx.start::<T1>(Duration::from_millis(20));
        } else if message.is::<T1>() {
            return ctx.complete(Value::new(2u32));
        }
        Ok(())
    }
}

// Fastens a quick child and a straggler.
pub struct Waiter(pub Arc<AtomicUsize>);

impl Point for Waiter {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            let quick = ctx.create(Constant(1))?;
            let straggler = ctx.create(Straggler(self.0.clone()))?;
            ctx.fasten([("quick", quick), ("straggler", straggler)])?;
        }
        Ok(())
    }
}

// Tracks how many handlers of its class run at the same time.
pub struct Gauge {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Point for Gauge {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if let Some(Ping(n)) = message.downcast_ref::<Ping>() {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            self.running.fetch_sub(1, Ordering::SeqCst);
            ctx.reply(Pong(*n));
        }
        Ok(())
    }
}

// Logs once at every helper level and completes.
pub struct Chatty;

impl Point for Chatty {
    fn received(&mut self, ctx: &mut Context<Self>, message: AnyMessage) -> Handled {
        if message.is::<Start>() {
            ctx.debug("debug");
            ctx.trace("trace");
            ctx.console("console");
            ctx.warning("warning");
            ctx.fault("fault");
            return ctx.complete(Value::unit());
        }
        Ok(())
    }
}

// Sink keeping every record.
#[derive(Default)]
pub struct Recorder {
    records: Mutex<Vec<LogRecord>>,
}

impl Recorder {
    fn destroyed(&self, address: &Address) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.tag == Tag::Destroyed && record.address == *address)
            .cloned()
            .collect()
    }
}

impl LogSink for Recorder {
    fn record(&self, record: LogRecord) {
        self.records.lock().unwrap().push(record);
    }
}

// Honours RUST_LOG when the tests are run with --nocapture.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_messages_between_a_pair_keep_their_order() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let echo = channel.create(Echo).unwrap();

    for n in 0..100 {
        channel.send(Ping(n), &echo);
    }
    for n in 0..100 {
        let (pong, from) = channel.select_timeout::<Pong>(Duration::from_secs(2)).unwrap();
        assert_eq!(pong, Pong(n));
        assert_eq!(from, echo);
    }

    channel.send(Stop, &echo);
    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, echo);
    assert_eq!(value.downcast::<&str>().unwrap(), "stopped");
    assert!(!runtime.contains(&echo));
    runtime.shutdown();
}

#[test]
fn test_panic_completes_once_as_fault() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let fragile = channel.create(Fragile).unwrap();

    channel.send(Ping(1), &fragile);
    channel.send(Ping(2), &fragile);
    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, fragile);
    assert_eq!(value.fault(), Some(&Fault::faulted("object faulted", "boom")));
    assert!(!runtime.contains(&fragile));
    assert_eq!(
        channel.recv_timeout(Duration::from_millis(100)).unwrap_err(),
        Error::Timeout
    );
    runtime.shutdown();
}

#[test]
fn test_shutdown_compromises_live_points() {
    init_logging();
    let recorder = Arc::new(Recorder::default());
    let runtime =
        Runtime::create_with_sink(RuntimeConfig::default(), recorder.clone()).unwrap();
    let channel = runtime.open_channel().unwrap();
    let idle = channel.create(Idle).unwrap();
    let echo = channel.create(Echo).unwrap();

    runtime.shutdown();
    assert!(!runtime.is_running());
    assert!(!runtime.contains(&idle));
    assert!(!runtime.contains(&echo));

    for address in [&idle, &echo] {
        let destroyed = recorder.destroyed(address);
        assert_eq!(destroyed.len(), 1);
        assert!(destroyed[0].text.contains("object compromised"));
    }
    assert_eq!(
        channel.create(Echo).unwrap_err(),
        Error::CodingProblem("runtime is shut down".to_owned())
    );
}

#[test]
fn test_lifecycle_records_reach_sink() {
    init_logging();
    let recorder = Arc::new(Recorder::default());
    let runtime =
        Runtime::create_with_sink(RuntimeConfig::default(), recorder.clone()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let constant = channel.create(Constant(5)).unwrap();
    let (value, _) = channel.wait_completed().unwrap();
    assert_eq!(value.downcast::<u32>().unwrap(), 5);

    let records = recorder.records.lock().unwrap().clone();
    let created: Vec<&LogRecord> = records
        .iter()
        .filter(|record| record.tag == Tag::Created && record.address == constant)
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "Constant");
    assert_eq!(recorder.destroyed(&constant).len(), 1);
    let position = |tag: Tag| {
        records
            .iter()
            .position(|record| record.tag == tag && record.address == constant)
            .unwrap()
    };
    assert!(position(Tag::Created) < position(Tag::Destroyed));
    runtime.shutdown();
}

#[test]
fn test_log_helpers_tag_their_records() {
    init_logging();
    let recorder = Arc::new(Recorder::default());
    let runtime =
        Runtime::create_with_sink(RuntimeConfig::default(), recorder.clone()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let chatty = channel.create(Chatty).unwrap();
    let (value, _) = channel.wait_completed().unwrap();
    assert!(!value.is_fault());

    let logged: Vec<(Tag, String)> = recorder
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|record| record.address == chatty)
        .filter(|record| ["debug", "trace", "console", "warning", "fault"].contains(&&*record.text))
        .map(|record| (record.tag, record.text.clone()))
        .collect();
    assert_eq!(
        logged,
        vec![
            (Tag::Debug, "debug".to_owned()),
            (Tag::Trace, "trace".to_owned()),
            (Tag::Console, "console".to_owned()),
            (Tag::Warning, "warning".to_owned()),
            (Tag::Fault, "fault".to_owned()),
        ]
    );
    runtime.shutdown();
}

#[test]
fn test_channel_timer_rearm() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();

    channel.start::<T1>(Duration::from_millis(20)).unwrap();
    channel.select_timeout::<T1>(Duration::from_secs(2)).unwrap();

    channel.start::<T2>(Duration::from_secs(30)).unwrap();
    channel.start::<T2>(Duration::from_millis(30)).unwrap();
    assert_eq!(runtime.pending_timers(channel.address()).unwrap(), 1);
    channel.select_timeout::<T2>(Duration::from_secs(2)).unwrap();
    assert_eq!(runtime.pending_timers(channel.address()).unwrap(), 0);

    channel.start::<T1>(Duration::from_secs(30)).unwrap();
    channel.cancel::<T1>().unwrap();
    assert_eq!(runtime.pending_timers(channel.address()).unwrap(), 0);
    runtime.shutdown();
}

#[test]
fn test_timers_die_with_their_point() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let ticker = channel.create(Ticker::default()).unwrap();

    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, ticker);
    assert_eq!(value.downcast::<u32>().unwrap(), 3);
    assert_eq!(runtime.pending_timers(&ticker).unwrap(), 0);
    runtime.shutdown();
}

#[test]
fn test_fastened_children_join_once() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let joiner = channel.create(Joiner).unwrap();

    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, joiner);
    let mut joined = value.downcast::<BTreeMap<String, Value>>().unwrap();
    assert_eq!(joined.len(), 2);
    let quick = joined.remove("quick").unwrap();
    let slow = joined.remove("slow").unwrap();
    assert_eq!(quick.downcast::<u32>().unwrap(), 1);
    assert_eq!(slow.downcast::<u32>().unwrap(), 2);
    assert_eq!(
        channel.recv_timeout(Duration::from_millis(100)).unwrap_err(),
        Error::Timeout
    );
    runtime.shutdown();
}

#[test]
fn test_fastening_stops_stragglers_once() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let stops = Arc::new(AtomicUsize::new(0));
    let waiter = channel.create(Waiter(stops.clone())).unwrap();

    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, waiter);
    let mut joined = value.downcast::<BTreeMap<String, Value>>().unwrap();
    assert_eq!(joined.remove("quick").unwrap().downcast::<u32>().unwrap(), 1);
    assert_eq!(joined.remove("straggler").unwrap().downcast::<u32>().unwrap(), 2);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    runtime.shutdown();
}

#[test]
fn test_shared_class_runs_one_handler_at_a_time() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let gauges: Vec<Address> = (0..4)
        .map(|_| {
            let gauge = Gauge {
                running: running.clone(),
                peak: peak.clone(),
            };
            channel.create_on(gauge, Dispatch::Shared("serial")).unwrap()
        })
        .collect();
    for round in 0..5 {
        for gauge in &gauges {
            channel.send(Ping(round), gauge);
        }
    }
    for _ in 0..20 {
        channel.select_timeout::<Pong>(Duration::from_secs(2)).unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    runtime.shutdown();
}

#[test]
fn test_hand_off_and_reclaim() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let mut session = runtime.open_channel().unwrap();
    let echo = channel.create(Echo).unwrap();

    channel.send(Move(session.address().clone()), &echo);
    let (Moved(original), caretaker) = channel
        .select_timeout::<Moved>(Duration::from_secs(2))
        .unwrap();
    assert_eq!(original, echo);
    assert_ne!(caretaker, echo);

    // The original address now reaches the session.
    channel.send(Ping(1), &echo);
    let (ping, from) = session.select_timeout::<Ping>(Duration::from_secs(2)).unwrap();
    assert_eq!(ping, Ping(1));
    assert_eq!(&from, channel.address());

    // The caretaker still reaches the point.
    channel.send(Ping(2), &caretaker);
    let (pong, from) = channel.select_timeout::<Pong>(Duration::from_secs(2)).unwrap();
    assert_eq!(pong, Pong(2));
    assert_eq!(from, caretaker);

    channel.send(Reclaim(echo.clone()), &caretaker);
    let (_, from) = channel
        .select_timeout::<Reclaimed>(Duration::from_secs(2))
        .unwrap();
    assert_eq!(from, echo);
    assert!(!runtime.contains(&caretaker));

    channel.send(Ping(3), &echo);
    let (pong, from) = channel.select_timeout::<Pong>(Duration::from_secs(2)).unwrap();
    assert_eq!(pong, Pong(3));
    assert_eq!(from, echo);
    assert_eq!(
        session.recv_timeout(Duration::from_millis(50)).unwrap_err(),
        Error::Timeout
    );
    runtime.shutdown();
}

#[test]
fn test_channel_abort_stops_every_job() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let first = channel.create(Stoppable(1)).unwrap();
    let second = channel.create(Stoppable(2)).unwrap();
    channel.assign(first.clone(), "first");
    channel.assign(second.clone(), "second");
    assert_eq!(channel.running().count(), 2);
    assert_eq!(
        channel.progress_of(&first).unwrap().downcast_ref::<&str>(),
        Some(&"first")
    );

    assert_eq!(channel.abort(), 2);
    let mut values = Vec::new();
    for _ in 0..2 {
        let (value, _) = channel.wait_completed().unwrap();
        values.push(value.downcast::<u32>().unwrap());
    }
    values.sort();
    assert_eq!(values, vec![1, 2]);
    assert_eq!(channel.working(), 0);
    assert_eq!(channel.abort(), 0);
    runtime.shutdown();
}

#[test]
fn test_channel_clear_waits_for_jobs() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let first = channel.create(Stoppable(1)).unwrap();
    let second = channel.create(Stoppable(2)).unwrap();
    let unassigned = channel.create(Constant(3)).unwrap();
    channel.assign(first.clone(), 1u32);
    channel.assign(second.clone(), 2u32);

    let mut values = channel.clear().unwrap();
    assert_eq!(channel.working(), 0);
    assert_eq!(values.len(), 2);
    assert_eq!(values.remove(&first).unwrap().downcast::<u32>().unwrap(), 1);
    assert_eq!(values.remove(&second).unwrap().downcast::<u32>().unwrap(), 2);

    // Completions of points that were not jobs are still there.
    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, unassigned);
    assert_eq!(value.downcast::<u32>().unwrap(), 3);
    runtime.shutdown();
}

#[test]
fn test_routine_talks_to_points() {
    init_logging();
    let runtime = Runtime::create(RuntimeConfig::default()).unwrap();
    let mut channel = runtime.open_channel().unwrap();
    let routine = channel
        .create_routine(|me| {
            let echo = me.create(Echo)?;
            me.send(Ping(9), &echo);
            let (Pong(n), _) = me.select_timeout::<Pong>(Duration::from_secs(2))?;
            Ok(Value::new(n))
        })
        .unwrap();

    let (value, from) = channel.wait_completed().unwrap();
    assert_eq!(from, routine);
    assert_eq!(value.downcast::<u32>().unwrap(), 9);
    runtime.shutdown();
}
