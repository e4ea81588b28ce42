use crate::support::{CallLog, RecordingSink};
use signalbus_core::{SignalBus, SignalBusError, SignalHandler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Jog {
    distance: i32,
}

#[derive(Debug)]
struct Homed;

#[test]
fn test_handlers_run_in_registration_order() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    for name in ["first", "second", "third"] {
        let log = log.clone();
        bus.register(SignalHandler::new(move |jog: &Jog| {
            log.push(format!("{}:{}", name, jog.distance));
        }))
        .expect("registers");
    }

    bus.send(&Jog { distance: 5 }).expect("sends");
    assert_eq!(log.take(), vec!["first:5", "second:5", "third:5"]);
}

#[test]
fn test_types_are_isolated() {
    let bus = SignalBus::new();
    let jogs = Arc::new(AtomicUsize::new(0));
    let homes = Arc::new(AtomicUsize::new(0));

    let jogs_clone = jogs.clone();
    bus.register(SignalHandler::<Jog>::unit(move || {
        jogs_clone.fetch_add(1, Ordering::SeqCst);
    }))
    .expect("registers");
    let homes_clone = homes.clone();
    bus.register(SignalHandler::<Homed>::unit(move || {
        homes_clone.fetch_add(1, Ordering::SeqCst);
    }))
    .expect("registers");

    bus.send(&Homed).expect("sends");
    bus.send(&Homed).expect("sends");
    bus.send_default::<Jog>().expect("sends");

    assert_eq!(jogs.load(Ordering::SeqCst), 1);
    assert_eq!(homes.load(Ordering::SeqCst), 2);
    assert_eq!(bus.signal_types().len(), 2);
}

#[test]
fn test_failure_stops_remaining_handlers() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    let first = log.clone();
    bus.register(SignalHandler::<Homed>::unit(move || first.push("first")))
        .expect("registers");
    bus.register(SignalHandler::<Homed>::unit(|| Err::<(), _>("limit switch stuck")))
        .expect("registers");
    let third = log.clone();
    bus.register(SignalHandler::<Homed>::unit(move || third.push("third")))
        .expect("registers");

    let err = bus.send(&Homed).unwrap_err();
    match err {
        SignalBusError::Handler { source, .. } => {
            assert_eq!(source.to_string(), "limit switch stuck");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(log.take(), vec!["first"]);
    assert!(!bus.is_dispatching::<Homed>());
}

#[test]
fn test_send_without_subscribers_is_a_notice() {
    let sink = RecordingSink::default();
    let bus = SignalBus::builder()
        .log_sink(sink.clone())
        .build()
        .expect("valid config");

    bus.send(&Homed).expect("zero subscribers is fine");
    assert!(sink.contains("No subscriptions for signal type Homed"));
}

#[test]
fn test_send_dyn_notice_names_the_payload_type() {
    let sink = RecordingSink::default();
    let bus = SignalBus::builder()
        .log_sink(sink.clone())
        .build()
        .expect("valid config");

    // Unknown type: only the runtime id is available.
    bus.send_dyn(&Homed).expect("zero subscribers is fine");
    let expected = format!("No subscriptions for signal type {:?}", std::any::TypeId::of::<Homed>());
    assert!(sink.contains(&expected));
    assert!(!sink.contains("<dynamic>"));

    // Known type without a matching shape: the registered name is used.
    bus.register(SignalHandler::<Jog>::future_unit(|_| async {}))
        .expect("registers");
    bus.send_dyn(&Jog::default()).expect("zero sync subscribers is fine");
    assert!(sink.contains("No subscriptions for signal type Jog"));
}

#[test]
fn test_sync_send_skips_async_handlers() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    let sync_log = log.clone();
    bus.register(SignalHandler::<Homed>::unit(move || sync_log.push("sync")))
        .expect("registers");
    let async_log = log.clone();
    bus.register(SignalHandler::<Homed>::future_unit(move |_| {
        let log = async_log.clone();
        async move { log.push("async") }
    }))
    .expect("registers");

    bus.send(&Homed).expect("sends");
    assert_eq!(log.take(), vec!["sync"]);
    assert_eq!(bus.subscriber_count::<Homed>(), 2);
}

#[test]
fn test_send_dyn_routes_by_runtime_type() {
    let bus = SignalBus::new();
    let total = Arc::new(AtomicUsize::new(0));
    let total_clone = total.clone();
    bus.register(SignalHandler::new(move |jog: &Jog| {
        total_clone.fetch_add(jog.distance as usize, Ordering::SeqCst);
    }))
    .expect("registers");

    let payloads: Vec<Box<dyn std::any::Any + Send + Sync>> =
        vec![Box::new(Jog { distance: 2 }), Box::new(Homed), Box::new(Jog { distance: 3 })];
    for payload in &payloads {
        bus.send_dyn(payload.as_ref()).expect("sends");
    }

    assert_eq!(total.load(Ordering::SeqCst), 5);
}
