use crate::support::CallLog;
use signalbus_core::{
    OrderKey, OrderOptions, RegisterOptions, SignalBus, SignalBusConfig, SignalBusError,
    SignalHandler, SortPolicy, Token,
};

#[derive(Debug)]
struct Frame;

struct Physics;
struct Render;

fn register_named(
    bus: &SignalBus,
    log: &CallLog,
    name: &'static str,
    order: Option<OrderOptions>,
) -> signalbus_core::Result<Token> {
    let log = log.clone();
    let mut options = RegisterOptions::new();
    if let Some(order) = order {
        options = options.order(order);
    }
    bus.register_with(SignalHandler::<Frame>::unit(move || log.push(name)), options)
}

#[test]
fn test_constraints_determine_order_and_unordered_follow() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    register_named(&bus, &log, "A", None).expect("registers");
    register_named(&bus, &log, "B", Some(OrderOptions::new("K2").after("K1"))).expect("registers");
    register_named(&bus, &log, "C", Some(OrderOptions::new("K3").before("K2"))).expect("registers");
    register_named(&bus, &log, "D", Some(OrderOptions::new("K1"))).expect("registers");

    bus.send(&Frame).expect("sends");
    assert_eq!(log.take(), vec!["D", "C", "B", "A"]);
}

#[test]
fn test_order_does_not_depend_on_sort_policy() {
    for sort_policy in [SortPolicy::Eager, SortPolicy::Lazy] {
        let bus = SignalBus::with_config(SignalBusConfig {
            sort_policy,
            ..Default::default()
        });
        let log = CallLog::default();

        register_named(&bus, &log, "A", None).expect("registers");
        register_named(&bus, &log, "B", Some(OrderOptions::new("K2").after("K1"))).expect("registers");
        register_named(&bus, &log, "C", Some(OrderOptions::new("K3").before("K2"))).expect("registers");
        register_named(&bus, &log, "D", Some(OrderOptions::new("K1"))).expect("registers");

        for _ in 0..2 {
            bus.send(&Frame).expect("sends");
            assert_eq!(log.take(), vec!["D", "C", "B", "A"], "{:?}", sort_policy);
        }
    }
}

#[test]
fn test_type_owner_keys() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    register_named(
        &bus,
        &log,
        "render",
        Some(OrderOptions::owned_by::<Render>().after(OrderKey::of::<Physics>())),
    )
    .expect("registers");
    register_named(&bus, &log, "physics", Some(OrderOptions::owned_by::<Physics>()))
        .expect("registers");

    bus.send(&Frame).expect("sends");
    assert_eq!(log.take(), vec!["physics", "render"]);
}

#[test]
fn test_eager_cycle_is_reported_at_registration() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    register_named(&bus, &log, "one", Some(OrderOptions::new("K1").before("K2")))
        .expect("registers");
    let err = register_named(&bus, &log, "two", Some(OrderOptions::new("K2").before("K1")))
        .unwrap_err();

    match err {
        SignalBusError::CycleDetected { source, .. } => {
            assert_eq!(source.unresolved, vec!["K1", "K2"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    bus.send(&Frame).expect("sends");
    assert_eq!(log.take(), vec!["one"]);
}

#[test]
fn test_lazy_cycle_is_reported_at_send_until_fixed() {
    let bus = SignalBus::with_config(SignalBusConfig {
        sort_policy: SortPolicy::Lazy,
        ..Default::default()
    });
    let log = CallLog::default();

    register_named(&bus, &log, "one", Some(OrderOptions::new("K1").after("K2")))
        .expect("registers");
    let offending = register_named(&bus, &log, "two", Some(OrderOptions::new("K2").after("K1")))
        .expect("lazy policy accepts");

    for _ in 0..2 {
        let err = bus.send(&Frame).unwrap_err();
        assert!(matches!(err, SignalBusError::CycleDetected { .. }));
    }
    assert!(log.take().is_empty());

    assert_eq!(bus.deregister_token(&offending), 1);
    bus.send(&Frame).expect("sends");
    assert_eq!(log.take(), vec!["one"]);
}

#[test]
fn test_ordered_registration_during_dispatch_is_sorted_on_merge() {
    let bus = SignalBus::new();
    let log = CallLog::default();

    {
        let bus = bus.clone();
        let log = log.clone();
        let registered = std::sync::atomic::AtomicBool::new(false);
        bus.clone()
            .register_with(
                SignalHandler::<Frame>::unit(move || {
                    log.push("tail");
                    if !registered.swap(true, std::sync::atomic::Ordering::SeqCst) {
                        register_named(&bus, &log, "head", Some(OrderOptions::new("head").before("tail")))
                            .expect("stages");
                    }
                }),
                RegisterOptions::new().order(OrderOptions::new("tail")),
            )
            .expect("registers");
    }

    bus.send(&Frame).expect("sends");
    assert_eq!(log.take(), vec!["tail"]);

    bus.send(&Frame).expect("sends");
    assert_eq!(log.take(), vec!["head", "tail"]);
}

#[test]
fn test_cyclic_registration_during_dispatch_is_rejected() {
    let bus = SignalBus::new();
    let log = CallLog::default();
    let outcome = std::sync::Arc::new(parking_lot::Mutex::new(None));

    register_named(&bus, &log, "a", Some(OrderOptions::new("a").before("b"))).expect("registers");
    {
        let bus = bus.clone();
        let log = log.clone();
        let outcome = outcome.clone();
        let attempted = std::sync::atomic::AtomicBool::new(false);
        bus.clone()
            .register(SignalHandler::<Frame>::unit(move || {
                if !attempted.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    let result =
                        register_named(&bus, &log, "b", Some(OrderOptions::new("b").before("a")));
                    *outcome.lock() = Some(result);
                }
            }))
            .expect("registers");
    }

    bus.send(&Frame).expect("the send itself succeeds");
    match outcome.lock().take() {
        Some(Err(SignalBusError::CycleDetected { source, .. })) => {
            assert_eq!(source.unresolved, vec!["a", "b"]);
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }
    assert_eq!(bus.subscriber_count::<Frame>(), 2);

    bus.send(&Frame).expect("type is still usable");
    assert_eq!(log.take(), vec!["a", "a"]);
    register_named(&bus, &log, "z", Some(OrderOptions::new("z"))).expect("unrelated key registers");
}
