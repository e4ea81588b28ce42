use proptest::prelude::*;
use signalbus_core::{RegisterOptions, SignalBus, SignalHandler, Token};

struct Spindle;
struct Coolant;
struct Feed;

fn register(bus: &SignalBus, kind: usize, token: u64) {
    let options = RegisterOptions::new().token(token);
    let outcome = match kind {
        0 => bus.register_with(SignalHandler::<Spindle>::unit(|| {}), options),
        1 => bus.register_with(SignalHandler::<Coolant>::unit(|| {}), options),
        _ => bus.register_with(SignalHandler::<Feed>::unit(|| {}), options),
    };
    outcome.expect("registers");
}

proptest! {
    #[test]
    fn prop_token_removal_counts_every_type(
        registrations in proptest::collection::vec((0usize..3, 0u64..4), 0..40),
        target in 0u64..4,
    ) {
        let bus = SignalBus::new();
        for (kind, token) in &registrations {
            register(&bus, *kind, *token);
        }

        let expected = registrations.iter().filter(|(_, token)| *token == target).count();
        let removed = bus.deregister_token(&Token::Id(target));

        prop_assert_eq!(removed, expected);
        prop_assert_eq!(bus.total_subscriptions(), registrations.len() - expected);
        prop_assert_eq!(bus.deregister_token(&Token::Id(target)), 0);
    }

    #[test]
    fn prop_removal_during_dispatch_matches_idle_removal(
        registrations in proptest::collection::vec(0u64..3, 1..20),
        target in 0u64..3,
    ) {
        let bus = SignalBus::new();
        let removed = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let bus = bus.clone();
            let removed = removed.clone();
            bus.clone()
                .register(SignalHandler::<Spindle>::unit(move || {
                    let count = bus.deregister_token(&Token::Id(target));
                    removed.fetch_add(count, std::sync::atomic::Ordering::SeqCst);
                }))
                .expect("registers");
        }
        for token in &registrations {
            register(&bus, 0, *token);
            register(&bus, 1, *token);
        }

        bus.send(&Spindle).expect("sends");

        let expected = 2 * registrations.iter().filter(|token| **token == target).count();
        prop_assert_eq!(removed.load(std::sync::atomic::Ordering::SeqCst), expected);
        prop_assert_eq!(bus.total_subscriptions(), 1 + 2 * registrations.len() - expected);
    }
}
