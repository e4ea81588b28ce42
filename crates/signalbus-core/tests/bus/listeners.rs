use async_trait::async_trait;
use parking_lot::Mutex;
use signalbus_core::{
    AsyncSignalListener, CancellationToken, HandlerResult, SendMode, SignalBus, SignalHandler,
    SignalListener,
};
use std::sync::Arc;

#[derive(Debug)]
struct Alarm {
    code: u8,
}

#[derive(Default)]
struct AlarmLog {
    codes: Mutex<Vec<u8>>,
}

impl SignalListener<Alarm> for AlarmLog {
    fn on_signal(&self, signal: &Alarm) -> HandlerResult {
        if signal.code == 0 {
            return Err("alarm code 0 is reserved".into());
        }
        self.codes.lock().push(signal.code);
        Ok(())
    }
}

#[async_trait]
impl AsyncSignalListener<Alarm> for AlarmLog {
    async fn on_signal(&self, signal: Arc<Alarm>, _cancel: CancellationToken) -> HandlerResult {
        tokio::task::yield_now().await;
        self.codes.lock().push(signal.code + 100);
        Ok(())
    }
}

#[test]
fn test_listener_identity_follows_the_arc() {
    let bus = SignalBus::new();
    let listener = Arc::new(AlarmLog::default());

    bus.register(SignalHandler::<Alarm>::from_listener(listener.clone()))
        .expect("registers");
    bus.send(&Alarm { code: 9 }).expect("sends");

    // A fresh wrapper around the same Arc deregisters the subscription.
    assert!(bus.deregister(&SignalHandler::<Alarm>::from_listener(listener.clone())));
    bus.send(&Alarm { code: 10 }).expect("sends");

    assert_eq!(*listener.codes.lock(), vec![9]);
}

#[test]
fn test_listener_errors_propagate() {
    let bus = SignalBus::new();
    bus.register(SignalHandler::<Alarm>::from_listener(Arc::new(AlarmLog::default())))
        .expect("registers");

    let err = bus.send(&Alarm { code: 0 }).unwrap_err();
    assert!(err.is_handler_failure());
}

#[tokio::test]
async fn test_async_listener() {
    let bus = SignalBus::new();
    let listener = Arc::new(AlarmLog::default());
    let handler = SignalHandler::<Alarm>::from_async_listener(listener.clone());
    assert!(handler.is_async());

    bus.register(handler).expect("registers");
    bus.send_async_with(Alarm { code: 1 }, &CancellationToken::new(), SendMode::Concurrent)
        .await
        .expect("sends");

    assert_eq!(*listener.codes.lock(), vec![101]);
}

#[tokio::test]
async fn test_sync_and_async_wrappers_deregister_independently() {
    let bus = SignalBus::new();
    let listener = Arc::new(AlarmLog::default());

    bus.register(SignalHandler::<Alarm>::from_listener(listener.clone()))
        .expect("registers");
    bus.register(SignalHandler::<Alarm>::from_async_listener(listener.clone()))
        .expect("registers");

    // Removing the synchronous wrapper leaves the asynchronous one alone.
    assert!(bus.deregister(&SignalHandler::<Alarm>::from_listener(listener.clone())));
    assert!(!bus.deregister(&SignalHandler::<Alarm>::from_listener(listener.clone())));
    assert_eq!(bus.subscriber_count::<Alarm>(), 1);

    bus.send(&Alarm { code: 2 }).expect("sends");
    bus.send_async(Alarm { code: 3 }, &CancellationToken::new())
        .await
        .expect("sends");
    assert_eq!(*listener.codes.lock(), vec![103]);
}
