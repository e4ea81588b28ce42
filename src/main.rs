use std::sync::Arc;
use std::time::Duration;

use signalbus::{
    init_logging, CancellationToken, OrderOptions, RegisterOptions, SendMode, SignalBus,
    SignalBusConfig, SignalHandler, Token,
};

/// Demo signal: a machine finished a job
#[derive(Debug, Default)]
struct JobFinished {
    name: String,
    lines: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging()?;

    // Optional JSON config path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => SignalBusConfig::load(&path)?,
        None => SignalBusConfig::default(),
    };
    tracing::info!("Starting signal bus demo with {:?}", config);

    let bus = SignalBus::builder().config(config).build()?;
    let session = Token::named("demo-session");

    bus.register_with(
        SignalHandler::new(|job: &JobFinished| {
            tracing::info!("Notifying: {} finished ({} lines)", job.name, job.lines);
        }),
        RegisterOptions::new()
            .token(session.clone())
            .order(OrderOptions::new("notifier").after("persistence")),
    )?;

    bus.register_with(
        SignalHandler::new(|job: &JobFinished| {
            tracing::info!("Persisting job record for {}", job.name);
        }),
        RegisterOptions::new()
            .token(session.clone())
            .order(OrderOptions::new("persistence")),
    )?;

    bus.register_with(
        SignalHandler::future(|job: Arc<JobFinished>, cancel: CancellationToken| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    tracing::info!("Uploaded report for {}", job.name);
                    Ok(())
                }
                _ = cancel.cancelled() => Err(signalbus::Cancelled),
            }
        }),
        RegisterOptions::new().token(session.clone()),
    )?;

    bus.send(&JobFinished {
        name: "spoilboard.nc".into(),
        lines: 1200,
    })?;

    let cancel = CancellationToken::new();
    bus.send_async_with(
        JobFinished {
            name: "pocket.nc".into(),
            lines: 340,
        },
        &cancel,
        SendMode::Concurrent,
    )
    .await?;

    let removed = bus.deregister_token(&session);
    tracing::info!("Removed {} subscription(s); {} remaining", removed, bus.total_subscriptions());

    Ok(())
}
