//! Circulation daemon
//!
//! Connects to PostgreSQL, applies migrations, then runs the reservation
//! expiry sweeper and publishes hold-ready events until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use circulation_service::{
    config::{AppConfig, LoggingConfig},
    repository::PgRepository,
    services::{
        clock::{Clock, SystemClock},
        notifier::BroadcastNotifier,
        sweeper::ExpirySweeper,
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting circulation service v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut hold_events = notifier.subscribe();

    let services = Services::new(
        Arc::new(PgRepository::new(pool)),
        config.circulation.clone(),
        clock.clone(),
        notifier,
    );
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    // Hold-ready events are the hand-off point to borrower messaging
    let listener = tokio::spawn(async move {
        while let Some(event) = hold_events.next().await {
            match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => tracing::info!("Hold ready: {}", payload),
                    Err(e) => tracing::warn!("Failed to encode hold-ready event: {}", e),
                },
                Err(e) => tracing::warn!("Hold-ready listener fell behind: {}", e),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if state.config.sweeper.enabled {
        let interval = Duration::from_secs(state.config.sweeper.interval_secs.max(1));
        Some(ExpirySweeper::new(state.services.reservations.clone(), clock, interval).spawn(shutdown_rx))
    } else {
        tracing::info!("Expiry sweeper disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        handle.await.context("Expiry sweeper panicked")?;
    }
    listener.abort();

    tracing::info!("Circulation service stopped");
    Ok(())
}

/// Console output in `pretty` or `json`, plus an optional daily log file.
/// The returned guard flushes the file writer and must outlive the runtime.
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("circulation_service={},sqlx=warn", logging.level).into());

    let console = if logging.format.eq_ignore_ascii_case("json") {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().pretty().boxed()
    };

    let (file, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "circulation.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guard
}
