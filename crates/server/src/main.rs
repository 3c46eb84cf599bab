//! Sanction ledger daemon entry point.

use std::sync::Arc;

use async_trait::async_trait;
use sanction_common::{AppResult, Config, DurationParser, SystemClock};
use sanction_core::{
    BroadcastEventPublisher, ExpiryService, HookExecutor, HookInvocation, LedgerEvent,
    LedgerService,
};
use sanction_queue::{ExpiryQueue, LedgerJobExecutor, SchedulerConfig, run_scheduler};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hook executor that records configured actions in the log.
///
/// Action strings are owned by the deployment; this daemon only reports them.
struct LoggingHookExecutor;

#[async_trait]
impl HookExecutor for LoggingHookExecutor {
    async fn execute(&self, invocation: HookInvocation) -> AppResult<()> {
        info!(
            trigger = ?invocation.trigger,
            actor = %invocation.actor,
            subject_id = %invocation.subject_id,
            kind = %invocation.action_kind,
            duration = %invocation.duration_label,
            is_removal = invocation.is_removal,
            actions = ?invocation.actions,
            "Warning hook"
        );
        Ok(())
    }
}

/// Log every ledger event until the publisher goes away.
async fn log_events(mut rx: broadcast::Receiver<LedgerEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!(subject_id = %event.subject_id(), event = %json, "Ledger event"),
                Err(e) => warn!(error = %e, "Failed to serialize ledger event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sanction=debug,sanctiond=debug".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }

    info!("Starting sanction ledger...");

    // Connect to database
    let db = sanction_db::init(&config.database).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    sanction_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);
    let clock = Arc::new(SystemClock);
    let events = Arc::new(BroadcastEventPublisher::default());
    let event_log = tokio::spawn(log_events(events.subscribe()));

    // Expiry timers
    let expiry = ExpiryService::new(Arc::clone(&db), clock.clone(), events.clone());
    let (queue, queue_worker) = ExpiryQueue::spawn(expiry.clone(), clock.clone());
    queue.rearm_pending(&expiry).await?;

    let ledger = LedgerService::new(
        Arc::clone(&db),
        clock,
        events,
        Arc::new(LoggingHookExecutor),
        Arc::new(queue),
        config.warnings.clone(),
        DurationParser::new(&config.time_units),
    );
    info!(
        mode = ?config.warnings.expiration_mode,
        levels = config.warnings.levels.len(),
        "Warning policy loaded"
    );

    // Periodic sweeps
    let scheduler = run_scheduler(
        SchedulerConfig::from(&config.scheduler),
        Arc::new(LedgerJobExecutor::new(ledger, expiry)),
    );
    info!("Scheduler started");

    shutdown_signal().await;

    for task in scheduler {
        task.abort();
    }
    queue_worker.abort();
    event_log.abort();

    info!("Server shutdown complete");
    Ok(())
}
