//! Fee Ledger - Population Sync Job
//!
//! Reconciles every active student's ledger for one academic year against
//! the fee catalog in a reference-data snapshot.
//!
//! # Usage
//!
//! ```bash
//! FEE_YEAR_ID=2024-25 FEE_SNAPSHOT_PATH=./reference.json cargo run --bin fee-sync
//! ```
//!
//! # Environment Variables
//!
//! * `FEE_YEAR_ID` - Academic year to sync (required)
//! * `FEE_SNAPSHOT_PATH` - Reference-data JSON file (default: reference.json)
//! * `FEE_DATABASE_URL` - PostgreSQL connection string (in-memory when unset)
//! * `FEE_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `FEE_DB_ACQUIRE_TIMEOUT_SECS` - Wait for a free connection (default: 30)
//! * `FEE_MAX_CONCURRENCY` - Students processed at once (default: 10)
//! * `FEE_BATCH_SIZE` - Students read per page (default: 100)
//! * `FEE_MAX_CONFLICT_RETRIES` - Retries after a version conflict (default: 3)
//! * `FEE_DEADLINE_SECS` - Stop starting new students after this long
//! * `FEE_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `FEE_LOG_JSON` - Emit JSON log lines (default: false)
//!
//! The process exits non-zero if any student failed or the run was cut short;
//! rerunning is safe.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use interface_jobs::{runner, JobConfig, SnapshotReferenceData};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = JobConfig::from_env().context("loading configuration")?;
    init_tracing(&config.log_level, config.log_json);

    info!(
        year = %config.year(),
        snapshot = %config.snapshot_path,
        persistent = config.database_url.is_some(),
        "Starting fee-sync"
    );

    let reference = Arc::new(
        SnapshotReferenceData::load(&config.snapshot_path)
            .await
            .context("loading reference snapshot")?,
    );
    let store = runner::open_store(&config).await.context("opening ledger store")?;
    let service = runner::build_service(&config, store, reference);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(cancel_on_signal(cancel_tx));

    let report = runner::run_sync(service, &config, cancel_rx).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !runner::is_clean(&report) {
        anyhow::bail!(
            "sync incomplete: {} failed, interrupted={}",
            report.failures.len(),
            report.interrupted
        );
    }
    Ok(())
}

/// Initializes the tracing subscriber
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Flips the cancel flag on Ctrl+C or SIGTERM
///
/// Students already in flight finish; nothing new is started.
async fn cancel_on_signal(cancel: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, finishing in-flight students");
    let _ = cancel.send(true);
}
