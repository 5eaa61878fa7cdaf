//! Wiring and execution of the population sync

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use domain_ledger::ports::memory::InMemoryLedgerStore;
use domain_ledger::{
    FanOutCoordinator, LedgerService, LedgerStore, ReferenceData, SyncReport, TracingNotifier,
};
use infra_db::{create_pool, run_migrations, PostgresLedgerStore};

use crate::config::JobConfig;
use crate::error::JobError;

/// Opens the configured ledger store
///
/// With a `database_url` the PostgreSQL store is used and migrations are
/// applied first; otherwise ledgers live in memory for the duration of the run.
pub async fn open_store(config: &JobConfig) -> Result<Arc<dyn LedgerStore>, JobError> {
    match config.database_config() {
        Some(database) => {
            let pool = create_pool(database).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PostgresLedgerStore::new(pool)))
        }
        None => {
            warn!("No database_url configured, ledgers will not outlive this run");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

/// Assembles a ledger service over the given store and reference data
pub fn build_service(
    config: &JobConfig,
    store: Arc<dyn LedgerStore>,
    reference: Arc<dyn ReferenceData>,
) -> LedgerService {
    LedgerService::new(
        store,
        reference,
        Arc::new(TracingNotifier),
        config.engine_config(),
    )
}

/// Runs one population sync, stopping early when `cancel` turns true
pub async fn run_sync(
    service: LedgerService,
    config: &JobConfig,
    cancel: watch::Receiver<bool>,
) -> Result<SyncReport, JobError> {
    let year = config.year();
    info!(year = %year, "Starting population sync");

    let report = FanOutCoordinator::new(service)
        .with_cancellation(cancel)
        .sync_population(&year)
        .await?;

    info!(
        year = %year,
        updated = report.updated_count,
        unchanged = report.unchanged_count,
        failed = report.failures.len(),
        interrupted = report.interrupted,
        "Population sync finished"
    );
    for failure in &report.failures {
        warn!(student_id = %failure.student_id, error = %failure.error, "Student not synced");
    }
    Ok(report)
}

/// True when the run covered every student without failures
pub fn is_clean(report: &SyncReport) -> bool {
    report.failures.is_empty() && !report.interrupted
}
