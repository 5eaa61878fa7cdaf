//! Fan-out over a student population
//!
//! Population-wide work (re-syncing every ledger for a year, pushing a new
//! custom fee to its targets) is split into one independent ledger
//! transaction per student. Students are read page by page from reference
//! data and processed with bounded concurrency; a failure for one student is
//! recorded in the report and never stops the run.
//!
//! A run can be interrupted by a deadline or a cancel signal. Interruption
//! only stops new students from starting: work already in flight finishes
//! and is counted.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use core_kernel::{FeeId, PortError, StudentId, YearId};

use crate::catalog::{CustomFee, FeeCatalog, Student};
use crate::error::LedgerError;
use crate::ports::StudentQuery;
use crate::service::LedgerService;

/// A student the run could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentFailure {
    pub student_id: StudentId,
    pub error: String,
}

/// Result of a population sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub failures: Vec<StudentFailure>,
    /// True if a deadline or cancel signal stopped the run early
    pub interrupted: bool,
}

/// Result of assigning a custom fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignReport {
    pub fee_id: FeeId,
    /// Ledgers the fee was added to
    pub affected_count: usize,
    /// Ledgers that already carried the fee
    pub skipped_count: usize,
    pub failures: Vec<StudentFailure>,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StudentOutcome {
    Changed,
    Unchanged,
}

#[derive(Clone)]
enum Job {
    Sync(Arc<FeeCatalog>),
    Assign { fee: Arc<CustomFee>, year_id: YearId },
}

impl Job {
    async fn run(self, service: LedgerService, student: Student) -> Result<StudentOutcome, LedgerError> {
        let changed = match self {
            Job::Sync(catalog) => service.reconcile_with(&student, &catalog).await?.changed,
            Job::Assign { fee, year_id } => {
                service.append_custom_fee(&student, &year_id, &fee).await?
            }
        };
        Ok(if changed {
            StudentOutcome::Changed
        } else {
            StudentOutcome::Unchanged
        })
    }
}

#[derive(Debug, Default)]
struct Tally {
    changed: usize,
    unchanged: usize,
    failures: Vec<StudentFailure>,
    interrupted: bool,
}

impl Tally {
    fn record(&mut self, student_id: StudentId, result: Result<StudentOutcome, LedgerError>) {
        match result {
            Ok(StudentOutcome::Changed) => self.changed += 1,
            Ok(StudentOutcome::Unchanged) => self.unchanged += 1,
            Err(err) => {
                warn!(student_id = %student_id, error = %err, "Student failed during fan-out");
                self.failures.push(StudentFailure {
                    student_id,
                    error: err.to_string(),
                });
            }
        }
    }
}

/// Runs per-student ledger operations across a population
pub struct FanOutCoordinator {
    service: LedgerService,
    cancel: Option<watch::Receiver<bool>>,
}

impl FanOutCoordinator {
    pub fn new(service: LedgerService) -> Self {
        Self {
            service,
            cancel: None,
        }
    }

    /// Stops starting new students once the channel carries `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Reconciles every active student against the year's catalog
    #[instrument(skip(self))]
    pub async fn sync_population(&self, year_id: &YearId) -> Result<SyncReport, LedgerError> {
        let catalog = self.service.load_catalog(year_id).await?;
        let tally = self
            .fan_out(StudentQuery::active(), Job::Sync(Arc::new(catalog)))
            .await?;

        let report = SyncReport {
            updated_count: tally.changed,
            unchanged_count: tally.unchanged,
            failures: tally.failures,
            interrupted: tally.interrupted,
        };
        info!(
            updated = report.updated_count,
            unchanged = report.unchanged_count,
            failed = report.failures.len(),
            interrupted = report.interrupted,
            "Population sync finished"
        );
        Ok(report)
    }

    /// Adds `fee` to every active student it targets, once
    #[instrument(skip(self, fee), fields(fee_id = %fee.id))]
    pub async fn assign_custom_fee(
        &self,
        fee: &CustomFee,
        year_id: &YearId,
    ) -> Result<AssignReport, LedgerError> {
        fee.validate()?;
        if !fee.is_active {
            return Err(LedgerError::validation(format!(
                "custom fee {} is not active",
                fee.id
            )));
        }

        let job = Job::Assign {
            fee: Arc::new(fee.clone()),
            year_id: year_id.clone(),
        };
        let tally = self.fan_out(StudentQuery::for_target(&fee.target), job).await?;

        let report = AssignReport {
            fee_id: fee.id.clone(),
            affected_count: tally.changed,
            skipped_count: tally.unchanged,
            failures: tally.failures,
            interrupted: tally.interrupted,
        };
        info!(
            affected = report.affected_count,
            skipped = report.skipped_count,
            failed = report.failures.len(),
            interrupted = report.interrupted,
            "Custom fee assignment finished"
        );
        Ok(report)
    }

    fn should_stop(&self, deadline: Option<Instant>) -> bool {
        let cancelled = self
            .cancel
            .as_ref()
            .map_or(false, |cancel| *cancel.borrow());
        let expired = deadline.map_or(false, |deadline| Instant::now() >= deadline);
        cancelled || expired
    }

    async fn fan_out(&self, query: StudentQuery, job: Job) -> Result<Tally, LedgerError> {
        let config = self.service.config().clone();
        config.validate()?;
        let deadline = config.deadline.map(|d| Instant::now() + d);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        let mut tasks: JoinSet<(StudentId, Result<StudentOutcome, LedgerError>)> = JoinSet::new();
        let mut tally = Tally::default();
        let mut offset = 0;

        'pages: loop {
            let page = self
                .service
                .reference_data()
                .find_students(&query.clone().page(config.batch_size, offset))
                .await?;
            let page_len = page.len();

            for student in page {
                if self.should_stop(deadline) {
                    tally.interrupted = true;
                    break 'pages;
                }
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| LedgerError::Store(PortError::internal("fan-out semaphore closed")))?;
                // Waiting for a permit can outlast the deadline.
                if self.should_stop(deadline) {
                    tally.interrupted = true;
                    break 'pages;
                }

                let service = self.service.clone();
                let job = job.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let student_id = student.id.clone();
                    (student_id, job.run(service, student).await)
                });
            }

            if page_len < config.batch_size {
                break;
            }
            offset += config.batch_size;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((student_id, result)) => tally.record(student_id, result),
                Err(join_error) => {
                    error!(error = %join_error, "Fan-out task aborted");
                    tally.failures.push(StudentFailure {
                        student_id: StudentId::new("unknown"),
                        error: join_error.to_string(),
                    });
                }
            }
        }

        if tally.interrupted {
            warn!(
                processed = tally.changed + tally.unchanged + tally.failures.len(),
                "Fan-out interrupted before all students were started"
            );
        }
        Ok(tally)
    }
}
