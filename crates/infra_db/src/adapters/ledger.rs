//! PostgreSQL Ledger Store Adapter
//!
//! This module provides the database adapter for the ledger domain,
//! implementing the `LedgerStore` port using the `LedgerRepository`.
//!
//! Item lists, allocations and adjustment changes are stored as JSONB using
//! the domain types' serde representation; enums are stored as their
//! serialized text.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresLedgerStore;
//! use domain_ledger::LedgerStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool));
//! let ledger = store.load(&key).await?;
//! ```

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    AdapterHealth, AdjustmentId, DomainPort, HealthCheckResult, HealthCheckable, Money,
    PortError, StudentId, TransactionId, YearId,
};
use domain_ledger::{
    Adjustment, JournalRecord, LedgerAccount, LedgerCommit, LedgerKey, LedgerStore,
    StoredLedger, Transaction,
};

use crate::error::DatabaseError;
use crate::repositories::ledger::{
    AdjustmentRow, JournalRow, LedgerRepository, LedgerRow, TransactionRow,
};

/// PostgreSQL-backed implementation of the `LedgerStore` port
///
/// Database errors are translated to `PortError` variants; failed version
/// guards and duplicate payment references become `PortError::Conflict`.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    repository: LedgerRepository,
}

impl PostgresLedgerStore {
    /// Creates a new store over the given pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: LedgerRepository::new(pool),
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &LedgerRepository {
        &self.repository
    }
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    /// Performs a simple SELECT 1 query to verify the pool is operational
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.repository.pool())
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: "postgres-ledger-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: "postgres-ledger-store".to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(ledger = %key))]
    async fn load(&self, key: &LedgerKey) -> Result<Option<StoredLedger>, PortError> {
        let row = self
            .repository
            .find(key.student_id.as_str(), key.year_id.as_str())
            .await?;
        row.map(row_to_stored_ledger).transpose().map_err(PortError::from)
    }

    #[instrument(skip(self, commit), fields(ledger = %commit.key, expected = ?commit.expected_version))]
    async fn commit(&self, commit: LedgerCommit) -> Result<u64, PortError> {
        if commit.account.key() != commit.key {
            return Err(PortError::validation(format!(
                "commit key {} does not match ledger {}",
                commit.key,
                commit.account.key()
            )));
        }
        let ledger = account_to_row(&commit.account)?;
        let expected = commit.expected_version.map(version_to_db).transpose()?;
        let journal = commit.journal.as_ref().map(journal_to_row).transpose()?;

        let version = self
            .repository
            .commit(&ledger, expected, journal.as_ref())
            .await?;
        version_from_db(version).map_err(PortError::from)
    }

    async fn find_transaction_by_reference(
        &self,
        key: &LedgerKey,
        reference: &str,
    ) -> Result<Option<Transaction>, PortError> {
        let row = self
            .repository
            .find_transaction_by_reference(key.student_id.as_str(), key.year_id.as_str(), reference)
            .await?;
        row.map(row_to_transaction).transpose().map_err(PortError::from)
    }

    async fn transactions_for_student(
        &self,
        student_id: &StudentId,
        year_id: Option<&YearId>,
    ) -> Result<Vec<Transaction>, PortError> {
        let rows = self
            .repository
            .transactions_for_student(student_id.as_str(), year_id.map(YearId::as_str))
            .await?;
        rows.into_iter()
            .map(row_to_transaction)
            .collect::<Result<_, _>>()
            .map_err(PortError::from)
    }

    async fn adjustments_for_student(
        &self,
        student_id: &StudentId,
        year_id: Option<&YearId>,
    ) -> Result<Vec<Adjustment>, PortError> {
        let rows = self
            .repository
            .adjustments_for_student(student_id.as_str(), year_id.map(YearId::as_str))
            .await?;
        rows.into_iter()
            .map(row_to_adjustment)
            .collect::<Result<_, _>>()
            .map_err(PortError::from)
    }

    #[instrument(skip(self))]
    async fn purge_year(&self, year_id: &YearId) -> Result<u64, PortError> {
        Ok(self.repository.purge_year(year_id.as_str()).await?)
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn enum_to_text<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(text) => Ok(text),
        other => Err(DatabaseError::SerializationError(format!(
            "expected a string enum, got {}",
            other
        ))),
    }
}

fn text_to_enum<T: DeserializeOwned>(text: &str) -> Result<T, DatabaseError> {
    Ok(serde_json::from_value(serde_json::Value::String(text.to_string()))?)
}

fn version_to_db(version: u64) -> Result<i64, DatabaseError> {
    i64::try_from(version)
        .map_err(|_| DatabaseError::SerializationError(format!("version {} out of range", version)))
}

fn version_from_db(version: i64) -> Result<u64, DatabaseError> {
    u64::try_from(version)
        .map_err(|_| DatabaseError::SerializationError(format!("negative version {}", version)))
}

/// Converts a domain ledger to its row form (the stored version is set by the repository)
pub(crate) fn account_to_row(account: &LedgerAccount) -> Result<LedgerRow, DatabaseError> {
    Ok(LedgerRow {
        student_id: account.student_id.to_string(),
        year_id: account.year_id.to_string(),
        items: serde_json::to_value(&account.items)?,
        total_fee: account.total_fee.minor(),
        total_paid: account.total_paid.minor(),
        status: enum_to_text(&account.status)?,
        version: 0,
        created_at: account.created_at,
        updated_at: account.updated_at,
    })
}

pub(crate) fn row_to_stored_ledger(row: LedgerRow) -> Result<StoredLedger, DatabaseError> {
    let version = version_from_db(row.version)?;
    let account = LedgerAccount {
        student_id: StudentId::new(row.student_id),
        year_id: YearId::new(row.year_id),
        items: serde_json::from_value(row.items)?,
        total_fee: Money::from_minor(row.total_fee),
        total_paid: Money::from_minor(row.total_paid),
        status: text_to_enum(&row.status)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(StoredLedger { account, version })
}

fn journal_to_row(record: &JournalRecord) -> Result<JournalRow, DatabaseError> {
    match record {
        JournalRecord::Payment(tx) => Ok(JournalRow::Transaction(transaction_to_row(tx)?)),
        JournalRecord::Adjustment(adj) => Ok(JournalRow::Adjustment(adjustment_to_row(adj)?)),
    }
}

pub(crate) fn transaction_to_row(tx: &Transaction) -> Result<TransactionRow, DatabaseError> {
    Ok(TransactionRow {
        transaction_id: *tx.id.as_uuid(),
        student_id: tx.student_id.to_string(),
        year_id: tx.year_id.to_string(),
        amount: tx.amount.minor(),
        method: enum_to_text(&tx.method)?,
        reference: tx.reference.clone(),
        allocation: serde_json::to_value(&tx.allocation)?,
        recorded_by: tx.recorded_by.clone(),
        status: enum_to_text(&tx.status)?,
        recorded_at: tx.timestamp,
    })
}

pub(crate) fn row_to_transaction(row: TransactionRow) -> Result<Transaction, DatabaseError> {
    Ok(Transaction {
        id: TransactionId::from_uuid(row.transaction_id),
        student_id: StudentId::new(row.student_id),
        year_id: YearId::new(row.year_id),
        amount: Money::from_minor(row.amount),
        method: text_to_enum(&row.method)?,
        reference: row.reference,
        allocation: serde_json::from_value(row.allocation)?,
        recorded_by: row.recorded_by,
        timestamp: row.recorded_at,
        status: text_to_enum(&row.status)?,
    })
}

pub(crate) fn adjustment_to_row(adj: &Adjustment) -> Result<AdjustmentRow, DatabaseError> {
    Ok(AdjustmentRow {
        adjustment_id: *adj.id.as_uuid(),
        student_id: adj.student_id.to_string(),
        year_id: adj.year_id.to_string(),
        reason: adj.reason.clone(),
        changes: serde_json::to_value(&adj.changes)?,
        performed_by: adj.performed_by.clone(),
        performer_role: enum_to_text(&adj.performer_role)?,
        performed_at: adj.timestamp,
    })
}

pub(crate) fn row_to_adjustment(row: AdjustmentRow) -> Result<Adjustment, DatabaseError> {
    Ok(Adjustment {
        id: AdjustmentId::from_uuid(row.adjustment_id),
        student_id: StudentId::new(row.student_id),
        year_id: YearId::new(row.year_id),
        reason: row.reason,
        changes: serde_json::from_value(row.changes)?,
        performed_by: row.performed_by,
        performer_role: text_to_enum(&row.performer_role)?,
        timestamp: row.performed_at,
    })
}
