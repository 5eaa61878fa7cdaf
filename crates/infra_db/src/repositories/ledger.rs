//! Fee ledger repository implementation
//!
//! This module provides database access for fee ledgers and their payment
//! and adjustment journals. A ledger write and its journal row always go
//! through one SQL transaction guarded by the ledger's `version` column.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

/// A `fee_ledgers` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    pub student_id: String,
    pub year_id: String,
    pub items: JsonValue,
    pub total_fee: i64,
    pub total_paid: i64,
    pub status: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A `fee_transactions` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub transaction_id: Uuid,
    pub student_id: String,
    pub year_id: String,
    pub amount: i64,
    pub method: String,
    pub reference: Option<String>,
    pub allocation: JsonValue,
    pub recorded_by: Option<String>,
    pub status: String,
    pub recorded_at: DateTime<Utc>,
}

/// A `fee_adjustments` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdjustmentRow {
    pub adjustment_id: Uuid,
    pub student_id: String,
    pub year_id: String,
    pub reason: String,
    pub changes: JsonValue,
    pub performed_by: String,
    pub performer_role: String,
    pub performed_at: DateTime<Utc>,
}

/// Journal row written alongside a ledger
#[derive(Debug, Clone)]
pub enum JournalRow {
    Transaction(TransactionRow),
    Adjustment(AdjustmentRow),
}

/// Repository for fee ledgers
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetches one ledger row
    pub async fn find(
        &self,
        student_id: &str,
        year_id: &str,
    ) -> Result<Option<LedgerRow>, DatabaseError> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT student_id, year_id, items, total_fee, total_paid, status,
                   version, created_at, updated_at
            FROM fee_ledgers
            WHERE student_id = $1 AND year_id = $2
            "#,
        )
        .bind(student_id)
        .bind(year_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Writes a ledger row and its journal row atomically.
    ///
    /// `expected_version = None` inserts; otherwise the update only applies if
    /// the stored version still matches. Either failure surfaces as
    /// `ConcurrentModification`.
    ///
    /// # Returns
    ///
    /// The version now stored
    pub async fn commit(
        &self,
        ledger: &LedgerRow,
        expected_version: Option<i64>,
        journal: Option<&JournalRow>,
    ) -> Result<i64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let version = match expected_version {
            None => Self::insert_ledger(&mut tx, ledger).await?,
            Some(expected) => Self::update_ledger(&mut tx, ledger, expected).await?,
        };

        match journal {
            Some(JournalRow::Transaction(row)) => Self::insert_transaction(&mut tx, row).await?,
            Some(JournalRow::Adjustment(row)) => Self::insert_adjustment(&mut tx, row).await?,
            None => {}
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        debug!(
            student_id = %ledger.student_id,
            year_id = %ledger.year_id,
            version,
            "Ledger row committed"
        );
        Ok(version)
    }

    async fn insert_ledger(
        tx: &mut Transaction<'_, Postgres>,
        ledger: &LedgerRow,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO fee_ledgers (
                student_id, year_id, items, total_fee, total_paid, status,
                version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $8)
            ON CONFLICT (student_id, year_id) DO NOTHING
            "#,
        )
        .bind(&ledger.student_id)
        .bind(&ledger.year_id)
        .bind(&ledger.items)
        .bind(ledger.total_fee)
        .bind(ledger.total_paid)
        .bind(&ledger.status)
        .bind(ledger.created_at)
        .bind(ledger.updated_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::ConcurrentModification(format!(
                "ledger {}/{} already exists",
                ledger.student_id, ledger.year_id
            )));
        }
        Ok(1)
    }

    async fn update_ledger(
        tx: &mut Transaction<'_, Postgres>,
        ledger: &LedgerRow,
        expected_version: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE fee_ledgers
            SET items = $3,
                total_fee = $4,
                total_paid = $5,
                status = $6,
                updated_at = $7,
                version = version + 1
            WHERE student_id = $1 AND year_id = $2 AND version = $8
            "#,
        )
        .bind(&ledger.student_id)
        .bind(&ledger.year_id)
        .bind(&ledger.items)
        .bind(ledger.total_fee)
        .bind(ledger.total_paid)
        .bind(&ledger.status)
        .bind(ledger.updated_at)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::ConcurrentModification(format!(
                "ledger {}/{} is no longer at version {}",
                ledger.student_id, ledger.year_id, expected_version
            )));
        }
        Ok(expected_version + 1)
    }

    async fn insert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        row: &TransactionRow,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO fee_transactions (
                transaction_id, student_id, year_id, amount, method, reference,
                allocation, recorded_by, status, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.transaction_id)
        .bind(&row.student_id)
        .bind(&row.year_id)
        .bind(row.amount)
        .bind(&row.method)
        .bind(&row.reference)
        .bind(&row.allocation)
        .bind(&row.recorded_by)
        .bind(&row.status)
        .bind(row.recorded_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_adjustment(
        tx: &mut Transaction<'_, Postgres>,
        row: &AdjustmentRow,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO fee_adjustments (
                adjustment_id, student_id, year_id, reason, changes,
                performed_by, performer_role, performed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.adjustment_id)
        .bind(&row.student_id)
        .bind(&row.year_id)
        .bind(&row.reason)
        .bind(&row.changes)
        .bind(&row.performed_by)
        .bind(&row.performer_role)
        .bind(row.performed_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Looks up a payment by its reference on one ledger
    pub async fn find_transaction_by_reference(
        &self,
        student_id: &str,
        year_id: &str,
        reference: &str,
    ) -> Result<Option<TransactionRow>, DatabaseError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT transaction_id, student_id, year_id, amount, method, reference,
                   allocation, recorded_by, status, recorded_at
            FROM fee_transactions
            WHERE student_id = $1 AND year_id = $2 AND reference = $3
            "#,
        )
        .bind(student_id)
        .bind(year_id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Payments for a student, oldest first
    pub async fn transactions_for_student(
        &self,
        student_id: &str,
        year_id: Option<&str>,
    ) -> Result<Vec<TransactionRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT transaction_id, student_id, year_id, amount, method, reference,
                   allocation, recorded_by, status, recorded_at
            FROM fee_transactions
            WHERE student_id = $1 AND ($2::TEXT IS NULL OR year_id = $2)
            ORDER BY recorded_at, transaction_id
            "#,
        )
        .bind(student_id)
        .bind(year_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Adjustments for a student, oldest first
    pub async fn adjustments_for_student(
        &self,
        student_id: &str,
        year_id: Option<&str>,
    ) -> Result<Vec<AdjustmentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AdjustmentRow>(
            r#"
            SELECT adjustment_id, student_id, year_id, reason, changes,
                   performed_by, performer_role, performed_at
            FROM fee_adjustments
            WHERE student_id = $1 AND ($2::TEXT IS NULL OR year_id = $2)
            ORDER BY performed_at, adjustment_id
            "#,
        )
        .bind(student_id)
        .bind(year_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes a year's ledgers and journals
    ///
    /// # Returns
    ///
    /// The number of ledgers deleted
    pub async fn purge_year(&self, year_id: &str) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fee_transactions WHERE year_id = $1")
            .bind(year_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fee_adjustments WHERE year_id = $1")
            .bind(year_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM fee_ledgers WHERE year_id = $1")
            .bind(year_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(deleted)
    }
}
