//! Ports for the Ledger Domain
//!
//! The ledger engines talk to three collaborators, each behind an async port:
//!
//! - [`LedgerStore`]: versioned persistence of ledgers plus the append-only
//!   transaction and adjustment journals
//! - [`ReferenceData`]: read-only students and fee catalogs owned by the
//!   master-data system
//! - [`Notifier`]: best-effort delivery of notify events
//!
//! # Optimistic concurrency
//!
//! Every stored ledger carries a version. A [`LedgerCommit`] names the version
//! it was computed from; the store applies it only if that is still the
//! current version and fails with [`PortError::Conflict`] otherwise. The
//! ledger row and its journal record are written atomically.
//!
//! # Adapters
//!
//! - [`memory`]: tokio `RwLock` maps, used by tests and by the batch job when
//!   no database is configured
//! - `infra_db::PostgresLedgerStore`: PostgreSQL via `sqlx`
//! - [`mock`] (feature `mock`): recording and fault-injecting test doubles

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{
    ClassId, DomainPort, HealthCheckable, PortError, StudentId, VillageId, YearId,
};

use crate::account::{LedgerAccount, LedgerKey};
use crate::adjustment::Adjustment;
use crate::catalog::{FeeCatalog, FeeTarget, Student};
use crate::notification::NotificationEvent;
use crate::payment::Transaction;

/// A ledger together with its storage version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLedger {
    pub account: LedgerAccount,
    pub version: u64,
}

/// Journal entry written in the same commit as a ledger change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalRecord {
    Payment(Transaction),
    Adjustment(Adjustment),
}

/// An atomic compare-and-swap of one ledger
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub key: LedgerKey,
    /// Version the new state was computed from; `None` creates the ledger
    pub expected_version: Option<u64>,
    pub account: LedgerAccount,
    pub journal: Option<JournalRecord>,
}

/// Versioned storage of ledgers and their journals
#[async_trait]
pub trait LedgerStore: DomainPort + HealthCheckable {
    /// Loads a ledger and its current version
    async fn load(&self, key: &LedgerKey) -> Result<Option<StoredLedger>, PortError>;

    /// Writes the ledger and journal record atomically.
    ///
    /// # Returns
    ///
    /// The new version, or `PortError::Conflict` if the stored version is not
    /// `expected_version` (or the ledger already exists on create)
    async fn commit(&self, commit: LedgerCommit) -> Result<u64, PortError>;

    /// Finds a payment on this ledger by its gateway/receipt reference
    async fn find_transaction_by_reference(
        &self,
        key: &LedgerKey,
        reference: &str,
    ) -> Result<Option<Transaction>, PortError>;

    /// Payments for a student, oldest first, optionally limited to one year
    async fn transactions_for_student(
        &self,
        student_id: &StudentId,
        year_id: Option<&YearId>,
    ) -> Result<Vec<Transaction>, PortError>;

    /// Adjustments for a student, oldest first, optionally limited to one year
    async fn adjustments_for_student(
        &self,
        student_id: &StudentId,
        year_id: Option<&YearId>,
    ) -> Result<Vec<Adjustment>, PortError>;

    /// Deletes every ledger, transaction and adjustment of a year
    ///
    /// # Returns
    ///
    /// The number of ledgers deleted
    async fn purge_year(&self, year_id: &YearId) -> Result<u64, PortError>;
}

/// Filter for listing students.
///
/// Each non-empty id list must match; results are ordered by student id so
/// that `limit`/`offset` paging is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentQuery {
    pub class_ids: Vec<ClassId>,
    pub village_ids: Vec<VillageId>,
    pub student_ids: Vec<StudentId>,
    pub active_only: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl StudentQuery {
    /// Every active student
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    /// Active students a custom fee targets
    pub fn for_target(target: &FeeTarget) -> Self {
        let mut query = Self::active();
        match target {
            FeeTarget::Classes(ids) => query.class_ids = ids.clone(),
            FeeTarget::Villages(ids) => query.village_ids = ids.clone(),
            FeeTarget::Students(ids) => query.student_ids = ids.clone(),
        }
        query
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// True if the student passes every filter (paging aside)
    pub fn matches(&self, student: &Student) -> bool {
        if self.active_only && !student.is_active {
            return false;
        }
        if !self.class_ids.is_empty()
            && !student
                .class_id
                .as_ref()
                .map_or(false, |id| self.class_ids.contains(id))
        {
            return false;
        }
        if !self.village_ids.is_empty()
            && !student
                .village_id
                .as_ref()
                .map_or(false, |id| self.village_ids.contains(id))
        {
            return false;
        }
        if !self.student_ids.is_empty() && !self.student_ids.contains(&student.id) {
            return false;
        }
        true
    }

    /// Filters, sorts by id and pages an in-memory student list
    pub fn apply<'a>(&self, students: impl IntoIterator<Item = &'a Student>) -> Vec<Student> {
        let mut matched: Vec<Student> = students
            .into_iter()
            .filter(|s| self.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Read-only master data
#[async_trait]
pub trait ReferenceData: DomainPort {
    /// Returns the student, or `PortError::NotFound`
    async fn get_student(&self, id: &StudentId) -> Result<Student, PortError>;

    /// Lists students matching the query, ordered by id
    async fn find_students(&self, query: &StudentQuery) -> Result<Vec<Student>, PortError>;

    /// Returns the fee catalog of a year, or `PortError::NotFound`
    async fn fee_catalog(&self, year_id: &YearId) -> Result<FeeCatalog, PortError>;
}

/// Outbound notifications
#[async_trait]
pub trait Notifier: DomainPort {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PortError>;
}

/// Emits every notification as a structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl DomainPort for TracingNotifier {}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PortError> {
        info!(
            target: "fee_notifications",
            target_kind = ?event.target_kind,
            target_id = %event.target_id,
            title = %event.title,
            metadata = %event.metadata,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// In-memory adapters
pub mod memory {
    use super::*;
    use chrono::Utc;
    use core_kernel::{AdapterHealth, HealthCheckResult};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct MemoryState {
        ledgers: HashMap<LedgerKey, StoredLedger>,
        transactions: Vec<Transaction>,
        adjustments: Vec<Adjustment>,
    }

    /// Ledger store backed by process memory
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryLedgerStore {
        state: Arc<RwLock<MemoryState>>,
    }

    impl InMemoryLedgerStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of ledgers currently stored
        pub async fn ledger_count(&self) -> usize {
            self.state.read().await.ledgers.len()
        }

        /// All stored ledgers, in no particular order
        pub async fn ledgers(&self) -> Vec<LedgerAccount> {
            self.state
                .read()
                .await
                .ledgers
                .values()
                .map(|stored| stored.account.clone())
                .collect()
        }
    }

    impl DomainPort for InMemoryLedgerStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryLedgerStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "in-memory-ledger-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: None,
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for InMemoryLedgerStore {
        async fn load(&self, key: &LedgerKey) -> Result<Option<StoredLedger>, PortError> {
            Ok(self.state.read().await.ledgers.get(key).cloned())
        }

        async fn commit(&self, commit: LedgerCommit) -> Result<u64, PortError> {
            let mut state = self.state.write().await;

            if let Some(JournalRecord::Payment(tx)) = &commit.journal {
                if let Some(reference) = &tx.reference {
                    let duplicate = state.transactions.iter().any(|existing| {
                        existing.key() == commit.key
                            && existing.reference.as_deref() == Some(reference.as_str())
                    });
                    if duplicate {
                        return Err(PortError::conflict(format!(
                            "payment reference {} already recorded on {}",
                            reference, commit.key
                        )));
                    }
                }
            }

            let current = state.ledgers.get(&commit.key).map(|stored| stored.version);
            let version = match (commit.expected_version, current) {
                (None, None) => 1,
                (Some(expected), Some(current)) if expected == current => current + 1,
                (expected, current) => {
                    return Err(PortError::conflict(format!(
                        "ledger {} expected version {:?}, found {:?}",
                        commit.key, expected, current
                    )))
                }
            };

            state.ledgers.insert(
                commit.key,
                StoredLedger {
                    account: commit.account,
                    version,
                },
            );
            match commit.journal {
                Some(JournalRecord::Payment(tx)) => state.transactions.push(tx),
                Some(JournalRecord::Adjustment(adj)) => state.adjustments.push(adj),
                None => {}
            }
            Ok(version)
        }

        async fn find_transaction_by_reference(
            &self,
            key: &LedgerKey,
            reference: &str,
        ) -> Result<Option<Transaction>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .transactions
                .iter()
                .find(|tx| &tx.key() == key && tx.reference.as_deref() == Some(reference))
                .cloned())
        }

        async fn transactions_for_student(
            &self,
            student_id: &StudentId,
            year_id: Option<&YearId>,
        ) -> Result<Vec<Transaction>, PortError> {
            let state = self.state.read().await;
            let mut found: Vec<Transaction> = state
                .transactions
                .iter()
                .filter(|tx| &tx.student_id == student_id)
                .filter(|tx| year_id.map_or(true, |year| &tx.year_id == year))
                .cloned()
                .collect();
            found.sort_by_key(|tx| tx.timestamp);
            Ok(found)
        }

        async fn adjustments_for_student(
            &self,
            student_id: &StudentId,
            year_id: Option<&YearId>,
        ) -> Result<Vec<Adjustment>, PortError> {
            let state = self.state.read().await;
            let mut found: Vec<Adjustment> = state
                .adjustments
                .iter()
                .filter(|adj| &adj.student_id == student_id)
                .filter(|adj| year_id.map_or(true, |year| &adj.year_id == year))
                .cloned()
                .collect();
            found.sort_by_key(|adj| adj.timestamp);
            Ok(found)
        }

        async fn purge_year(&self, year_id: &YearId) -> Result<u64, PortError> {
            let mut state = self.state.write().await;
            let before = state.ledgers.len();
            state.ledgers.retain(|key, _| &key.year_id != year_id);
            state.transactions.retain(|tx| &tx.year_id != year_id);
            state.adjustments.retain(|adj| &adj.year_id != year_id);
            Ok((before - state.ledgers.len()) as u64)
        }
    }

    /// Reference data held in memory
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryReferenceData {
        students: Arc<RwLock<HashMap<StudentId, Student>>>,
        catalogs: Arc<RwLock<HashMap<YearId, FeeCatalog>>>,
    }

    impl InMemoryReferenceData {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates students and catalogs
        pub async fn with_data(students: Vec<Student>, catalogs: Vec<FeeCatalog>) -> Self {
            let data = Self::new();
            for student in students {
                data.upsert_student(student).await;
            }
            for catalog in catalogs {
                data.upsert_catalog(catalog).await;
            }
            data
        }

        pub async fn upsert_student(&self, student: Student) {
            self.students.write().await.insert(student.id.clone(), student);
        }

        pub async fn upsert_catalog(&self, catalog: FeeCatalog) {
            self.catalogs
                .write()
                .await
                .insert(catalog.year_id.clone(), catalog);
        }
    }

    impl DomainPort for InMemoryReferenceData {}

    #[async_trait]
    impl ReferenceData for InMemoryReferenceData {
        async fn get_student(&self, id: &StudentId) -> Result<Student, PortError> {
            self.students
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Student", id))
        }

        async fn find_students(&self, query: &StudentQuery) -> Result<Vec<Student>, PortError> {
            Ok(query.apply(self.students.read().await.values()))
        }

        async fn fee_catalog(&self, year_id: &YearId) -> Result<FeeCatalog, PortError> {
            self.catalogs
                .read()
                .await
                .get(year_id)
                .cloned()
                .ok_or_else(|| PortError::not_found("FeeCatalog", year_id))
        }
    }
}

/// Test doubles
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use core_kernel::HealthCheckResult;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use super::memory::InMemoryLedgerStore;

    /// Records every notification; can be switched to fail
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        events: Arc<RwLock<Vec<NotificationEvent>>>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// A notifier whose deliveries all fail
        pub fn failing() -> Self {
            let notifier = Self::new();
            notifier.set_failing(true);
            notifier
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Events delivered so far
        pub async fn events(&self) -> Vec<NotificationEvent> {
            self.events.read().await.clone()
        }
    }

    impl DomainPort for RecordingNotifier {}

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &NotificationEvent) -> Result<(), PortError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PortError::ServiceUnavailable {
                    service: "notifications".to_string(),
                });
            }
            self.events.write().await.push(event.clone());
            Ok(())
        }
    }

    /// Wraps an in-memory store and injects commit failures
    #[derive(Debug, Clone, Default)]
    pub struct FaultyLedgerStore {
        inner: InMemoryLedgerStore,
        failing_students: Arc<RwLock<HashSet<StudentId>>>,
        conflicts_remaining: Arc<AtomicU32>,
    }

    impl FaultyLedgerStore {
        pub fn new(inner: InMemoryLedgerStore) -> Self {
            Self {
                inner,
                ..Self::default()
            }
        }

        /// Every commit for this student fails with a connection error
        pub async fn fail_commits_for(&self, student_id: StudentId) {
            self.failing_students.write().await.insert(student_id);
        }

        pub async fn heal(&self, student_id: &StudentId) {
            self.failing_students.write().await.remove(student_id);
        }

        /// The next `count` commits fail with a version conflict
        pub fn inject_conflicts(&self, count: u32) {
            self.conflicts_remaining.store(count, Ordering::SeqCst);
        }

        pub fn inner(&self) -> &InMemoryLedgerStore {
            &self.inner
        }
    }

    impl DomainPort for FaultyLedgerStore {}

    #[async_trait]
    impl HealthCheckable for FaultyLedgerStore {
        async fn health_check(&self) -> HealthCheckResult {
            self.inner.health_check().await
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyLedgerStore {
        async fn load(&self, key: &LedgerKey) -> Result<Option<StoredLedger>, PortError> {
            self.inner.load(key).await
        }

        async fn commit(&self, commit: LedgerCommit) -> Result<u64, PortError> {
            if self
                .failing_students
                .read()
                .await
                .contains(&commit.key.student_id)
            {
                return Err(PortError::connection("injected commit failure"));
            }
            let injected = self
                .conflicts_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(PortError::conflict("injected version conflict"));
            }
            self.inner.commit(commit).await
        }

        async fn find_transaction_by_reference(
            &self,
            key: &LedgerKey,
            reference: &str,
        ) -> Result<Option<Transaction>, PortError> {
            self.inner.find_transaction_by_reference(key, reference).await
        }

        async fn transactions_for_student(
            &self,
            student_id: &StudentId,
            year_id: Option<&YearId>,
        ) -> Result<Vec<Transaction>, PortError> {
            self.inner.transactions_for_student(student_id, year_id).await
        }

        async fn adjustments_for_student(
            &self,
            student_id: &StudentId,
            year_id: Option<&YearId>,
        ) -> Result<Vec<Adjustment>, PortError> {
            self.inner.adjustments_for_student(student_id, year_id).await
        }

        async fn purge_year(&self, year_id: &YearId) -> Result<u64, PortError> {
            self.inner.purge_year(year_id).await
        }
    }
}
