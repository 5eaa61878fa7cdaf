//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.
//!
//! [`TestHarnessBuilder`] wires a [`LedgerService`] to in-memory adapters, a
//! recording notifier and a frozen clock.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use core_kernel::{ClassId, FeeId, FixedClock, Money, StudentId, TermId, VillageId, YearId};
use domain_ledger::ports::memory::{InMemoryLedgerStore, InMemoryReferenceData};
use domain_ledger::ports::mock::{FaultyLedgerStore, RecordingNotifier};
use domain_ledger::{
    ChargeItem, ChargeItemId, ChargeKind, CustomFee, EngineConfig, FeeCatalog, FeeTarget,
    LedgerAccount, LedgerKey, LedgerService, Student, TermFee, TransportTable,
};

use crate::fixtures::{CatalogFixtures, IdFixtures, StudentFixtures, TemporalFixtures};

/// Builder for constructing test students
pub struct TestStudentBuilder {
    student: Student,
}

impl Default for TestStudentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStudentBuilder {
    /// An active C1 day scholar in V1
    pub fn new() -> Self {
        Self {
            student: StudentFixtures::day_scholar(1),
        }
    }

    pub fn with_id(mut self, id: impl Into<StudentId>) -> Self {
        self.student.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.student.name = name.into();
        self
    }

    pub fn with_class(mut self, class_id: impl Into<ClassId>) -> Self {
        self.student.class_id = Some(class_id.into());
        self
    }

    pub fn without_class(mut self) -> Self {
        self.student.class_id = None;
        self
    }

    pub fn with_village(mut self, village_id: impl Into<VillageId>) -> Self {
        self.student.village_id = Some(village_id.into());
        self
    }

    pub fn without_village(mut self) -> Self {
        self.student.village_id = None;
        self
    }

    /// Sets whether the student rides the school bus
    pub fn with_transport(mut self, uses_transport: bool) -> Self {
        self.student.uses_transport = uses_transport;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.student.is_active = false;
        self
    }

    pub fn build(self) -> Student {
        self.student
    }
}

/// Builder for constructing fee catalogs
pub struct TestCatalogBuilder {
    catalog: FeeCatalog,
}

impl Default for TestCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCatalogBuilder {
    /// An empty catalog for the fixture year
    pub fn new() -> Self {
        Self {
            catalog: FeeCatalog::new(IdFixtures::year()),
        }
    }

    /// Starts from [`CatalogFixtures::standard`]
    pub fn standard() -> Self {
        Self {
            catalog: CatalogFixtures::standard(),
        }
    }

    pub fn with_year(mut self, year_id: impl Into<YearId>) -> Self {
        self.catalog.year_id = year_id.into();
        self
    }

    /// Adds an active term priced per class
    pub fn with_term(
        mut self,
        id: impl Into<TermId>,
        name: impl Into<String>,
        amounts: &[(&str, i64)],
    ) -> Self {
        self.catalog.terms.push(TermFee {
            id: id.into(),
            name: name.into(),
            due_date: Some(TemporalFixtures::term1_due()),
            amounts: amounts
                .iter()
                .map(|(class, minor)| (ClassId::new(*class), Money::from_minor(*minor)))
                .collect(),
            is_active: true,
        });
        self
    }

    pub fn with_term_fee(mut self, term: TermFee) -> Self {
        self.catalog.terms.push(term);
        self
    }

    /// Deactivates a term already in the catalog
    pub fn deactivate_term(mut self, id: impl Into<TermId>) -> Self {
        let id = id.into();
        for term in self.catalog.terms.iter_mut().filter(|t| t.id == id) {
            term.is_active = false;
        }
        self
    }

    /// Changes one class price of a term already in the catalog
    pub fn reprice_term(mut self, id: impl Into<TermId>, class: &str, minor: i64) -> Self {
        let id = id.into();
        for term in self.catalog.terms.iter_mut().filter(|t| t.id == id) {
            term.amounts.insert(ClassId::new(class), Money::from_minor(minor));
        }
        self
    }

    pub fn with_custom_fee(mut self, fee: CustomFee) -> Self {
        self.catalog.custom_fees.push(fee);
        self
    }

    /// Prices transport per village
    pub fn with_transport(mut self, amounts: &[(&str, i64)]) -> Self {
        self.catalog.transport = TransportTable {
            due_date: Some(TemporalFixtures::transport_due()),
            amounts: amounts
                .iter()
                .map(|(village, minor)| (VillageId::new(*village), Money::from_minor(*minor)))
                .collect(),
        };
        self
    }

    pub fn without_transport(mut self) -> Self {
        self.catalog.transport = TransportTable::default();
        self
    }

    pub fn build(self) -> FeeCatalog {
        self.catalog
    }
}

/// Builder for constructing custom fees
pub struct TestCustomFeeBuilder {
    fee: CustomFee,
}

impl Default for TestCustomFeeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCustomFeeBuilder {
    /// Starts from [`CatalogFixtures::exam_fee`]
    pub fn new() -> Self {
        Self {
            fee: CatalogFixtures::exam_fee(),
        }
    }

    pub fn with_id(mut self, id: impl Into<FeeId>) -> Self {
        self.fee.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.fee.name = name.into();
        self
    }

    pub fn with_amount(mut self, minor: i64) -> Self {
        self.fee.amount = Money::from_minor(minor);
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.fee.due_date = Some(due_date);
        self
    }

    pub fn for_classes(mut self, classes: &[&str]) -> Self {
        self.fee.target = FeeTarget::Classes(classes.iter().map(|c| ClassId::new(*c)).collect());
        self
    }

    pub fn for_villages(mut self, villages: &[&str]) -> Self {
        self.fee.target =
            FeeTarget::Villages(villages.iter().map(|v| VillageId::new(*v)).collect());
        self
    }

    pub fn for_students(mut self, students: &[StudentId]) -> Self {
        self.fee.target = FeeTarget::Students(students.to_vec());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.fee.is_active = false;
        self
    }

    pub fn build(self) -> CustomFee {
        self.fee
    }
}

/// Builder for ledgers in a given state, bypassing the service
pub struct TestLedgerBuilder {
    account: LedgerAccount,
}

impl Default for TestLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLedgerBuilder {
    /// An empty ledger for student 1 in the fixture year
    pub fn new() -> Self {
        Self {
            account: LedgerAccount::new(
                LedgerKey::new(IdFixtures::student(1), IdFixtures::year()),
                TemporalFixtures::year_start(),
            ),
        }
    }

    pub fn for_student(mut self, student_id: impl Into<StudentId>) -> Self {
        self.account.student_id = student_id.into();
        self
    }

    pub fn with_year(mut self, year_id: impl Into<YearId>) -> Self {
        self.account.year_id = year_id.into();
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.account.created_at = at;
        self.account.updated_at = at;
        self
    }

    /// Adds an item with `paid` already applied to it
    pub fn with_item(mut self, id: &str, kind: ChargeKind, amount: i64, paid: i64) -> Self {
        let mut item = ChargeItem::new(
            ChargeItemId::new(id),
            kind,
            id,
            None,
            Money::from_minor(amount),
        );
        item.paid_amount = Money::from_minor(paid);
        item.refresh_status();
        self.account.total_paid += item.paid_amount;
        self.account
            .insert_item(item)
            .expect("test ledger amounts fit in Money");
        self
    }

    pub fn with_term_item(self, term: &str, amount: i64, paid: i64) -> Self {
        let id = ChargeItemId::term(&TermId::new(term));
        self.with_item(id.as_str(), ChargeKind::Term, amount, paid)
    }

    pub fn with_transport_item(self, amount: i64, paid: i64) -> Self {
        let id = ChargeItemId::transport();
        self.with_item(id.as_str(), ChargeKind::Transport, amount, paid)
    }

    pub fn build(self) -> LedgerAccount {
        self.account
    }
}

/// A service wired to inspectable test doubles
#[derive(Clone)]
pub struct TestHarness {
    pub service: LedgerService,
    pub store: FaultyLedgerStore,
    pub reference: InMemoryReferenceData,
    pub notifier: RecordingNotifier,
    pub clock: Arc<FixedClock>,
}

impl TestHarness {
    /// Standard catalog plus the given students
    pub async fn with_students(students: Vec<Student>) -> Self {
        TestHarnessBuilder::new().with_students(students).build().await
    }

    /// The fixture year
    pub fn year(&self) -> YearId {
        IdFixtures::year()
    }

    /// Loads a ledger straight from the store, bypassing the service
    pub async fn stored_ledger(&self, student_id: &StudentId) -> Option<LedgerAccount> {
        use domain_ledger::LedgerStore;
        self.store
            .load(&LedgerKey::new(student_id.clone(), self.year()))
            .await
            .ok()
            .flatten()
            .map(|stored| stored.account)
    }

    /// Version of a stored ledger
    pub async fn stored_version(&self, student_id: &StudentId) -> Option<u64> {
        use domain_ledger::LedgerStore;
        self.store
            .load(&LedgerKey::new(student_id.clone(), self.year()))
            .await
            .ok()
            .flatten()
            .map(|stored| stored.version)
    }
}

/// Builder for [`TestHarness`]
pub struct TestHarnessBuilder {
    students: Vec<Student>,
    catalogs: Vec<FeeCatalog>,
    config: EngineConfig,
    now: DateTime<Utc>,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarnessBuilder {
    /// No students, the standard catalog, default engine config
    pub fn new() -> Self {
        Self {
            students: Vec::new(),
            catalogs: vec![CatalogFixtures::standard()],
            config: EngineConfig::default(),
            now: TemporalFixtures::year_start(),
        }
    }

    pub fn with_student(mut self, student: Student) -> Self {
        self.students.push(student);
        self
    }

    pub fn with_students(mut self, students: impl IntoIterator<Item = Student>) -> Self {
        self.students.extend(students);
        self
    }

    /// Replaces any catalog for the same year
    pub fn with_catalog(mut self, catalog: FeeCatalog) -> Self {
        self.catalogs.retain(|c| c.year_id != catalog.year_id);
        self.catalogs.push(catalog);
        self
    }

    pub fn without_catalogs(mut self) -> Self {
        self.catalogs.clear();
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub async fn build(self) -> TestHarness {
        let store = FaultyLedgerStore::new(InMemoryLedgerStore::new());
        let reference = InMemoryReferenceData::with_data(self.students, self.catalogs).await;
        let notifier = RecordingNotifier::new();
        let clock = Arc::new(FixedClock::new(self.now));

        let service = LedgerService::new(
            Arc::new(store.clone()),
            Arc::new(reference.clone()),
            Arc::new(notifier.clone()),
            self.config,
        )
        .with_clock(clock.clone());

        TestHarness {
            service,
            store,
            reference,
            notifier,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger::ItemStatus;

    #[test]
    fn test_ledger_builder_keeps_totals_consistent() {
        let ledger = TestLedgerBuilder::new()
            .with_transport_item(1_000, 0)
            .with_term_item("T1", 5_000, 2_000)
            .build();

        assert!(ledger.invariant_violations().is_empty());
        assert_eq!(ledger.total_fee, Money::from_minor(6_000));
        assert_eq!(ledger.total_paid, Money::from_minor(2_000));
        assert_eq!(ledger.items[0].kind, ChargeKind::Term);
        assert_eq!(ledger.items[0].status, ItemStatus::Partial);
    }

    #[test]
    fn test_catalog_builder_reprices_existing_term() {
        let catalog = TestCatalogBuilder::standard()
            .reprice_term("T1", "C1", 1)
            .build();
        let term = catalog.terms.iter().find(|t| t.id.as_str() == "T1").unwrap();
        assert_eq!(term.amount_for(&ClassId::new("C1")), Money::from_minor(1));
    }

    #[tokio::test]
    async fn test_harness_starts_empty() {
        let harness = TestHarness::with_students(StudentFixtures::population(3)).await;
        assert_eq!(harness.store.inner().ledger_count().await, 0);
        assert!(harness.notifier.events().await.is_empty());
    }
}
