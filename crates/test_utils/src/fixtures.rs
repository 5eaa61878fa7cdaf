//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the fee ledger: a standard school
//! year catalog, a handful of students, and fixed timestamps. Fixtures are
//! deterministic; use the builders for variations.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use fake::faker::name::en::Name;
use fake::Fake;
use std::collections::BTreeMap;

use core_kernel::{ClassId, FeeId, Money, StudentId, TermId, VillageId, YearId};
use domain_ledger::{CustomFee, FeeCatalog, FeeTarget, Student, TermFee, TransportTable};

/// Fixture for Money test data, in minor units
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Term 1 tuition for class C1
    pub fn term1_c1() -> Money {
        Money::from_minor(500_000)
    }

    /// Term 2 tuition for class C1
    pub fn term2_c1() -> Money {
        Money::from_minor(300_000)
    }

    /// Term 1 tuition for class C2
    pub fn term1_c2() -> Money {
        Money::from_minor(450_000)
    }

    /// Transport fee for village V1
    pub fn transport_v1() -> Money {
        Money::from_minor(120_000)
    }

    /// Exam fee charged to class C1
    pub fn exam_fee() -> Money {
        Money::from_minor(25_000)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Start of the 2024-25 school year
    pub fn year_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    /// Term 1 due date
    pub fn term1_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    }

    /// Term 2 due date
    pub fn term2_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 15).unwrap()
    }

    /// Transport fee due date
    pub fn transport_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()
    }
}

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn year() -> YearId {
        YearId::new("2024-25")
    }

    pub fn next_year() -> YearId {
        YearId::new("2025-26")
    }

    pub fn class_c1() -> ClassId {
        ClassId::new("C1")
    }

    pub fn class_c2() -> ClassId {
        ClassId::new("C2")
    }

    pub fn village_v1() -> VillageId {
        VillageId::new("V1")
    }

    pub fn village_v2() -> VillageId {
        VillageId::new("V2")
    }

    pub fn term1() -> TermId {
        TermId::new("T1")
    }

    pub fn term2() -> TermId {
        TermId::new("T2")
    }

    pub fn exam_fee() -> FeeId {
        FeeId::new("EXAM")
    }

    /// Zero-padded student id, so lexical order matches numeric order
    pub fn student(n: usize) -> StudentId {
        StudentId::new(format!("STU-{:04}", n))
    }
}

/// Fixture for students
pub struct StudentFixtures;

impl StudentFixtures {
    /// A random realistic name
    pub fn random_name() -> String {
        Name().fake()
    }

    /// Class C1, village V1, rides the bus
    pub fn bus_rider(n: usize) -> Student {
        Student {
            id: IdFixtures::student(n),
            name: Self::random_name(),
            class_id: Some(IdFixtures::class_c1()),
            village_id: Some(IdFixtures::village_v1()),
            uses_transport: true,
            is_active: true,
        }
    }

    /// Class C1, village V1, walks to school
    pub fn day_scholar(n: usize) -> Student {
        Student {
            uses_transport: false,
            ..Self::bus_rider(n)
        }
    }

    /// Class C2, village V2, no transport
    pub fn class_c2(n: usize) -> Student {
        Student {
            class_id: Some(IdFixtures::class_c2()),
            village_id: Some(IdFixtures::village_v2()),
            uses_transport: false,
            ..Self::bus_rider(n)
        }
    }

    /// A student the registrar has not placed in a class yet
    pub fn unassigned(n: usize) -> Student {
        Student {
            class_id: None,
            ..Self::bus_rider(n)
        }
    }

    /// `count` day scholars numbered from 1
    pub fn population(count: usize) -> Vec<Student> {
        (1..=count).map(Self::day_scholar).collect()
    }
}

/// Fixture for fee catalogs
pub struct CatalogFixtures;

impl CatalogFixtures {
    /// Term 1
    pub fn term1() -> TermFee {
        TermFee {
            id: IdFixtures::term1(),
            name: "Term 1 Tuition".to_string(),
            due_date: Some(TemporalFixtures::term1_due()),
            amounts: BTreeMap::from([
                (IdFixtures::class_c1(), MoneyFixtures::term1_c1()),
                (IdFixtures::class_c2(), MoneyFixtures::term1_c2()),
            ]),
            is_active: true,
        }
    }

    /// Term 2, priced for C1 only
    pub fn term2() -> TermFee {
        TermFee {
            id: IdFixtures::term2(),
            name: "Term 2 Tuition".to_string(),
            due_date: Some(TemporalFixtures::term2_due()),
            amounts: BTreeMap::from([(IdFixtures::class_c1(), MoneyFixtures::term2_c1())]),
            is_active: true,
        }
    }

    /// Exam fee for class C1
    pub fn exam_fee() -> CustomFee {
        CustomFee {
            id: IdFixtures::exam_fee(),
            name: "Board Exam Fee".to_string(),
            amount: MoneyFixtures::exam_fee(),
            due_date: None,
            target: FeeTarget::Classes(vec![IdFixtures::class_c1()]),
            is_active: true,
        }
    }

    /// Transport priced for V1 only
    pub fn transport() -> TransportTable {
        TransportTable {
            due_date: Some(TemporalFixtures::transport_due()),
            amounts: BTreeMap::from([(IdFixtures::village_v1(), MoneyFixtures::transport_v1())]),
        }
    }

    /// Two terms and transport, no custom fees
    pub fn standard() -> FeeCatalog {
        FeeCatalog {
            year_id: IdFixtures::year(),
            terms: vec![Self::term1(), Self::term2()],
            custom_fees: vec![],
            transport: Self::transport(),
        }
    }
}
