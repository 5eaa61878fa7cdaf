//! Core Kernel - Foundational types and utilities for the fee ledger
//!
//! This crate provides the building blocks shared by the ledger domain,
//! its storage adapters and the batch jobs:
//! - Money as exact integer minor units
//! - Strongly typed identifiers and master-data keys
//! - A clock abstraction for deterministic timestamps
//! - Port error and marker traits for hexagonal adapters

pub mod money;
pub mod clock;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, MoneyError, MINOR_UNIT_SCALE};
pub use clock::{Clock, SystemClock, FixedClock};
pub use identifiers::{
    TransactionId, AdjustmentId,
    StudentId, YearId, ClassId, VillageId, TermId, FeeId,
};
pub use error::CoreError;
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
