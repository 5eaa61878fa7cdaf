//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! fee ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built students, catalogs and timestamps
//! - `builders`: Builder patterns for test data and a wired-up service harness
//! - `database`: PostgreSQL container management for adapter tests
//! - `assertions`: Ledger invariant and status assertions
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
