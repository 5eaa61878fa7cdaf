//! Repository implementations
//!
//! Repositories encapsulate SQL and map rows to plain row structs. Queries
//! are built at runtime with `sqlx::query` / `sqlx::query_as` so the crate
//! builds without a live database.

pub mod ledger;

pub use ledger::{AdjustmentRow, JournalRow, LedgerRepository, LedgerRow, TransactionRow};
