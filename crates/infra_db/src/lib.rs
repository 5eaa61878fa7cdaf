//! Infrastructure Database Layer
//!
//! This crate provides PostgreSQL persistence for the fee ledger using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: repositories own the SQL and
//! row types, and adapters implement the domain's ports on top of them.
//!
//! # Optimistic Concurrency
//!
//! Each ledger row carries a `version`. Writes name the version they read
//! and the `UPDATE ... WHERE version = $n` guard rejects stale writers, which
//! the domain sees as a retryable conflict.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/fees")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLedgerStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::PostgresLedgerStore;
