//! Batch Jobs
//!
//! This crate hosts the `fee-sync` job, which brings every active student's
//! ledger for one academic year in line with the fee catalog.
//!
//! # Architecture
//!
//! - **Config**: `FEE_*` environment variables over built-in defaults
//! - **Snapshot**: students and catalogs read from a JSON export
//! - **Runner**: store selection, service wiring, and the sync itself
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_jobs::{config::JobConfig, runner, snapshot::SnapshotReferenceData};
//!
//! let config = JobConfig::from_env()?;
//! let reference = Arc::new(SnapshotReferenceData::load(&config.snapshot_path).await?);
//! let store = runner::open_store(&config).await?;
//! let service = runner::build_service(&config, store, reference);
//! let report = runner::run_sync(service, &config, cancel_rx).await?;
//! ```

pub mod config;
pub mod error;
pub mod runner;
pub mod snapshot;

pub use config::JobConfig;
pub use error::JobError;
pub use snapshot::{SnapshotDocument, SnapshotReferenceData};
