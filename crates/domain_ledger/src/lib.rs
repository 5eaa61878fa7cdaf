//! Ledger Domain - Student Fee Ledgers
//!
//! This crate tracks what each student owes for an academic year, records
//! payments and adjustments against that debt, and keeps the aggregate
//! numbers correct under concurrent writes and repeated re-computation.
//!
//! # Engines
//!
//! - **Catalog resolution** ([`resolve_candidates`]): which charges a student
//!   should carry under the current fee catalog
//! - **Reconciliation** ([`reconcile`]): merges the catalog's charges into a
//!   stored ledger without ever losing paid history
//! - **Payment allocation** ([`allocate`]): spreads a payment over items in
//!   ledger order, rejecting overpayment
//! - **Adjustments** ([`apply_changes`]): all-or-nothing discounts and
//!   overrides with an audit record
//! - **Fan-out** ([`FanOutCoordinator`]): population-wide sync and custom fee
//!   assignment with bounded concurrency
//!
//! All mutations go through [`LedgerService`], which runs them as versioned
//! read-modify-write transactions against a [`LedgerStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{LedgerService, PaymentRequest, PaymentMethod};
//!
//! let service = LedgerService::new(store, reference_data, notifier, EngineConfig::default());
//! service.reconcile_student(&student_id, &year_id).await?;
//!
//! let receipt = service
//!     .apply_payment(PaymentRequest::new(student_id, year_id, amount, PaymentMethod::Cash))
//!     .await?;
//! ```

pub mod account;
pub mod actor;
pub mod adjustment;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fanout;
pub mod notification;
pub mod payment;
pub mod ports;
pub mod reconcile;
pub mod service;
pub mod store;

pub use account::{
    ChargeItem, ChargeItemId, ChargeKind, ItemStatus, LedgerAccount, LedgerKey, LedgerStatus,
};
pub use actor::{Actor, ActorRole};
pub use adjustment::{
    apply_changes, plan_adjustments, Adjustment, AdjustmentChange, AdjustmentKind,
    AdjustmentRequest, ItemChange,
};
pub use catalog::{
    resolve_candidates, ChargeCandidate, CustomFee, FeeCatalog, FeeTarget, Student, TermFee,
    TransportTable,
};
pub use config::EngineConfig;
pub use error::LedgerError;
pub use fanout::{AssignReport, FanOutCoordinator, StudentFailure, SyncReport};
pub use notification::{NotificationEvent, NotifyTarget};
pub use payment::{
    allocate, plan_allocation, AllocationLine, PaymentMethod, PaymentRequest, Transaction,
    TransactionStatus,
};
pub use ports::{
    JournalRecord, LedgerCommit, LedgerStore, Notifier, ReferenceData, StoredLedger,
    StudentQuery, TracingNotifier,
};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use service::LedgerService;
pub use store::{AccountTransaction, Mutation};
