//! Ledger service facade
//!
//! [`LedgerService`] wires the pure engines (reconcile, allocate, adjust) to
//! the ports. Every mutation goes through one [`AccountTransaction`], and
//! notifications go out only after the commit succeeded.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use core_kernel::{Clock, StudentId, SystemClock, YearId};

use crate::account::{LedgerAccount, LedgerKey};
use crate::adjustment::{apply_changes, Adjustment, AdjustmentRequest};
use crate::catalog::{CustomFee, FeeCatalog, Student};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::fanout::{AssignReport, FanOutCoordinator, SyncReport};
use crate::notification::{dispatch, NotificationEvent};
use crate::payment::{allocate, PaymentRequest, Transaction};
use crate::ports::{JournalRecord, LedgerStore, Notifier, ReferenceData};
use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::store::{AccountTransaction, Mutation};

/// Entry point for every ledger operation
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    reference: Arc<dyn ReferenceData>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        reference: Arc<dyn ReferenceData>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            reference,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reference_data(&self) -> &Arc<dyn ReferenceData> {
        &self.reference
    }

    fn transaction(&self) -> AccountTransaction<'_> {
        AccountTransaction::new(self.store.as_ref(), self.config.max_conflict_retries)
    }

    /// Returns the stored ledger
    #[instrument(skip(self))]
    pub async fn get_ledger(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<LedgerAccount, LedgerError> {
        let key = LedgerKey::new(student_id.clone(), year_id.clone());
        self.store
            .load(&key)
            .await?
            .map(|stored| stored.account)
            .ok_or_else(|| LedgerError::not_found(student_id, year_id))
    }

    /// Fetches the student and catalog, then brings the ledger in line
    #[instrument(skip(self))]
    pub async fn reconcile_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<LedgerAccount, LedgerError> {
        let student = self.reference.get_student(student_id).await.map_err(|e| {
            if e.is_not_found() {
                LedgerError::StudentNotFound(student_id.clone())
            } else {
                e.into()
            }
        })?;
        student.validate()?;
        let catalog = self.load_catalog(year_id).await?;
        Ok(self.reconcile_with(&student, &catalog).await?.account)
    }

    /// Loads and validates a year's catalog
    pub async fn load_catalog(&self, year_id: &YearId) -> Result<FeeCatalog, LedgerError> {
        let catalog = self.reference.fee_catalog(year_id).await?;
        if &catalog.year_id != year_id {
            return Err(LedgerError::validation(format!(
                "catalog for {} was requested but {} was returned",
                year_id, catalog.year_id
            )));
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reconciles one student against an already loaded catalog.
    ///
    /// Writes only when the merge changed something.
    #[instrument(skip(self, student, catalog), fields(student_id = %student.id, year_id = %catalog.year_id))]
    pub async fn reconcile_with(
        &self,
        student: &Student,
        catalog: &FeeCatalog,
    ) -> Result<ReconcileOutcome, LedgerError> {
        student.validate()?;
        let key = LedgerKey::new(student.id.clone(), catalog.year_id.clone());
        let now = self.clock.now();

        let outcome = self
            .transaction()
            .run(&key, |current| {
                let mutation = reconcile(student, catalog, current.as_ref(), now).map(|outcome| {
                    if outcome.changed {
                        Mutation::Write {
                            account: outcome.account.clone(),
                            journal: None,
                            output: outcome,
                        }
                    } else {
                        Mutation::Skip(outcome)
                    }
                });
                async move { mutation }
            })
            .await?;

        if outcome.changed {
            info!(
                total_fee = outcome.account.total_fee.minor(),
                items = outcome.account.items.len(),
                created = outcome.created,
                "Ledger reconciled"
            );
        } else {
            debug!("Ledger already up to date");
        }
        Ok(outcome)
    }

    /// Records a payment and spreads it over the ledger's items.
    ///
    /// A request whose reference was already recorded on this ledger returns
    /// the earlier transaction without applying anything.
    #[instrument(skip(self, request), fields(
        student_id = %request.student_id,
        year_id = %request.year_id,
        amount = request.amount.minor(),
        method = ?request.method,
    ))]
    pub async fn apply_payment(&self, request: PaymentRequest) -> Result<Transaction, LedgerError> {
        request.validate()?;
        let key = request.key();
        let now = self.clock.now();

        let (transaction, applied) = self
            .transaction()
            .run(&key, |current| {
                let store = Arc::clone(&self.store);
                let key = key.clone();
                let request = request.clone();
                async move {
                    let mut account = current
                        .ok_or_else(|| LedgerError::not_found(&key.student_id, &key.year_id))?;

                    if let Some(reference) = &request.reference {
                        if let Some(existing) =
                            store.find_transaction_by_reference(&key, reference).await?
                        {
                            return Ok(Mutation::Skip((existing, false)));
                        }
                    }

                    let allocation = allocate(&mut account, request.amount)?;
                    account.updated_at = now;
                    let transaction = request.into_transaction(allocation, now);
                    Ok::<_, LedgerError>(Mutation::Write {
                        account,
                        journal: Some(JournalRecord::Payment(transaction.clone())),
                        output: (transaction, true),
                    })
                }
            })
            .await?;

        if applied {
            info!(transaction_id = %transaction.id, "Payment recorded");
            dispatch(
                self.notifier.as_ref(),
                NotificationEvent::for_payment(&transaction),
            )
            .await;
        } else {
            info!(transaction_id = %transaction.id, "Payment reference already recorded");
        }
        Ok(transaction)
    }

    /// Applies a batch of discounts and overrides, all or nothing
    ///
    /// A batch naming no item on the ledger writes, journals and notifies nothing.
    #[instrument(skip(self, request), fields(
        student_id = %request.student_id,
        year_id = %request.year_id,
        actor = %request.actor.id,
        role = %request.actor.role,
    ))]
    pub async fn apply_adjustments(
        &self,
        request: AdjustmentRequest,
    ) -> Result<Adjustment, LedgerError> {
        request.validate()?;
        let key = request.key();
        let now = self.clock.now();

        let adjustment = self
            .transaction()
            .run(&key, |current| {
                let result = current
                    .ok_or_else(|| LedgerError::not_found(&request.student_id, &request.year_id))
                    .and_then(|mut account| {
                        let changes = apply_changes(&mut account, &request.changes)?;
                        let adjustment = Adjustment::from_request(&request, changes, now);
                        if adjustment.changes.is_empty() {
                            return Ok(Mutation::Skip(adjustment));
                        }
                        account.updated_at = now;
                        Ok(Mutation::Write {
                            account,
                            journal: Some(JournalRecord::Adjustment(adjustment.clone())),
                            output: adjustment,
                        })
                    });
                async move { result }
            })
            .await?;

        if adjustment.changes.is_empty() {
            debug!("No requested item is on the ledger, nothing adjusted");
            return Ok(adjustment);
        }
        info!(
            adjustment_id = %adjustment.id,
            changes = adjustment.changes.len(),
            net_change = adjustment.net_change().minor(),
            "Adjustment applied"
        );
        dispatch(
            self.notifier.as_ref(),
            NotificationEvent::for_adjustment(&adjustment),
        )
        .await;
        Ok(adjustment)
    }

    /// Adds a custom fee item to one student's ledger unless it is already there.
    ///
    /// A student without a ledger gets a new one holding just this item.
    /// Returns true if the item was added.
    #[instrument(skip(self, student, fee), fields(student_id = %student.id, fee_id = %fee.id))]
    pub async fn append_custom_fee(
        &self,
        student: &Student,
        year_id: &YearId,
        fee: &CustomFee,
    ) -> Result<bool, LedgerError> {
        let key = LedgerKey::new(student.id.clone(), year_id.clone());
        let item_id = fee.item_id();
        let now = self.clock.now();

        let added = self
            .transaction()
            .run(&key, |current| {
                let mutation = match current {
                    Some(account) if account.contains_item(&item_id) => Ok(Mutation::Skip(false)),
                    existing => {
                        let mut account =
                            existing.unwrap_or_else(|| LedgerAccount::new(key.clone(), now));
                        account.insert_item(fee.to_item()).map(|()| {
                            account.updated_at = now;
                            Mutation::Write {
                                account,
                                journal: None,
                                output: true,
                            }
                        })
                    }
                };
                async move { mutation }
            })
            .await?;

        if added {
            info!(amount = fee.amount.minor(), "Custom fee added to ledger");
        } else {
            debug!("Custom fee already on ledger");
        }
        Ok(added)
    }

    /// Payment history for a student, oldest first
    #[instrument(skip(self))]
    pub async fn payment_history(
        &self,
        student_id: &StudentId,
        year_id: Option<&YearId>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions_for_student(student_id, year_id).await?)
    }

    /// Adjustment history for a student, oldest first
    #[instrument(skip(self))]
    pub async fn adjustment_history(
        &self,
        student_id: &StudentId,
        year_id: Option<&YearId>,
    ) -> Result<Vec<Adjustment>, LedgerError> {
        Ok(self.store.adjustments_for_student(student_id, year_id).await?)
    }

    /// Deletes all ledgers and journals of an academic year
    #[instrument(skip(self))]
    pub async fn purge_year(&self, year_id: &YearId) -> Result<u64, LedgerError> {
        let deleted = self.store.purge_year(year_id).await?;
        info!(deleted, "Academic year purged");
        Ok(deleted)
    }

    /// Reconciles every active student for the year
    pub async fn sync_population(&self, year_id: &YearId) -> Result<SyncReport, LedgerError> {
        FanOutCoordinator::new(self.clone())
            .sync_population(year_id)
            .await
    }

    /// Adds a custom fee to every active student it targets
    pub async fn assign_custom_fee(
        &self,
        fee: &CustomFee,
        year_id: &YearId,
    ) -> Result<AssignReport, LedgerError> {
        FanOutCoordinator::new(self.clone())
            .assign_custom_fee(fee, year_id)
            .await
    }
}
