//! Reconciliation of a ledger against the current catalog
//!
//! [`reconcile`] is a pure merge: given a student, the catalog and the
//! ledger as stored, it returns the ledger as it should be. Anything a
//! student has paid towards is kept even if the catalog no longer lists it;
//! unpaid items follow the catalog. Running it twice yields the same result.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::account::{ChargeItem, ChargeItemId, LedgerAccount, LedgerKey};
use crate::catalog::{resolve_candidates, ChargeCandidate, FeeCatalog, Student};
use crate::error::LedgerError;

/// Result of merging a ledger with its candidates
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The merged ledger
    pub account: LedgerAccount,
    /// False when the merge reproduced the stored ledger exactly
    pub changed: bool,
    /// True when no ledger existed before
    pub created: bool,
}

/// Merges `existing` with the charges `catalog` prescribes for `student`.
///
/// Items come out grouped Term, Custom, Transport. Paid items the catalog no
/// longer lists keep their amounts and sit after the catalog's items of the
/// same kind, so payments reach them last within that kind.
///
/// When nothing changes, the returned account is identical to `existing`,
/// timestamps included. Fails with `Validation` if the merged amounts
/// overflow.
pub fn reconcile(
    student: &Student,
    catalog: &FeeCatalog,
    existing: Option<&LedgerAccount>,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, LedgerError> {
    student.validate()?;

    let candidates = resolve_candidates(student, catalog);
    let candidate_ids: HashSet<&ChargeItemId> = candidates.iter().map(|c| &c.id).collect();

    let previous: &[ChargeItem] = existing.map(|a| a.items.as_slice()).unwrap_or_default();

    // Paid items that the catalog no longer prescribes, in their previous order.
    let orphans: Vec<ChargeItem> = previous
        .iter()
        .filter(|item| item.has_payments() && !candidate_ids.contains(&item.id))
        .cloned()
        .collect();

    let mut retained: HashMap<&ChargeItemId, &ChargeItem> = previous
        .iter()
        .filter(|item| candidate_ids.contains(&item.id))
        .map(|item| (&item.id, item))
        .collect();

    let mut items: Vec<ChargeItem> = Vec::with_capacity(candidates.len() + orphans.len());
    for candidate in &candidates {
        let merged = match retained.remove(&candidate.id) {
            Some(item) if item.has_payments() => item.clone(),
            Some(item) => refreshed(item, candidate),
            None => candidate.clone().into_item(),
        };
        items.push(merged);
    }
    items.extend(orphans);
    // Stable: candidates stay ahead of orphans within each kind.
    items.sort_by_key(|item| item.kind);

    let key = LedgerKey::new(student.id.clone(), catalog.year_id.clone());
    let mut account = match existing {
        Some(account) => account.clone(),
        None => LedgerAccount::new(key, now),
    };
    account.items = items;
    account.recompute_totals()?;

    let changed = existing.map_or(true, |previous| !previous.same_content(&account));
    if changed {
        account.updated_at = now;
    }

    Ok(ReconcileOutcome {
        account,
        changed,
        created: existing.is_none(),
    })
}

/// Overwrites the catalog-owned fields of an unpaid item
fn refreshed(item: &ChargeItem, candidate: &ChargeCandidate) -> ChargeItem {
    let mut item = item.clone();
    item.name = candidate.name.clone();
    item.amount = candidate.amount;
    item.due_date = candidate.due_date;
    item.refresh_status();
    item
}
