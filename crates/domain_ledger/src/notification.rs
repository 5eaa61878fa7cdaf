//! Notification events emitted after ledger mutations
//!
//! Delivery belongs to an external broadcast system reached through the
//! [`Notifier`](crate::ports::Notifier) port. Events are sent only after the
//! ledger change has been committed, and a failed delivery never undoes it.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::actor::ActorRole;
use crate::adjustment::Adjustment;
use crate::payment::Transaction;
use crate::ports::Notifier;

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyTarget {
    /// A single student (and their guardians)
    Student,
    /// Everyone holding a role
    Role,
}

/// An abstract notify event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub target_kind: NotifyTarget,
    pub target_id: String,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl NotificationEvent {
    /// Receipt sent to the student who paid
    pub fn payment_recorded(transaction: &Transaction) -> Self {
        Self {
            target_kind: NotifyTarget::Student,
            target_id: transaction.student_id.to_string(),
            title: "Payment received".to_string(),
            message: format!(
                "A payment of {} has been recorded for {}.",
                transaction.amount, transaction.year_id
            ),
            metadata: json!({
                "transaction_id": transaction.id.to_string(),
                "amount": transaction.amount,
                "method": transaction.method,
                "reference": transaction.reference,
            }),
        }
    }

    /// Collection notice for administrators
    pub fn fees_collected(transaction: &Transaction) -> Self {
        Self {
            target_kind: NotifyTarget::Role,
            target_id: ActorRole::Admin.as_str().to_string(),
            title: "Fees collected".to_string(),
            message: format!(
                "Collected {} from student {}.",
                transaction.amount, transaction.student_id
            ),
            metadata: json!({
                "transaction_id": transaction.id.to_string(),
                "student_id": transaction.student_id,
                "year_id": transaction.year_id,
                "amount": transaction.amount,
            }),
        }
    }

    /// Tells the student their fees changed
    pub fn fees_adjusted(adjustment: &Adjustment) -> Self {
        Self {
            target_kind: NotifyTarget::Student,
            target_id: adjustment.student_id.to_string(),
            title: "Fees adjusted".to_string(),
            message: format!("Your fees for {} were adjusted: {}", adjustment.year_id, adjustment.reason),
            metadata: json!({
                "adjustment_id": adjustment.id.to_string(),
                "net_change": adjustment.net_change(),
                "items": adjustment.changes.iter().map(|c| c.item_id.as_str()).collect::<Vec<_>>(),
            }),
        }
    }

    /// Escalation to administrators when a constrained role changed fees
    pub fn adjustment_escalation(adjustment: &Adjustment) -> Self {
        Self {
            target_kind: NotifyTarget::Role,
            target_id: ActorRole::Admin.as_str().to_string(),
            title: "Fee adjustment needs review".to_string(),
            message: format!(
                "{} ({}) adjusted fees for student {}: {}",
                adjustment.performed_by,
                adjustment.performer_role,
                adjustment.student_id,
                adjustment.reason
            ),
            metadata: json!({
                "adjustment_id": adjustment.id.to_string(),
                "student_id": adjustment.student_id,
                "performed_by": adjustment.performed_by,
                "performer_role": adjustment.performer_role,
                "net_change": adjustment.net_change(),
            }),
        }
    }

    /// Events to send after a payment commits
    pub fn for_payment(transaction: &Transaction) -> Vec<Self> {
        vec![Self::payment_recorded(transaction), Self::fees_collected(transaction)]
    }

    /// Events to send after an adjustment commits
    pub fn for_adjustment(adjustment: &Adjustment) -> Vec<Self> {
        let mut events = vec![Self::fees_adjusted(adjustment)];
        if adjustment.performer_role.is_constrained() {
            events.push(Self::adjustment_escalation(adjustment));
        }
        events
    }
}

/// Sends every event, logging and swallowing failures
pub async fn dispatch(notifier: &dyn Notifier, events: Vec<NotificationEvent>) {
    for event in events {
        if let Err(error) = notifier.notify(&event).await {
            warn!(
                target_kind = ?event.target_kind,
                target_id = %event.target_id,
                title = %event.title,
                error = %error,
                "Notification delivery failed"
            );
        }
    }
}
