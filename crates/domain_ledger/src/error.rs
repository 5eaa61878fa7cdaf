//! Ledger domain errors

use core_kernel::{CoreError, Money, MoneyError, PortError, StudentId, YearId};
use thiserror::Error;

use crate::account::ChargeItemId;

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input; nothing was read or written
    #[error("Validation error: {0}")]
    Validation(String),

    /// No ledger exists for the student and year
    #[error("Ledger not found for student {student_id} in year {year_id}")]
    NotFound {
        student_id: StudentId,
        year_id: YearId,
    },

    /// The reference data has no such student
    #[error("Student not found: {0}")]
    StudentNotFound(StudentId),

    /// Payment exceeds what is still owed
    #[error("Payment of {amount} exceeds outstanding dues of {outstanding}")]
    Overpayment {
        amount: Money,
        outstanding: Money,
    },

    /// An adjustment would push an item below what has already been paid
    #[error("Adjustment sets {item_id} to {new_amount}, below the {paid_amount} already paid")]
    InvalidAdjustment {
        item_id: ChargeItemId,
        new_amount: Money,
        paid_amount: Money,
    },

    /// Optimistic concurrency retries were exhausted
    #[error("Concurrent update conflict on ledger {0}")]
    Conflict(String),

    /// Storage or reference-data adapter failure
    #[error("Store error: {0}")]
    Store(PortError),
}

impl LedgerError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// Creates a not-found error for a ledger key
    pub fn not_found(student_id: &StudentId, year_id: &YearId) -> Self {
        LedgerError::NotFound {
            student_id: student_id.clone(),
            year_id: year_id.clone(),
        }
    }

    /// Short machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::NotFound { .. } => "LEDGER_NOT_FOUND",
            LedgerError::StudentNotFound(_) => "STUDENT_NOT_FOUND",
            LedgerError::Overpayment { .. } => "OVERPAYMENT",
            LedgerError::InvalidAdjustment { .. } => "INVALID_ADJUSTMENT",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns true if the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Conflict(_) => true,
            LedgerError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Text suitable for showing to the person who made the request.
    ///
    /// Storage details never leak through this message.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Validation(message) => format!("The request is invalid: {}", message),
            LedgerError::NotFound { .. } => {
                "No fee ledger exists for this student and academic year yet.".to_string()
            }
            LedgerError::StudentNotFound(id) => format!("Student {} does not exist.", id),
            LedgerError::Overpayment { amount, outstanding } => format!(
                "Payment of {} is more than the {} still outstanding.",
                amount, outstanding
            ),
            LedgerError::InvalidAdjustment {
                item_id,
                new_amount,
                paid_amount,
            } => format!(
                "Cannot set {} to {}: {} has already been paid.",
                item_id, new_amount, paid_amount
            ),
            LedgerError::Conflict(_) => {
                "The ledger was being updated at the same time. Please try again.".to_string()
            }
            LedgerError::Store(_) => {
                "The fee ledger is temporarily unavailable. Please try again later.".to_string()
            }
        }
    }
}

impl From<PortError> for LedgerError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::Conflict { message } => LedgerError::Conflict(message),
            PortError::Validation { message, .. } => LedgerError::Validation(message),
            other => LedgerError::Store(other),
        }
    }
}

impl From<MoneyError> for LedgerError {
    fn from(error: MoneyError) -> Self {
        match error {
            MoneyError::Overflow => {
                LedgerError::Validation("ledger amounts exceed the supported range".to_string())
            }
            MoneyError::InvalidAmount(message) => LedgerError::Validation(message),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(message) | CoreError::Configuration(message) => {
                LedgerError::Validation(message)
            }
            other => LedgerError::Store(PortError::internal(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_conflict_becomes_ledger_conflict() {
        let err: LedgerError = PortError::conflict("version mismatch").into();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_money_overflow_is_a_validation_error() {
        let err: LedgerError = MoneyError::Overflow.into();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let errors = [
            LedgerError::validation("amount must be positive"),
            LedgerError::not_found(&StudentId::new("S1"), &YearId::new("2024")),
            LedgerError::StudentNotFound(StudentId::new("S1")),
            LedgerError::Overpayment {
                amount: Money::from_minor(500),
                outstanding: Money::from_minor(100),
            },
            LedgerError::InvalidAdjustment {
                item_id: ChargeItemId::transport(),
                new_amount: Money::from_minor(10),
                paid_amount: Money::from_minor(20),
            },
            LedgerError::Conflict("S1/2024".to_string()),
            LedgerError::Store(PortError::connection("pool exhausted")),
        ];
        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn test_store_message_hides_details() {
        let err = LedgerError::Store(PortError::connection("password authentication failed"));
        assert!(!err.user_message().contains("password"));
        assert_eq!(err.code(), "STORE_ERROR");
    }
}
