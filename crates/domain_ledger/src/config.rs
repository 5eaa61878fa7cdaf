//! Engine tuning

use std::time::Duration;

use crate::error::LedgerError;

/// Limits for batch work and write contention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum students processed at once during fan-out
    pub max_concurrency: usize,
    /// Students read from reference data per page
    pub batch_size: usize,
    /// Retries of a ledger transaction after a version conflict
    pub max_conflict_retries: u32,
    /// Fan-out stops starting new students once this much time has passed
    pub deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            batch_size: 100,
            max_conflict_retries: 3,
            deadline: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.max_concurrency == 0 {
            return Err(LedgerError::validation("max_concurrency must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(LedgerError::validation("batch_size must be at least 1"));
        }
        Ok(())
    }
}
