//! Read-modify-write against a versioned ledger store

use std::future::Future;
use tracing::{debug, warn};

use crate::account::{LedgerAccount, LedgerKey};
use crate::error::LedgerError;
use crate::ports::{JournalRecord, LedgerCommit, LedgerStore};

/// What a transaction body decided to do with the ledger
#[derive(Debug)]
pub enum Mutation<T> {
    /// Commit the new state (and journal record), then return `output`
    Write {
        account: LedgerAccount,
        journal: Option<JournalRecord>,
        output: T,
    },
    /// Leave the ledger alone and return `output`
    Skip(T),
}

/// Runs a body against the latest stored ledger, retrying on version conflicts.
///
/// The body is re-run from a fresh load on every attempt, so it must not
/// carry state between calls.
pub struct AccountTransaction<'a> {
    store: &'a dyn LedgerStore,
    max_retries: u32,
}

impl<'a> AccountTransaction<'a> {
    pub fn new(store: &'a dyn LedgerStore, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub async fn run<T, F, Fut>(&self, key: &LedgerKey, mut body: F) -> Result<T, LedgerError>
    where
        F: FnMut(Option<LedgerAccount>) -> Fut,
        Fut: Future<Output = Result<Mutation<T>, LedgerError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let stored = self.store.load(key).await?;
            let (current, version) = match stored {
                Some(stored) => (Some(stored.account), Some(stored.version)),
                None => (None, None),
            };

            let (account, journal, output) = match body(current).await? {
                Mutation::Skip(output) => return Ok(output),
                Mutation::Write {
                    account,
                    journal,
                    output,
                } => (account, journal, output),
            };

            let commit = LedgerCommit {
                key: key.clone(),
                expected_version: version,
                account,
                journal,
            };
            match self.store.commit(commit).await {
                Ok(new_version) => {
                    debug!(ledger = %key, version = new_version, "Ledger committed");
                    return Ok(output);
                }
                Err(error) if error.is_conflict() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(ledger = %key, attempt, error = %error, "Ledger commit conflict, retrying");
                }
                Err(error) if error.is_conflict() => {
                    warn!(ledger = %key, attempts = attempt + 1, "Ledger commit conflict, giving up");
                    return Err(LedgerError::Conflict(key.to_string()));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::memory::InMemoryLedgerStore;
    use crate::ports::mock::FaultyLedgerStore;
    use chrono::Utc;
    use core_kernel::{StudentId, YearId};

    fn key() -> LedgerKey {
        LedgerKey::new(StudentId::new("S1"), YearId::new("Y1"))
    }

    async fn create(store: &dyn LedgerStore) -> Result<bool, LedgerError> {
        AccountTransaction::new(store, 2)
            .run(&key(), |current| async move {
                match current {
                    Some(_) => Ok(Mutation::Skip(false)),
                    None => Ok(Mutation::Write {
                        account: LedgerAccount::new(key(), Utc::now()),
                        journal: None,
                        output: true,
                    }),
                }
            })
            .await
    }

    #[tokio::test]
    async fn test_retries_through_transient_conflicts() {
        let store = FaultyLedgerStore::new(InMemoryLedgerStore::new());
        store.inject_conflicts(2);
        assert!(create(&store).await.unwrap());
        assert_eq!(store.inner().ledger_count().await, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let store = FaultyLedgerStore::new(InMemoryLedgerStore::new());
        store.inject_conflicts(3);
        let err = create(&store).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert_eq!(store.inner().ledger_count().await, 0);
    }

    #[tokio::test]
    async fn test_skip_does_not_write() {
        let store = InMemoryLedgerStore::new();
        assert!(create(&store).await.unwrap());
        assert!(!create(&store).await.unwrap());
        let stored = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }
}
