//! Narrow contract to the credential/account collaborator. The broker
//! core never sees this; the control API consults it strictly before and
//! after the exclusive workflow section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redeemer::Credential;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub credential: Credential,
    pub last_issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceOutcome {
    Issued,
    Failed,
}

#[derive(Debug, Clone)]
pub struct IssuanceEntry {
    pub account_id: String,
    pub outcome: IssuanceOutcome,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, id: &str) -> Option<AccountRecord>;
    async fn record_issuance(&self, id: &str, outcome: IssuanceOutcome, timestamp: DateTime<Utc>);
}

/// Credential store backed by process memory, seeded from a JSON file of
/// `{"account-id": {"username": ..., "password": ...}}` entries.
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<String, AccountRecord>>,
    history: Mutex<Vec<IssuanceEntry>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct SeedCredential {
            username: String,
            password: String,
        }

        let raw = std::fs::read_to_string(path)?;
        let seeds: HashMap<String, SeedCredential> = serde_json::from_str(&raw)?;

        let mut accounts = HashMap::new();
        for (id, seed) in seeds {
            accounts.insert(
                id,
                AccountRecord {
                    credential: Credential {
                        username: seed.username,
                        password: seed.password,
                    },
                    last_issued_at: None,
                },
            );
        }
        Ok(Self {
            accounts: Mutex::new(accounts),
            history: Mutex::new(Vec::new()),
        })
    }

    pub async fn insert(&self, id: impl Into<String>, credential: Credential) {
        self.accounts.lock().await.insert(
            id.into(),
            AccountRecord {
                credential,
                last_issued_at: None,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }

    pub async fn history(&self) -> Vec<IssuanceEntry> {
        self.history.lock().await.clone()
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account(&self, id: &str) -> Option<AccountRecord> {
        self.accounts.lock().await.get(id).cloned()
    }

    async fn record_issuance(&self, id: &str, outcome: IssuanceOutcome, timestamp: DateTime<Utc>) {
        if outcome == IssuanceOutcome::Issued {
            if let Some(record) = self.accounts.lock().await.get_mut(id) {
                record.last_issued_at = Some(timestamp);
            }
        }
        self.history.lock().await.push(IssuanceEntry {
            account_id: id.to_string(),
            outcome,
            timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn issued_outcome_updates_last_issued_at() {
        let store = InMemoryAccountStore::new();
        store.insert("acct-1", credential()).await;

        let now = Utc::now();
        store
            .record_issuance("acct-1", IssuanceOutcome::Issued, now)
            .await;

        let record = store.get_account("acct-1").await.expect("account");
        assert_eq!(record.last_issued_at, Some(now));
        assert_eq!(store.history().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_outcome_recorded_without_touching_account() {
        let store = InMemoryAccountStore::new();
        store.insert("acct-1", credential()).await;

        store
            .record_issuance("acct-1", IssuanceOutcome::Failed, Utc::now())
            .await;

        let record = store.get_account("acct-1").await.expect("account");
        assert!(record.last_issued_at.is_none());
        assert_eq!(store.history().await[0].outcome, IssuanceOutcome::Failed);
    }

    #[tokio::test]
    async fn missing_account_is_none() {
        let store = InMemoryAccountStore::new();
        assert!(store.get_account("nobody").await.is_none());
    }
}
