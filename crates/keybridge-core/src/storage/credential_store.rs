use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::settings::{Accessibility, Namespace};

/// Errors produced by credential store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The record targeted by an update does not exist.
    #[error("no record for account: {account}")]
    NotFound { account: String },
    /// An add collided with an existing record.
    #[error("a record already exists for account: {account}")]
    Duplicate { account: String },
    /// Native keychain status that has no dedicated variant.
    #[error("keychain status {code}: {message}")]
    Native { code: i32, message: String },
    /// Failure outside the native store, such as lock poisoning or a failed task join.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// How many matches a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLimit {
    One,
    All,
}

/// Query descriptor for records inside one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub namespace: Namespace,
    /// Restrict to a single account; `None` enumerates the namespace.
    pub account: Option<String>,
    pub match_limit: MatchLimit,
    /// Request stored data in addition to attributes.
    pub return_data: bool,
}

impl ItemQuery {
    /// Attributes of the record stored under `account`, if any.
    pub fn account(namespace: &Namespace, account: &str) -> Self {
        Self {
            namespace: namespace.clone(),
            account: Some(account.to_string()),
            match_limit: MatchLimit::One,
            return_data: false,
        }
    }

    /// Attributes of every record in the namespace.
    pub fn all(namespace: &Namespace) -> Self {
        Self {
            namespace: namespace.clone(),
            account: None,
            match_limit: MatchLimit::All,
            return_data: false,
        }
    }

    pub fn with_data(mut self) -> Self {
        self.return_data = true;
        self
    }
}

/// Attributes and, when requested, data of one matched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    pub account: String,
    pub label: Option<String>,
    pub data: Option<Vec<u8>>,
}

/// Full record written on add or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub namespace: Namespace,
    pub account: String,
    pub data: Vec<u8>,
    pub label: String,
    pub accessibility: Accessibility,
    pub synchronizable: bool,
}

/// Contract for a platform secure-credential store.
///
/// A query with no matches returns an empty list rather than an error.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the records matching `query`.
    async fn query(&self, query: &ItemQuery) -> Result<Vec<QueryMatch>, StoreError>;

    /// Insert a new record; fails with `Duplicate` if the account is taken.
    async fn add(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Replace the data and attributes of an existing record.
    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Remove the record for an account (idempotent).
    async fn delete(&self, namespace: &Namespace, account: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredItem {
    masked: Vec<u8>,
    label: String,
}

type Items = HashMap<Namespace, BTreeMap<String, StoredItem>>;

/// In-memory store that mirrors keychain semantics for tests and smoke runs.
/// Data is XOR-masked, which keeps plaintext out of the map but is not encryption.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    inner: Arc<Mutex<Items>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Items>, StoreError> {
        self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn query(&self, query: &ItemQuery) -> Result<Vec<QueryMatch>, StoreError> {
        let items = self.lock()?;
        let Some(records) = items.get(&query.namespace) else {
            return Ok(Vec::new());
        };

        let limit = match query.match_limit {
            MatchLimit::One => 1,
            MatchLimit::All => usize::MAX,
        };
        let matches = records
            .iter()
            .filter(|(account, _)| {
                query
                    .account
                    .as_deref()
                    .is_none_or(|wanted| wanted == account.as_str())
            })
            .take(limit)
            .map(|(account, item)| QueryMatch {
                account: account.clone(),
                label: Some(item.label.clone()),
                data: query.return_data.then(|| unmask(&item.masked)),
            })
            .collect();
        Ok(matches)
    }

    async fn add(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let mut items = self.lock()?;
        let records = items.entry(record.namespace.clone()).or_default();
        if records.contains_key(&record.account) {
            return Err(StoreError::Duplicate {
                account: record.account.clone(),
            });
        }
        records.insert(record.account.clone(), stored(record));
        Ok(())
    }

    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let mut items = self.lock()?;
        let existing = items
            .get_mut(&record.namespace)
            .and_then(|records| records.get_mut(&record.account))
            .ok_or_else(|| StoreError::NotFound {
                account: record.account.clone(),
            })?;
        *existing = stored(record);
        Ok(())
    }

    async fn delete(&self, namespace: &Namespace, account: &str) -> Result<(), StoreError> {
        let mut items = self.lock()?;
        if let Some(records) = items.get_mut(namespace) {
            records.remove(account);
        }
        Ok(())
    }
}

fn stored(record: &CredentialRecord) -> StoredItem {
    StoredItem {
        masked: mask(&record.data),
        label: record.label.clone(),
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

fn unmask(input: &[u8]) -> Vec<u8> {
    mask(input) // XOR twice restores original.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(namespace: &Namespace, account: &str, data: &[u8]) -> CredentialRecord {
        CredentialRecord {
            namespace: namespace.clone(),
            account: account.to_string(),
            data: data.to_vec(),
            label: "test".to_string(),
            accessibility: Accessibility::AfterFirstUnlock,
            synchronizable: false,
        }
    }

    #[tokio::test]
    async fn stored_data_is_masked() {
        let store = InMemoryCredentialStore::new();
        let ns = Namespace::default();
        store
            .add(&record(&ns, "token", b"top-secret"))
            .await
            .expect("add should succeed");

        let found = store
            .query(&ItemQuery::account(&ns, "token").with_data())
            .await
            .expect("query should succeed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data.as_deref(), Some(&b"top-secret"[..]));

        let inner = store.inner.lock().expect("lock");
        let item = &inner[&ns]["token"];
        assert_ne!(item.masked, b"top-secret".to_vec());
        assert_eq!(item.label, "test");
    }

    #[tokio::test]
    async fn add_rejects_existing_account() {
        let store = InMemoryCredentialStore::new();
        let ns = Namespace::default();
        store.add(&record(&ns, "k", b"1")).await.expect("first add");

        let err = store
            .add(&record(&ns, "k", b"2"))
            .await
            .expect_err("second add should collide");
        assert_eq!(
            err,
            StoreError::Duplicate {
                account: "k".into()
            }
        );
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = InMemoryCredentialStore::new();
        let ns = Namespace::default();
        let err = store
            .update(&record(&ns, "missing", b"v"))
            .await
            .expect_err("update of missing record should fail");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_without_account_respects_namespace_and_limit() {
        let store = InMemoryCredentialStore::new();
        let ours = Namespace::new("svc", Some("group".into()));
        let theirs = Namespace::new("svc", Some("other-group".into()));
        store.add(&record(&ours, "a", b"1")).await.expect("add a");
        store.add(&record(&ours, "b", b"2")).await.expect("add b");
        store.add(&record(&theirs, "c", b"3")).await.expect("add c");

        let all = store.query(&ItemQuery::all(&ours)).await.expect("query");
        let accounts: Vec<_> = all.iter().map(|m| m.account.as_str()).collect();
        assert_eq!(accounts, ["a", "b"]);
        assert!(all.iter().all(|m| m.data.is_none()));

        let mut one = ItemQuery::all(&ours);
        one.match_limit = MatchLimit::One;
        assert_eq!(store.query(&one).await.expect("query").len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryCredentialStore::new();
        let ns = Namespace::default();
        store.add(&record(&ns, "k", b"v")).await.expect("add");
        store.delete(&ns, "k").await.expect("delete");
        store.delete(&ns, "k").await.expect("delete again");

        let found = store
            .query(&ItemQuery::account(&ns, "k"))
            .await
            .expect("query");
        assert!(found.is_empty());
    }
}
