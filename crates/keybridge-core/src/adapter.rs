use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex},
};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument, warn};

use crate::{
    error::{BridgeError, BridgeResult},
    settings::AdapterSettings,
    storage::{CredentialRecord, CredentialStore, ItemQuery, StoreError},
};

/// Reply text for a successful delete.
pub const DELETED_MESSAGE: &str = "deleted successfully";

/// Whether a write created a record or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Added,
    Updated,
}

impl WriteOutcome {
    pub fn message(self) -> &'static str {
        match self {
            WriteOutcome::Added => "added successfully",
            WriteOutcome::Updated => "updated successfully",
        }
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Exposes containsKey/read/readAll/write/delete over a `CredentialStore`
/// scoped to the namespace in its settings.
pub struct CredentialAdapter<S: CredentialStore> {
    store: Arc<S>,
    settings: AdapterSettings,
    locks: KeyLocks,
}

impl<S: CredentialStore> CredentialAdapter<S> {
    pub fn new(store: S, settings: AdapterSettings) -> Self {
        Self::with_shared_store(Arc::new(store), settings)
    }

    pub fn with_shared_store(store: Arc<S>, settings: AdapterSettings) -> Self {
        Self {
            store,
            settings,
            locks: KeyLocks::default(),
        }
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    /// `true` iff exactly one record is stored under `key`.
    #[instrument(skip(self))]
    pub async fn contains_key(&self, key: &str) -> BridgeResult<bool> {
        let query = ItemQuery::account(&self.settings.namespace, key);
        let matches = self.store.query(&query).await?;
        debug!(matches = matches.len(), "containsKey");
        Ok(matches.len() == 1)
    }

    /// Value stored under `key`, or `None` when nothing matches.
    #[instrument(skip(self))]
    pub async fn read(&self, key: &str) -> BridgeResult<Option<String>> {
        let query = ItemQuery::account(&self.settings.namespace, key).with_data();
        let matches = self.store.query(&query).await?;
        let Some(data) = matches.into_iter().next().and_then(|m| m.data) else {
            return Ok(None);
        };
        String::from_utf8(data)
            .map(Some)
            .map_err(|_| BridgeError::InvalidEncoding {
                key: key.to_string(),
            })
    }

    /// Every record in the namespace, keyed by account.
    ///
    /// Enumeration returns attributes only; each value is fetched with a
    /// separate `read`. Records deleted in between are left out, any other
    /// read failure fails the whole call.
    #[instrument(skip(self))]
    pub async fn read_all(&self) -> BridgeResult<BTreeMap<String, String>> {
        let query = ItemQuery::all(&self.settings.namespace);
        let records = self.store.query(&query).await?;
        debug!(records = records.len(), "readAll enumerated");

        let mut values = BTreeMap::new();
        for record in records {
            match self.read(&record.account).await {
                Ok(Some(value)) => {
                    values.insert(record.account, value);
                }
                Ok(None) => debug!(account = %record.account, "record vanished before read"),
                Err(err) => {
                    warn!(account = %record.account, error = %err, "readAll re-read failed");
                    return Err(err);
                }
            }
        }
        Ok(values)
    }

    /// Store `value` under `key`, replacing any existing record.
    #[instrument(skip(self, value))]
    pub async fn write(&self, key: &str, value: &str) -> BridgeResult<WriteOutcome> {
        let lock = self.locks.for_key(key)?;
        let _guard = lock.lock().await;

        let found = self.contains_key(key).await?;
        debug!(found, "write");
        let record = self.record(key, value);
        if found {
            self.store.update(&record).await?;
            Ok(WriteOutcome::Updated)
        } else {
            self.store.add(&record).await?;
            Ok(WriteOutcome::Added)
        }
    }

    /// Remove the record under `key`. Missing keys are not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> BridgeResult<&'static str> {
        let lock = self.locks.for_key(key)?;
        let _guard = lock.lock().await;

        self.store.delete(&self.settings.namespace, key).await?;
        Ok(DELETED_MESSAGE)
    }

    fn record(&self, key: &str, value: &str) -> CredentialRecord {
        CredentialRecord {
            namespace: self.settings.namespace.clone(),
            account: key.to_string(),
            data: value.as_bytes().to_vec(),
            label: self.settings.label.clone(),
            accessibility: self.settings.accessibility,
            synchronizable: self.settings.synchronizable,
        }
    }
}

/// Per-key async mutexes serialising write and delete on the same account.
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    fn for_key(&self, key: &str) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut locks = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        // Entries only referenced by the map are idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks.entry(key.to_string()).or_default().clone())
    }
}
