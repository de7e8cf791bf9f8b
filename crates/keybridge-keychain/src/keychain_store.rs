use async_trait::async_trait;
use keybridge_core::{
    settings::{Accessibility, Namespace},
    storage::{CredentialRecord, CredentialStore, ItemQuery, MatchLimit, QueryMatch, StoreError},
};
use security_framework::{
    access_control::{ProtectionMode, SecAccessControl},
    base::Error as SecurityError,
    item::{ItemClass, ItemSearchOptions, Limit, SearchResult},
    passwords::{set_generic_password_options, PasswordOptions},
};
use security_framework_sys::base::errSecItemNotFound;
use tracing::{debug, instrument};

/// Attribute keys as they appear in search result dictionaries.
const ATTR_ACCOUNT: &str = "acct";
const ATTR_LABEL: &str = "labl";

/// Generic-password items in the user's keychain.
///
/// Security.framework calls block, so each one runs on the tokio blocking pool.
#[derive(Debug, Default, Clone)]
pub struct KeychainCredentialStore;

impl KeychainCredentialStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    #[instrument(skip_all, fields(account = ?query.account, limit = ?query.match_limit))]
    async fn query(&self, query: &ItemQuery) -> Result<Vec<QueryMatch>, StoreError> {
        let query = query.clone();
        let matches = blocking(move || find(&query)).await?;
        debug!(matches = matches.len(), "keychain query");
        Ok(matches)
    }

    #[instrument(skip_all, fields(account = %record.account))]
    async fn add(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let record = record.clone();
        blocking(move || {
            if exists(&record.namespace, &record.account)? {
                return Err(StoreError::Duplicate {
                    account: record.account,
                });
            }
            save(&record)
        })
        .await
    }

    #[instrument(skip_all, fields(account = %record.account))]
    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let record = record.clone();
        blocking(move || {
            if !exists(&record.namespace, &record.account)? {
                return Err(StoreError::NotFound {
                    account: record.account,
                });
            }
            save(&record)
        })
        .await
    }

    #[instrument(skip(self, namespace))]
    async fn delete(&self, namespace: &Namespace, account: &str) -> Result<(), StoreError> {
        let namespace = namespace.clone();
        let account = account.to_string();
        blocking(move || {
            let mut options = search_options(&namespace);
            options.account(&account);
            match options.delete() {
                Ok(()) => Ok(()),
                Err(err) if err.code() == errSecItemNotFound => Ok(()),
                Err(err) => Err(native(err)),
            }
        })
        .await
    }
}

async fn blocking<T, F>(call: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StoreError::Storage {
            reason: format!("task join error: {e}"),
        })?
}

/// Class, service and access group: the attributes every call filters on.
fn search_options(namespace: &Namespace) -> ItemSearchOptions {
    let mut options = ItemSearchOptions::new();
    options
        .class(ItemClass::generic_password())
        .service(&namespace.service);
    if let Some(group) = &namespace.access_group {
        options.access_group(group);
    }
    options
}

fn search(options: &ItemSearchOptions) -> Result<Vec<SearchResult>, StoreError> {
    match options.search() {
        Ok(results) => Ok(results),
        Err(err) if err.code() == errSecItemNotFound => Ok(Vec::new()),
        Err(err) => Err(native(err)),
    }
}

/// Attributes first, then data per account when asked for: the file-based
/// keychain rejects data requests combined with an unlimited match.
fn find(query: &ItemQuery) -> Result<Vec<QueryMatch>, StoreError> {
    let mut matches = find_attributes(query)?;
    if query.return_data {
        for found in &mut matches {
            found.data = find_data(&query.namespace, &found.account)?;
        }
    }
    Ok(matches)
}

fn find_attributes(query: &ItemQuery) -> Result<Vec<QueryMatch>, StoreError> {
    let mut options = search_options(&query.namespace);
    if let Some(account) = &query.account {
        options.account(account);
    }
    options
        .load_attributes(true)
        .limit(limit(query.match_limit));
    Ok(search(&options)?.iter().filter_map(attribute_match).collect())
}

fn find_data(namespace: &Namespace, account: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let mut options = search_options(namespace);
    options.account(account).load_data(true).limit(Limit::Max(1));
    Ok(search(&options)?.into_iter().find_map(|result| match result {
        SearchResult::Data(data) => Some(data),
        _ => None,
    }))
}

fn exists(namespace: &Namespace, account: &str) -> Result<bool, StoreError> {
    let matches = find_attributes(&ItemQuery::account(namespace, account))?;
    Ok(!matches.is_empty())
}

fn limit(match_limit: MatchLimit) -> Limit {
    match match_limit {
        MatchLimit::One => Limit::Max(1),
        MatchLimit::All => Limit::All,
    }
}

fn attribute_match(result: &SearchResult) -> Option<QueryMatch> {
    let mut attributes = result.simplify_dict()?;
    Some(QueryMatch {
        account: attributes.remove(ATTR_ACCOUNT)?,
        label: attributes.remove(ATTR_LABEL),
        data: None,
    })
}

/// Adds the item, or replaces its data when one already exists.
fn save(record: &CredentialRecord) -> Result<(), StoreError> {
    let mut options =
        PasswordOptions::new_generic_password(&record.namespace.service, &record.account);
    if let Some(group) = &record.namespace.access_group {
        options.set_access_group(group);
    }
    options.set_label(&record.label);
    options.set_access_synchronized(Some(record.synchronizable));
    let access =
        SecAccessControl::create_with_protection(Some(protection_mode(record.accessibility)), 0)
            .map_err(native)?;
    options.set_access_control(access);

    set_generic_password_options(&record.data, options).map_err(native)
}

fn protection_mode(accessibility: Accessibility) -> ProtectionMode {
    match accessibility {
        Accessibility::AfterFirstUnlock => ProtectionMode::AccessibleAfterFirstUnlock,
        Accessibility::AfterFirstUnlockThisDeviceOnly => {
            ProtectionMode::AccessibleAfterFirstUnlockThisDeviceOnly
        }
        Accessibility::WhenUnlocked => ProtectionMode::AccessibleWhenUnlocked,
        Accessibility::WhenUnlockedThisDeviceOnly => {
            ProtectionMode::AccessibleWhenUnlockedThisDeviceOnly
        }
    }
}

fn native(err: SecurityError) -> StoreError {
    let code = err.code();
    StoreError::Native {
        code,
        message: err
            .message()
            .unwrap_or_else(|| format!("OSStatus {code}")),
    }
}

#[cfg(test)]
mod tests {
    use keybridge_core::{
        adapter::{CredentialAdapter, WriteOutcome},
        settings::AdapterSettings,
    };

    use super::*;

    #[test]
    fn unexpected_status_keeps_its_code() {
        let err = native(SecurityError::from_code(-25308));
        assert!(matches!(err, StoreError::Native { code: -25308, .. }));
    }

    #[test]
    fn default_accessibility_is_after_first_unlock() {
        assert!(matches!(
            protection_mode(AdapterSettings::default().accessibility),
            ProtectionMode::AccessibleAfterFirstUnlock
        ));
        assert!(matches!(limit(MatchLimit::All), Limit::All));
        assert!(matches!(limit(MatchLimit::One), Limit::Max(1)));
    }

    /// Touches the login keychain; run with `cargo test -- --ignored` on a Mac.
    #[tokio::test]
    #[ignore]
    async fn login_keychain_round_trip() {
        let namespace = Namespace::new("keybridge-test", None);
        let store = KeychainCredentialStore::new();
        let adapter = CredentialAdapter::new(
            store.clone(),
            AdapterSettings::for_namespace(namespace.clone()),
        );
        adapter.delete("round-trip").await.expect("clean slate");

        assert_eq!(
            adapter.write("round-trip", "abc").await.expect("add"),
            WriteOutcome::Added
        );
        let duplicate = CredentialRecord {
            namespace: namespace.clone(),
            account: "round-trip".into(),
            data: b"dup".to_vec(),
            label: "keybridge".into(),
            accessibility: Accessibility::AfterFirstUnlock,
            synchronizable: false,
        };
        assert!(matches!(
            store.add(&duplicate).await,
            Err(StoreError::Duplicate { .. })
        ));
        assert_eq!(
            adapter.write("round-trip", "xyz").await.expect("update"),
            WriteOutcome::Updated
        );
        assert_eq!(
            adapter.read("round-trip").await.expect("read").as_deref(),
            Some("xyz")
        );
        assert!(adapter
            .read_all()
            .await
            .expect("read_all")
            .contains_key("round-trip"));

        adapter.delete("round-trip").await.expect("delete");
        assert_eq!(adapter.read("round-trip").await.expect("read"), None);
    }
}
