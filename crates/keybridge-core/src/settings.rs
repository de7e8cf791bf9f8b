use serde::{Deserialize, Serialize};

/// Service identifier used when no override is configured.
pub const DEFAULT_SERVICE: &str = "flutter_secure_storage";
/// Access group used when no override is configured.
pub const DEFAULT_ACCESS_GROUP: &str = "plugins.it_nomads.com/flutter_secure_storage";
/// Label attached to every record written by the adapter.
pub const DEFAULT_LABEL: &str = "Flutter Secure Storage";

/// Scope that groups every record owned by one adapter instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub service: String,
    /// `None` leaves records unscoped by access group.
    pub access_group: Option<String>,
}

impl Namespace {
    pub fn new(service: impl Into<String>, access_group: Option<String>) -> Self {
        Self {
            service: service.into(),
            access_group: access_group.filter(|group| !group.is_empty()),
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, Some(DEFAULT_ACCESS_GROUP.to_string()))
    }
}

/// When the OS may decrypt a record's data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Readable once the device has been unlocked after boot.
    #[default]
    AfterFirstUnlock,
    AfterFirstUnlockThisDeviceOnly,
    WhenUnlocked,
    WhenUnlockedThisDeviceOnly,
}

/// Immutable configuration injected into a `CredentialAdapter` at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSettings {
    pub namespace: Namespace,
    pub label: String,
    pub accessibility: Accessibility,
    /// Whether records may sync across devices. Always off by default.
    pub synchronizable: bool,
}

impl AdapterSettings {
    pub fn for_namespace(namespace: Namespace) -> Self {
        Self {
            namespace,
            ..Self::default()
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            namespace: Namespace::default(),
            label: DEFAULT_LABEL.to_string(),
            accessibility: Accessibility::default(),
            synchronizable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plugin_constants() {
        let settings = AdapterSettings::default();
        assert_eq!(settings.namespace.service, "flutter_secure_storage");
        assert_eq!(
            settings.namespace.access_group.as_deref(),
            Some("plugins.it_nomads.com/flutter_secure_storage")
        );
        assert_eq!(settings.accessibility, Accessibility::AfterFirstUnlock);
        assert!(!settings.synchronizable);
    }

    #[test]
    fn empty_access_group_means_unscoped() {
        let namespace = Namespace::new("svc", Some(String::new()));
        assert_eq!(namespace.access_group, None);
    }
}
