use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use keybridge_core::{
    channel::CHANNEL_NAME,
    settings::{Accessibility, AdapterSettings, Namespace},
};
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/keybridge/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the method channel name.
    pub channel: Option<String>,
    /// Keychain namespace and record attributes.
    pub keychain: Option<KeychainConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct KeychainConfig {
    pub service: Option<String>,
    /// Empty string disables access-group scoping.
    pub access_group: Option<String>,
    pub label: Option<String>,
    pub accessibility: Option<Accessibility>,
}

impl Config {
    /// Config with every field spelled out, used for `config init`.
    pub fn template() -> Self {
        let defaults = AdapterSettings::default();
        Self {
            channel: Some(CHANNEL_NAME.to_string()),
            keychain: Some(KeychainConfig {
                service: Some(defaults.namespace.service),
                access_group: defaults.namespace.access_group,
                label: Some(defaults.label),
                accessibility: Some(defaults.accessibility),
            }),
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.as_deref().unwrap_or(CHANNEL_NAME)
    }

    /// Adapter settings with config overrides applied over the defaults.
    pub fn adapter_settings(&self) -> AdapterSettings {
        let mut settings = AdapterSettings::default();
        let Some(keychain) = &self.keychain else {
            return settings;
        };

        let service = keychain
            .service
            .clone()
            .unwrap_or(settings.namespace.service);
        let access_group = match &keychain.access_group {
            Some(group) => Some(group.clone()),
            None => settings.namespace.access_group,
        };
        settings.namespace = Namespace::new(service, access_group);
        if let Some(label) = &keychain.label {
            settings.label = label.clone();
        }
        if let Some(accessibility) = keychain.accessibility {
            settings.accessibility = accessibility;
        }
        settings
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("keybridge").join("config.toml"))
}

/// Write the config template to the default path unless a file is already there.
pub fn write_default_if_missing() -> Result<PathBuf> {
    let path = default_path()?;
    write_to_path_if_missing(&Config::template(), &path)?;
    Ok(path)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.adapter_settings(), AdapterSettings::default());
        assert_eq!(cfg.channel_name(), CHANNEL_NAME);
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            channel = "com.example/secure_storage"
            [keychain]
            service = "com.example.app"
            access_group = ""
            label = "Example"
            accessibility = "when_unlocked_this_device_only"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(cfg.channel_name(), "com.example/secure_storage");

        let settings = cfg.adapter_settings();
        assert_eq!(settings.namespace, Namespace::new("com.example.app", None));
        assert_eq!(settings.label, "Example");
        assert_eq!(
            settings.accessibility,
            Accessibility::WhenUnlockedThisDeviceOnly
        );
        assert!(!settings.synchronizable);
    }

    #[test]
    fn partial_keychain_section_keeps_defaults() {
        let cfg: Config = toml::from_str("[keychain]\nservice = \"svc\"\n").expect("parse");
        let settings = cfg.adapter_settings();
        assert_eq!(settings.namespace.service, "svc");
        assert_eq!(
            settings.namespace.access_group,
            AdapterSettings::default().namespace.access_group
        );
    }

    #[test]
    fn template_is_written_once_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        assert!(write_to_path_if_missing(&Config::template(), &path).expect("first write"));
        assert!(!write_to_path_if_missing(&Config::template(), &path).expect("second write"));

        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, Config::template());
        assert_eq!(loaded.adapter_settings(), AdapterSettings::default());
    }
}
