use keybridge_core::{
    adapter::CredentialAdapter, channel::MethodChannel, storage::InMemoryCredentialStore,
};
#[cfg(target_os = "macos")]
use keybridge_keychain::KeychainCredentialStore;
use tracing::debug;

use crate::config::Config;

/// Channel backed by the user's macOS keychain.
#[cfg(target_os = "macos")]
pub fn keychain_channel(config: &Config) -> MethodChannel<KeychainCredentialStore> {
    let settings = config.adapter_settings();
    debug!(namespace = ?settings.namespace, "initializing keychain channel");
    MethodChannel::new(
        config.channel_name(),
        CredentialAdapter::new(KeychainCredentialStore::new(), settings),
    )
}

/// Channel backed by a process-local store; contents vanish on exit.
pub fn memory_channel(config: &Config) -> MethodChannel<InMemoryCredentialStore> {
    let settings = config.adapter_settings();
    debug!(namespace = ?settings.namespace, "initializing in-memory channel");
    MethodChannel::new(
        config.channel_name(),
        CredentialAdapter::new(InMemoryCredentialStore::new(), settings),
    )
}
