//! macOS Keychain implementation of the keybridge credential store.
//! Records are generic-password items addressed by service, access group and account.

#[cfg(target_os = "macos")]
pub mod keychain_store;

#[cfg(target_os = "macos")]
pub use keychain_store::KeychainCredentialStore;

