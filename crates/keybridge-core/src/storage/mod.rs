//! Credential store contract and the in-memory implementation.

mod credential_store;

pub use credential_store::{
    CredentialRecord, CredentialStore, InMemoryCredentialStore, ItemQuery, MatchLimit,
    QueryMatch, StoreError,
};
