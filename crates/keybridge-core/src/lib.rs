//! Core abstractions for keybridge: the credential store contract, the
//! adapter exposing the five keychain operations, and the method channel
//! that routes plugin-style calls to it.

pub mod adapter;
pub mod channel;
pub mod error;
pub mod settings;
pub mod storage;
