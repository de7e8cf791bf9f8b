use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced to callers of the adapter and the method channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Arguments did not match the method's request shape.
    #[error("malformed `{method}` request: {reason}")]
    MalformedRequest { method: String, reason: String },
    /// Stored data for a key is not valid UTF-8.
    #[error("value for key `{key}` is not valid UTF-8")]
    InvalidEncoding { key: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BridgeError {
    /// Stable code carried by error replies.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::MalformedRequest { .. } => "malformed_request",
            BridgeError::InvalidEncoding { .. } => "invalid_encoding",
            BridgeError::Store(StoreError::Duplicate { .. }) => "duplicate_item",
            BridgeError::Store(StoreError::NotFound { .. }) => "item_not_found",
            BridgeError::Store(StoreError::Native { .. }) => "keychain_error",
            BridgeError::Store(StoreError::Storage { .. }) => "storage_error",
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
