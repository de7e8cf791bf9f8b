//! Plugin-style method channel: named method calls in, replies out.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    adapter::CredentialAdapter,
    error::{BridgeError, BridgeResult},
    storage::CredentialStore,
};

/// Channel name the plugin registers under.
pub const CHANNEL_NAME: &str = "plugins.it_nomads.com/flutter_secure_storage";

/// Inbound call: a method name plus an argument map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteArgs {
    pub key: String,
    pub value: String,
}

/// Typed form of the five supported methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ContainsKey(KeyArgs),
    Read(KeyArgs),
    ReadAll,
    Write(WriteArgs),
    Delete(KeyArgs),
}

impl Request {
    /// Parse a call into a request. `Ok(None)` means the method is unknown.
    pub fn parse(call: &MethodCall) -> BridgeResult<Option<Request>> {
        let request = match call.method.as_str() {
            "containsKey" => Request::ContainsKey(arguments(call)?),
            "read" => Request::Read(arguments(call)?),
            "readAll" => Request::ReadAll,
            "write" => Request::Write(arguments(call)?),
            "delete" => Request::Delete(arguments(call)?),
            _ => return Ok(None),
        };
        Ok(Some(request))
    }
}

fn arguments<T: DeserializeOwned>(call: &MethodCall) -> BridgeResult<T> {
    T::deserialize(&call.arguments).map_err(|err| BridgeError::MalformedRequest {
        method: call.method.clone(),
        reason: err.to_string(),
    })
}

/// Outbound reply for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Success { result: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl From<BridgeError> for Reply {
    fn from(err: BridgeError) -> Self {
        Reply::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Routes method calls to a `CredentialAdapter`.
pub struct MethodChannel<S: CredentialStore> {
    name: String,
    adapter: CredentialAdapter<S>,
}

impl<S: CredentialStore> MethodChannel<S> {
    pub fn new(name: impl Into<String>, adapter: CredentialAdapter<S>) -> Self {
        Self {
            name: name.into(),
            adapter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &CredentialAdapter<S> {
        &self.adapter
    }

    /// Handle one decoded call.
    #[instrument(skip_all, fields(channel = %self.name, method = %call.method))]
    pub async fn handle(&self, call: MethodCall) -> Reply {
        let request = match Request::parse(&call) {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!("method not implemented");
                return Reply::NotImplemented;
            }
            Err(err) => return err.into(),
        };

        match self.dispatch(request).await {
            Ok(result) => Reply::Success { result },
            Err(err) => {
                debug!(error = %err, "call failed");
                err.into()
            }
        }
    }

    /// Handle one JSON-encoded call.
    pub async fn handle_json(&self, payload: &str) -> Reply {
        match serde_json::from_str::<MethodCall>(payload) {
            Ok(call) => self.handle(call).await,
            Err(err) => BridgeError::MalformedRequest {
                method: "<undecodable>".to_string(),
                reason: err.to_string(),
            }
            .into(),
        }
    }

    async fn dispatch(&self, request: Request) -> BridgeResult<Value> {
        let result = match request {
            Request::ContainsKey(args) => {
                Value::Bool(self.adapter.contains_key(&args.key).await?)
            }
            Request::Read(args) => self
                .adapter
                .read(&args.key)
                .await?
                .map_or(Value::Null, Value::String),
            Request::ReadAll => Value::Object(
                self.adapter
                    .read_all()
                    .await?
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect(),
            ),
            Request::Write(args) => {
                let outcome = self.adapter.write(&args.key, &args.value).await?;
                Value::String(outcome.message().to_string())
            }
            Request::Delete(args) => {
                Value::String(self.adapter.delete(&args.key).await?.to_string())
            }
        };
        Ok(result)
    }
}
