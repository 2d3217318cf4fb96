use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Caller-supplied request identifier.
///
/// Only non-negative integers count as native numeric ids. Every other scalar
/// (strings, negative or fractional numbers, booleans) is carried verbatim in
/// [`RequestId::String`] or [`RequestId::Other`] and has to be correlated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
    Other(JsonValue),
}

impl RequestId {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<RequestId> for JsonValue {
    fn from(value: RequestId) -> Self {
        match value {
            RequestId::Number(number) => JsonValue::from(number),
            RequestId::String(text) => JsonValue::String(text),
            RequestId::Other(other) => other,
        }
    }
}

// ── Requests and responses ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: JsonValue) -> Self {
        Self { jsonrpc: jsonrpc_version(), id: None, method: method.into(), params }
    }

    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Positional parameter lookup. Object params have no positions.
    pub fn param(&self, index: usize) -> Option<&JsonValue> {
        self.params.as_array().and_then(|params| params.get(index))
    }

    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(RequestId::as_number)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Option<RequestId>, result: JsonValue) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Option<RequestId>, error: RpcErrorObject) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, result: None, error: Some(error) }
    }

    /// A missing `result` without an `error` is a successful `null`.
    pub fn into_result(self) -> Result<JsonValue, RpcErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(JsonValue::Null)),
        }
    }
}

/// Payload accepted by the legacy `send`/`sendAsync` entry points.
///
/// The shape is decided once when the payload enters the provider: a bare
/// method name, a single request object, or a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallPayload {
    Method(String),
    Batch(Vec<RpcRequest>),
    Single(RpcRequest),
}

impl From<RpcRequest> for CallPayload {
    fn from(request: RpcRequest) -> Self {
        Self::Single(request)
    }
}

// ── Host bridge messages ──────────────────────────────────────────────────────

/// Handler names understood by the native wallet host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostHandler {
    SignPersonalMessage,
    SignMessage,
    EcRecover,
    SignTypedMessage,
    SignTransaction,
    RequestAccounts,
    WatchAsset,
    AddEthereumChain,
    SwitchEthereumChain,
}

impl HostHandler {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignPersonalMessage => "signPersonalMessage",
            Self::SignMessage => "signMessage",
            Self::EcRecover => "ecRecover",
            Self::SignTypedMessage => "signTypedMessage",
            Self::SignTransaction => "signTransaction",
            Self::RequestAccounts => "requestAccounts",
            Self::WatchAsset => "watchAsset",
            Self::AddEthereumChain => "addEthereumChain",
            Self::SwitchEthereumChain => "switchEthereumChain",
        }
    }

    /// Handlers the host accepts before an address is known.
    pub fn allowed_before_ready(self) -> bool {
        matches!(self, Self::RequestAccounts)
    }
}

/// Outbound message handed to the host: `{id, method, params}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    pub id: u64,
    pub method: HostHandler,
    pub params: JsonValue,
}

/// Inbound delivery from the host for a previously posted [`HostMessage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostDelivery {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostOutcome {
    Result(JsonValue),
    Error(JsonValue),
}

impl HostDelivery {
    pub fn result(id: u64, result: JsonValue) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn error(id: u64, error: JsonValue) -> Self {
        Self { id, result: None, error: Some(error) }
    }

    pub fn into_outcome(self) -> (u64, HostOutcome) {
        match self.error {
            Some(error) => (self.id, HostOutcome::Error(error)),
            None => (self.id, HostOutcome::Result(self.result.unwrap_or(JsonValue::Null))),
        }
    }
}
