use inpage_rpc::RpcErrorObject;
use serde_json::{json, Value as JsonValue};

pub mod code {
    pub const NOT_READY: i64 = 4100;
    pub const METHOD_NOT_SUPPORTED: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
    pub const CALLBACK_NOT_FOUND: i64 = -32001;
    pub const TIMEOUT: i64 = -32002;
    pub const SUPERSEDED: i64 = -32003;
}

/// Errors delivered to provider callers.
///
/// Every variant maps onto a JSON-RPC error object through [`ProviderError::code`]
/// and [`ProviderError::to_rpc_error`], so pages always see `{code, message}`.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("provider is not ready")]
    NotReady,

    #[error("{method} is not supported: {reason}")]
    MethodNotSupported { method: String, reason: String },

    #[error("host bridge disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("invalid params for {method}: {message}")]
    InvalidParams { method: String, message: String },

    #[error("callback id: {id} not found")]
    CallbackNotFound { id: u64 },

    #[error("request id {id} is already in flight")]
    DuplicateId { id: u64 },

    #[error("{method} (id {id}) timed out after {elapsed_ms} ms")]
    Timeout { id: u64, method: String, elapsed_ms: u64 },

    #[error("request id {id} was replaced by a newer call")]
    Superseded { id: u64 },

    #[error("{message}")]
    Host { code: i64, message: String, data: Option<JsonValue> },

    #[error("{message}")]
    Upstream { code: i64, message: String, data: Option<JsonValue> },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    pub fn code(&self) -> i64 {
        match self {
            Self::NotReady => code::NOT_READY,
            Self::MethodNotSupported { .. } => code::METHOD_NOT_SUPPORTED,
            Self::Disconnected { .. } => code::DISCONNECTED,
            Self::InvalidParams { .. } => code::INVALID_PARAMS,
            Self::CallbackNotFound { .. } => code::CALLBACK_NOT_FOUND,
            Self::DuplicateId { .. } => code::INVALID_REQUEST,
            Self::Timeout { .. } => code::TIMEOUT,
            Self::Superseded { .. } => code::SUPERSEDED,
            Self::Host { code, .. } | Self::Upstream { code, .. } => *code,
            Self::Transport { .. } | Self::Internal { .. } => code::INTERNAL,
        }
    }

    /// Returns `true` for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. } | Self::Disconnected { .. })
    }

    pub fn to_rpc_error(&self) -> RpcErrorObject {
        let error = RpcErrorObject::new(self.code(), self.to_string());
        match self {
            Self::Host { data: Some(data), .. } | Self::Upstream { data: Some(data), .. } => {
                error.with_data(data.clone())
            }
            _ => error,
        }
    }

    pub fn unsupported(method: impl Into<String>) -> Self {
        Self::MethodNotSupported {
            method: method.into(),
            reason: "use your own solution".to_string(),
        }
    }

    pub fn unsupported_synchronously(method: impl Into<String>) -> Self {
        Self::MethodNotSupported {
            method: method.into(),
            reason: "call it asynchronously with request() or sendAsync()".to_string(),
        }
    }

    pub fn invalid_params(method: &str, message: impl Into<String>) -> Self {
        Self::InvalidParams { method: method.to_string(), message: message.into() }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport { message: err.to_string() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Interprets an error value posted by the wallet host.
    ///
    /// Objects keep their `code`/`message`/`data`; strings become the message;
    /// anything else is stringified.
    pub fn from_host_value(raw: JsonValue) -> Self {
        match raw {
            JsonValue::Null => Self::Host {
                code: code::INTERNAL,
                message: "error is undefined".to_string(),
                data: None,
            },
            JsonValue::String(message) => Self::Host { code: code::INTERNAL, message, data: None },
            JsonValue::Object(mut fields) => {
                let code = fields.get("code").and_then(JsonValue::as_i64).unwrap_or(code::INTERNAL);
                let message = match fields.remove("message") {
                    Some(JsonValue::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => JsonValue::Object(fields.clone()).to_string(),
                };
                let data = fields.remove("data");
                Self::Host { code, message, data }
            }
            other => Self::Host { code: code::INTERNAL, message: other.to_string(), data: None },
        }
    }

    pub fn from_upstream(error: RpcErrorObject) -> Self {
        Self::Upstream { code: error.code, message: error.message, data: error.data }
    }
}

impl From<ProviderError> for RpcErrorObject {
    fn from(error: ProviderError) -> Self {
        error.to_rpc_error()
    }
}

impl From<ProviderError> for JsonValue {
    fn from(error: ProviderError) -> Self {
        json!(error.to_rpc_error())
    }
}
