use inpage_provider::ProviderEvent;
use inpage_rpc::{CallPayload, HostMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One line read from stdin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// A page call, answered with a wrapped envelope.
    Request { payload: CallPayload },
    /// The wallet's answer to an earlier `host` line.
    Deliver {
        id: u64,
        #[serde(default)]
        result: Option<JsonValue>,
        #[serde(default)]
        error: Option<JsonValue>,
    },
    SetAddress { address: String },
    Connect,
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// One line written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Host { message: HostMessage },
    Response {
        response: JsonValue,
        /// Set when the failure is transient and resending may succeed.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        retryable: bool,
    },
    Event { event: ProviderEvent },
    Error { message: String },
}
