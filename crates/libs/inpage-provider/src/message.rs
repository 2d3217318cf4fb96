//! Builds the `params` object the wallet host expects for each delegated call.

use inpage_rpc::{HostHandler, RpcRequest};
use serde_json::{json, Value as JsonValue};

use crate::error::ProviderError;

static NULL: JsonValue = JsonValue::Null;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypedDataVersion {
    V1,
    V3,
    V4,
}

impl TypedDataVersion {
    fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V3 => "v3",
            Self::V4 => "v4",
        }
    }
}

/// Decodes a hex message the way browsers' `Buffer.from(hex, "hex")` does:
/// an optional `0x` prefix is dropped and decoding stops at the first pair
/// that is not valid hex.
pub fn message_bytes(message: &JsonValue) -> Vec<u8> {
    match message {
        JsonValue::String(text) => {
            // Only a leading 0x is dropped; one further in stops decoding there.
            let digits = text.strip_prefix("0x").unwrap_or(text).as_bytes();
            digits
                .chunks_exact(2)
                .map_while(|pair| {
                    let hi = char::from(pair[0]).to_digit(16)?;
                    let lo = char::from(pair[1]).to_digit(16)?;
                    u8::try_from((hi << 4) | lo).ok()
                })
                .collect()
        }
        JsonValue::Array(items) => items
            .iter()
            .map_while(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn required<'a>(request: &'a RpcRequest, index: usize) -> Result<&'a JsonValue, ProviderError> {
    request.param(index).filter(|value| !value.is_null()).ok_or_else(|| {
        ProviderError::invalid_params(&request.method, format!("missing parameter {index}"))
    })
}

fn required_str(request: &RpcRequest, index: usize) -> Result<&str, ProviderError> {
    required(request, index)?.as_str().ok_or_else(|| {
        ProviderError::invalid_params(&request.method, format!("parameter {index} must be a string"))
    })
}

/// `eth_sign(address, message)`: readable messages go to the personal-sign
/// handler, opaque ones to the raw message handler.
pub fn eth_sign(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    let message = required(request, 1)?;
    let bytes = message_bytes(message);
    let handler = if std::str::from_utf8(&bytes).is_ok() {
        HostHandler::SignPersonalMessage
    } else {
        HostHandler::SignMessage
    };
    Ok((handler, json!({ "raw": message, "data": bytes_to_hex(&bytes) })))
}

/// `personal_sign(message, address)`: plain text that does not decode as hex
/// is hex-encoded from its UTF-8 bytes.
pub fn personal_sign(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    let message = required_str(request, 0)?;
    let data = if message_bytes(&JsonValue::from(message)).is_empty() {
        bytes_to_hex(message.as_bytes())
    } else {
        message.to_string()
    };
    Ok((HostHandler::SignPersonalMessage, json!({ "raw": message, "data": data })))
}

pub fn ec_recover(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    let message = required(request, 0)?;
    let signature = required(request, 1)?;
    Ok((HostHandler::EcRecover, json!({ "signature": signature, "message": message })))
}

/// Typed data is forwarded as its JSON text; hashing happens in the host.
pub fn sign_typed_data(
    request: &RpcRequest,
    version: TypedDataVersion,
) -> Result<(HostHandler, JsonValue), ProviderError> {
    // The legacy array form is (typedData, address). Everything else is
    // (address, typedData), and an unversioned object there hashes as v3.
    let (index, version) = match version {
        TypedDataVersion::V1 if request.param(0).is_some_and(JsonValue::is_array) => {
            (0, TypedDataVersion::V1)
        }
        TypedDataVersion::V1 => (1, TypedDataVersion::V3),
        other => (1, other),
    };
    let typed_data = match required(request, index)? {
        JsonValue::String(text) => {
            serde_json::from_str::<JsonValue>(text).map_err(|err| {
                ProviderError::invalid_params(&request.method, format!("typed data: {err}"))
            })?;
            text.clone()
        }
        value @ (JsonValue::Object(_) | JsonValue::Array(_)) => value.to_string(),
        _ => {
            return Err(ProviderError::invalid_params(
                &request.method,
                "typed data must be a JSON string or object",
            ))
        }
    };
    Ok((
        HostHandler::SignTypedMessage,
        json!({ "raw": typed_data, "data": typed_data, "version": version.as_str() }),
    ))
}

pub fn send_transaction(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    Ok((HostHandler::SignTransaction, required(request, 0)?.clone()))
}

pub fn request_accounts(_request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    Ok((HostHandler::RequestAccounts, json!({})))
}

/// `wallet_watchAsset({type, options: {address, symbol, decimals}})`.
pub fn watch_asset(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    let params = match &request.params {
        JsonValue::Array(items) => items.first().unwrap_or(&NULL),
        other => other,
    };
    let options = params
        .get("options")
        .filter(|options| options.is_object())
        .ok_or_else(|| ProviderError::invalid_params(&request.method, "missing options"))?;
    let contract = options
        .get("address")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProviderError::invalid_params(&request.method, "missing options.address"))?;
    Ok((
        HostHandler::WatchAsset,
        json!({
            "type": params.get("type").cloned().unwrap_or(JsonValue::Null),
            "contract": contract,
            "symbol": options.get("symbol").cloned().unwrap_or(JsonValue::Null),
            "decimals": options.get("decimals").and_then(JsonValue::as_u64).unwrap_or(0),
        }),
    ))
}

pub fn add_chain(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    Ok((HostHandler::AddEthereumChain, required(request, 0)?.clone()))
}

pub fn switch_chain(request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
    Ok((HostHandler::SwitchEthereumChain, required(request, 0)?.clone()))
}
