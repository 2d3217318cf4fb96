use async_trait::async_trait;
use inpage_rpc::codec;
use inpage_rpc::{RpcRequest, RpcResponse};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::ProviderError;

const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote JSON-RPC node used for every method the provider does not answer
/// itself.
#[async_trait]
pub trait UpstreamRpc: Send + Sync {
    /// Sends `request` verbatim and returns the node's response envelope.
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, ProviderError>;

    /// Points the client at a new endpoint after reconfiguration.
    fn retarget(&self, _rpc_url: &str) {}
}

/// JSON-RPC over HTTP(S) POST. Connections are pooled by the shared client.
pub struct HttpUpstream {
    client: Client,
    rpc_url: RwLock<String>,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            rpc_url: RwLock::new(rpc_url.into()),
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rpc_url(&self) -> String {
        self.rpc_url.read().expect("rpc url rwlock poisoned").clone()
    }
}

#[async_trait]
impl UpstreamRpc for HttpUpstream {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, ProviderError> {
        let rpc_url = self.rpc_url();
        if rpc_url.trim().is_empty() {
            return Err(ProviderError::transport("no rpc url configured"));
        }
        let body = codec::encode_frame(&request).map_err(ProviderError::transport)?;
        log::trace!("forwarding {} to {rpc_url}", request.method);

        let timeout = self.timeout;
        let method = request.method.clone();
        let transport_error = |err: reqwest::Error| {
            if err.is_timeout() {
                ProviderError::transport(format!(
                    "{method} timed out after {} ms",
                    timeout.as_millis()
                ))
            } else {
                ProviderError::transport(err)
            }
        };
        let response = self
            .client
            .post(&rpc_url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        match codec::decode_frame::<RpcResponse>(&body) {
            Ok(decoded) => Ok(decoded),
            Err(_) if !status.is_success() => Err(ProviderError::transport(format!(
                "upstream returned http status {}",
                status.as_u16()
            ))),
            Err(err) => Err(ProviderError::transport(err)),
        }
    }

    fn retarget(&self, rpc_url: &str) {
        *self.rpc_url.write().expect("rpc url rwlock poisoned") = rpc_url.to_string();
    }
}
