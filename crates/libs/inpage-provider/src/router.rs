use inpage_rpc::{HostHandler, RequestId, RpcRequest};
use serde_json::Value as JsonValue;
use std::sync::{Arc, RwLock};

use crate::bridge::HostBridge;
use crate::correlator::{IdCorrelator, Normalized};
use crate::error::ProviderError;
use crate::handle::ResponseHandle;
use crate::message::{self, TypedDataVersion};
use crate::registry::{shape_result, PendingCalls, ResultShape};
use crate::state::ProviderState;
use crate::upstream::UpstreamRpc;

/// Methods answered from provider state without any round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalQuery {
    Accounts,
    Coinbase,
    NetVersion,
    ChainId,
}

/// Methods that need the wallet host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCall {
    Sign,
    PersonalSign,
    EcRecover,
    SignTypedData(TypedDataVersion),
    SendTransaction,
    RequestAccounts,
    WatchAsset,
    AddChain,
    SwitchChain,
}

impl HostCall {
    fn build(self, request: &RpcRequest) -> Result<(HostHandler, JsonValue), ProviderError> {
        match self {
            Self::Sign => message::eth_sign(request),
            Self::PersonalSign => message::personal_sign(request),
            Self::EcRecover => message::ec_recover(request),
            Self::SignTypedData(version) => message::sign_typed_data(request, version),
            Self::SendTransaction => message::send_transaction(request),
            Self::RequestAccounts => message::request_accounts(request),
            Self::WatchAsset => message::watch_asset(request),
            Self::AddChain => message::add_chain(request),
            Self::SwitchChain => message::switch_chain(request),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Local(LocalQuery),
    Host(HostCall),
    Unsupported,
    Upstream,
}

/// Classifies a method name. `eth_` and `cfx_` spellings are interchangeable
/// for every wallet capability.
pub fn classify(method: &str) -> Route {
    if method == "net_version" {
        return Route::Local(LocalQuery::NetVersion);
    }
    match method {
        "personal_sign" => return Route::Host(HostCall::PersonalSign),
        "personal_ecRecover" => return Route::Host(HostCall::EcRecover),
        "wallet_watchAsset" => return Route::Host(HostCall::WatchAsset),
        "wallet_addEthereumChain" => return Route::Host(HostCall::AddChain),
        "wallet_switchEthereumChain" => return Route::Host(HostCall::SwitchChain),
        "eth_newFilter"
        | "eth_newBlockFilter"
        | "eth_newPendingTransactionFilter"
        | "eth_uninstallFilter"
        | "eth_subscribe" => return Route::Unsupported,
        _ => {}
    }
    let Some(name) = method.strip_prefix("eth_").or_else(|| method.strip_prefix("cfx_")) else {
        return Route::Upstream;
    };
    match name {
        "accounts" => Route::Local(LocalQuery::Accounts),
        "coinbase" => Route::Local(LocalQuery::Coinbase),
        "chainId" => Route::Local(LocalQuery::ChainId),
        "sign" => Route::Host(HostCall::Sign),
        "signTypedData" => Route::Host(HostCall::SignTypedData(TypedDataVersion::V1)),
        "signTypedData_v3" => Route::Host(HostCall::SignTypedData(TypedDataVersion::V3)),
        "signTypedData_v4" => Route::Host(HostCall::SignTypedData(TypedDataVersion::V4)),
        "sendTransaction" => Route::Host(HostCall::SendTransaction),
        "requestAccounts" => Route::Host(HostCall::RequestAccounts),
        _ => Route::Upstream,
    }
}

/// Sends each request to local state, the host bridge or the upstream node.
pub struct Router {
    state: Arc<RwLock<ProviderState>>,
    correlator: Arc<IdCorrelator>,
    calls: Arc<PendingCalls>,
    bridge: Arc<HostBridge>,
    upstream: Arc<dyn UpstreamRpc>,
}

impl Router {
    pub fn new(
        state: Arc<RwLock<ProviderState>>,
        correlator: Arc<IdCorrelator>,
        calls: Arc<PendingCalls>,
        bridge: Arc<HostBridge>,
        upstream: Arc<dyn UpstreamRpc>,
    ) -> Self {
        Self { state, correlator, calls, bridge, upstream }
    }

    pub fn dispatch(&self, request: RpcRequest, shape: ResultShape) -> ResponseHandle {
        self.trace_request(&request);
        match classify(&request.method) {
            Route::Local(query) => ResponseHandle::ready(Ok(self.local(query, request.id, shape))),
            Route::Unsupported => {
                log::debug!("{} is not supported", request.method);
                ResponseHandle::ready(Err(ProviderError::unsupported(&request.method)))
            }
            Route::Host(call) => self.dispatch_host(call, request, shape),
            Route::Upstream => self.dispatch_upstream(request, shape),
        }
    }

    /// Answers `request` from provider state when it names a local method.
    pub fn answer_locally(&self, request: &RpcRequest, shape: ResultShape) -> Option<JsonValue> {
        match classify(&request.method) {
            Route::Local(query) => Some(self.local(query, request.id.clone(), shape)),
            _ => None,
        }
    }

    fn local(&self, query: LocalQuery, id: Option<RequestId>, shape: ResultShape) -> JsonValue {
        let value = self.answer_local(query);
        match shape {
            ResultShape::Unwrapped => value,
            ResultShape::Wrapped => {
                let id = id.unwrap_or_else(|| RequestId::Number(self.correlator.next_id()));
                shape_result(shape, id, value)
            }
        }
    }

    fn answer_local(&self, query: LocalQuery) -> JsonValue {
        let state = self.state.read().expect("provider state rwlock poisoned");
        match query {
            LocalQuery::Accounts => state.accounts_value(),
            LocalQuery::Coinbase => JsonValue::from(state.address()),
            LocalQuery::NetVersion => JsonValue::from(state.network_version()),
            LocalQuery::ChainId => JsonValue::from(state.chain_id()),
        }
    }

    fn dispatch_host(
        &self,
        call: HostCall,
        mut request: RpcRequest,
        shape: ResultShape,
    ) -> ResponseHandle {
        let (handler, params) = match call.build(&request) {
            Ok(built) => built,
            Err(err) => {
                log::debug!("{err}");
                return ResponseHandle::ready(Err(err));
            }
        };
        let Normalized { id, mapped } = self.correlator.normalize(&mut request);
        let rx = match self.calls.register(id, &request.method, shape) {
            Ok(rx) => rx,
            Err(err) => {
                // A native id never owns a mapping; leave any live one alone.
                if mapped {
                    self.correlator.forget(id);
                }
                return ResponseHandle::ready(Err(err));
            }
        };
        self.bridge.send(handler, id, params);
        ResponseHandle::pending(id, rx)
    }

    fn dispatch_upstream(&self, mut request: RpcRequest, shape: ResultShape) -> ResponseHandle {
        let original = self.correlator.normalize_unmapped(&mut request);
        let id = request.numeric_id().unwrap_or_default();
        let upstream = Arc::clone(&self.upstream);
        let debug = self.is_debug();
        ResponseHandle::forwarded(
            id,
            Box::pin(async move {
                let method = request.method.clone();
                let response = upstream.call(request).await?;
                let value = response.into_result().map_err(ProviderError::from_upstream)?;
                if debug {
                    log::info!("<-- {method} id={id} result={value}");
                } else {
                    log::trace!("<-- {method} id={id}");
                }
                Ok(shape_result(shape, original, value))
            }),
        )
    }

    fn trace_request(&self, request: &RpcRequest) {
        if self.is_debug() {
            log::info!("--> {} id={:?} params={}", request.method, request.id, request.params);
        } else {
            log::trace!("--> {}", request.method);
        }
    }

    fn is_debug(&self) -> bool {
        self.state.read().expect("provider state rwlock poisoned").is_debug()
    }
}
