use inpage_rpc::{CallPayload, HostDelivery, RpcRequest};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bridge::{HostBridge, HostSink};
use crate::config::ProviderConfig;
use crate::correlator::IdCorrelator;
use crate::error::ProviderError;
use crate::events::{ProviderEvent, EVENT_CAPACITY};
use crate::handle::ResponseHandle;
use crate::registry::{PendingCalls, ResultShape, Settlement};
use crate::router::Router;
use crate::state::ProviderState;
use crate::upstream::{HttpUpstream, UpstreamRpc};

/// An injected JSON-RPC provider: answers account queries locally, delegates
/// signing to the wallet host and forwards everything else upstream.
pub struct Provider {
    state: Arc<RwLock<ProviderState>>,
    calls: Arc<PendingCalls>,
    bridge: Arc<HostBridge>,
    router: Router,
    upstream: Arc<dyn UpstreamRpc>,
    request_timeout: RwLock<Option<Duration>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Provider {
    pub fn new(config: ProviderConfig, sink: Arc<dyn HostSink>) -> Self {
        let upstream = Arc::new(HttpUpstream::new(config.rpc_url.clone()));
        Self::with_upstream(config, sink, upstream)
    }

    pub fn with_upstream(
        config: ProviderConfig,
        sink: Arc<dyn HostSink>,
        upstream: Arc<dyn UpstreamRpc>,
    ) -> Self {
        let state = Arc::new(RwLock::new(ProviderState::from_config(&config)));
        let correlator = Arc::new(IdCorrelator::new());
        let calls = Arc::new(PendingCalls::new(correlator.clone(), config.duplicate_ids));
        let bridge = Arc::new(HostBridge::new(sink, calls.clone(), state.clone()));
        let router = Router::new(
            state.clone(),
            correlator,
            calls.clone(),
            bridge.clone(),
            upstream.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        log::debug!(
            "provider created for chain {} (ready: {})",
            config.chain_id,
            config.address.as_deref().is_some_and(|address| !address.trim().is_empty())
        );
        Self {
            state,
            calls,
            bridge,
            router,
            upstream,
            request_timeout: RwLock::new(config.request_timeout()),
            events,
        }
    }

    /// Replaces the whole configuration. Listeners see `chainChanged` and
    /// `accountsChanged` only for values that actually changed.
    pub fn set_config(&self, config: ProviderConfig) {
        let next = ProviderState::from_config(&config);
        let previous = {
            let mut state = self.state.write().expect("provider state rwlock poisoned");
            std::mem::replace(&mut *state, next.clone())
        };
        self.upstream.retarget(&config.rpc_url);
        self.calls.set_policy(config.duplicate_ids);
        *self.request_timeout.write().expect("request timeout rwlock poisoned") =
            config.request_timeout();
        log::info!("provider reconfigured for chain {}", next.chain_id());

        if previous.chain_id() != next.chain_id() {
            self.emit(ProviderEvent::ChainChanged { chain_id: next.chain_id().to_string() });
        }
        if previous.accounts() != next.accounts() {
            self.emit(ProviderEvent::AccountsChanged { accounts: next.accounts() });
        }
    }

    pub fn set_address(&self, address: &str) {
        let (before, after) = {
            let mut state = self.state.write().expect("provider state rwlock poisoned");
            let before = state.accounts();
            state.set_address(address);
            (before, state.accounts())
        };
        if before != after {
            log::info!("provider address set (ready: {})", !after.is_empty());
            self.emit(ProviderEvent::AccountsChanged { accounts: after });
        }
    }

    pub fn state(&self) -> ProviderState {
        self.state.read().expect("provider state rwlock poisoned").clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().expect("provider state rwlock poisoned").is_ready()
    }

    /// Always `true`; the provider has no connection of its own to lose.
    pub fn is_connected(&self) -> bool {
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Announces the configured chain to current listeners.
    pub fn emit_connect(&self) {
        let chain_id =
            self.state.read().expect("provider state rwlock poisoned").chain_id().to_string();
        self.emit(ProviderEvent::Connect { chain_id });
    }

    fn emit(&self, event: ProviderEvent) {
        if self.events.send(event).is_err() {
            log::trace!("no provider event listeners");
        }
    }

    pub fn dispatch(&self, request: RpcRequest, shape: ResultShape) -> ResponseHandle {
        self.router.dispatch(request, shape)
    }

    /// Resolves with the bare result value.
    pub fn request(&self, request: RpcRequest) -> ResponseHandle {
        self.dispatch(request, ResultShape::Unwrapped)
    }

    /// Resolves with `{jsonrpc, id, result}` envelopes. A batch resolves with
    /// an array in request order, or the first error.
    ///
    /// Every request is dispatched before this returns; the future only
    /// waits for the outcomes.
    pub fn send_async(
        &self,
        payload: CallPayload,
    ) -> impl Future<Output = Result<JsonValue, ProviderError>> + Send + 'static {
        let (handles, batch) = match payload {
            CallPayload::Method(method) => {
                let request = RpcRequest::new(method, JsonValue::Null);
                (vec![self.dispatch(request, ResultShape::Wrapped)], false)
            }
            CallPayload::Single(request) => {
                (vec![self.dispatch(request, ResultShape::Wrapped)], false)
            }
            CallPayload::Batch(requests) => {
                let handles = requests
                    .into_iter()
                    .map(|request| self.dispatch(request, ResultShape::Wrapped))
                    .collect::<Vec<_>>();
                (handles, true)
            }
        };
        async move {
            let mut responses = Vec::with_capacity(handles.len());
            for handle in handles {
                responses.push(handle.await?);
            }
            if batch {
                Ok(JsonValue::Array(responses))
            } else {
                Ok(responses.pop().unwrap_or_default())
            }
        }
    }

    /// Synchronous compatibility entry point. Only local methods can be
    /// answered: a bare method name yields the bare value, a request object
    /// yields an envelope carrying the caller's id.
    pub fn send(&self, payload: &CallPayload) -> Result<JsonValue, ProviderError> {
        let (request, shape) = match payload {
            CallPayload::Method(method) => {
                (RpcRequest::new(method.clone(), JsonValue::Null), ResultShape::Unwrapped)
            }
            CallPayload::Single(request) => (request.clone(), ResultShape::Wrapped),
            CallPayload::Batch(_) => {
                return Err(ProviderError::unsupported_synchronously("batch"));
            }
        };
        self.router
            .answer_locally(&request, shape)
            .ok_or_else(|| ProviderError::unsupported_synchronously(&request.method))
    }

    pub fn enable(&self) -> ResponseHandle {
        log::debug!("enable() requested");
        self.request(RpcRequest::new("eth_requestAccounts", JsonValue::Array(Vec::new())))
    }

    /// Convenience for `send_async` that returns only the `result` member.
    pub async fn call(
        &self,
        method: &str,
        params: JsonValue,
    ) -> Result<JsonValue, ProviderError> {
        let mut envelope = self.send_async(RpcRequest::new(method, params).into()).await?;
        Ok(envelope.get_mut("result").map(JsonValue::take).unwrap_or_default())
    }

    pub fn deliver_result(&self, id: u64, result: JsonValue) -> Settlement {
        self.bridge.deliver_result(id, result)
    }

    pub fn deliver_error(&self, id: u64, error: JsonValue) -> Settlement {
        self.bridge.deliver_error(id, error)
    }

    pub fn deliver(&self, delivery: HostDelivery) -> Settlement {
        self.bridge.deliver(delivery)
    }

    pub fn pending_len(&self) -> usize {
        self.calls.len()
    }

    /// Rejects host calls older than the configured timeout. No-op when no
    /// timeout is configured.
    pub fn expire_pending(&self) -> Vec<u64> {
        match *self.request_timeout.read().expect("request timeout rwlock poisoned") {
            Some(ttl) => self.calls.expire(ttl),
            None => Vec::new(),
        }
    }

    /// Sweeps expired calls every `period` until the provider is dropped.
    pub fn spawn_expiry(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let provider: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(provider) = provider.upgrade() else {
                    log::debug!("provider dropped; stopping expiry sweep");
                    break;
                };
                let expired = provider.expire_pending();
                if !expired.is_empty() {
                    log::debug!("expired {} pending host call(s)", expired.len());
                }
            }
        })
    }

    /// Rejects every outstanding host call, e.g. when the host goes away.
    pub fn disconnect(&self, reason: &str) -> usize {
        let error = ProviderError::Disconnected { reason: reason.to_string() };
        let count = self.calls.fail_all(&error);
        if count > 0 {
            log::warn!("host disconnected ({reason}); rejected {count} pending call(s)");
        }
        count
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("state", &self.state())
            .field("pending", &self.pending_len())
            .finish()
    }
}
