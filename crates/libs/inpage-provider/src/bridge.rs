use inpage_rpc::{HostDelivery, HostHandler, HostMessage, HostOutcome};
use serde_json::Value as JsonValue;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::registry::{PendingCalls, Settlement};
use crate::state::ProviderState;

/// Outbound half of the host bridge: a fire-and-forget message sink owned by
/// the native wallet.
pub trait HostSink: Send + Sync {
    fn post(&self, message: HostMessage) -> Result<(), ProviderError>;
}

impl<F> HostSink for F
where
    F: Fn(HostMessage) -> Result<(), ProviderError> + Send + Sync,
{
    fn post(&self, message: HostMessage) -> Result<(), ProviderError> {
        self(message)
    }
}

/// [`HostSink`] backed by an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostSink for ChannelSink {
    fn post(&self, message: HostMessage) -> Result<(), ProviderError> {
        self.tx.send(message).map_err(|err| ProviderError::Disconnected {
            reason: format!("host channel closed (message {} not sent)", err.0.id),
        })
    }
}

/// Both halves of the host bridge. Outbound posts are gated on readiness;
/// inbound deliveries settle pending calls and tolerate unknown ids.
pub struct HostBridge {
    sink: Arc<dyn HostSink>,
    calls: Arc<PendingCalls>,
    state: Arc<RwLock<ProviderState>>,
}

impl HostBridge {
    pub fn new(
        sink: Arc<dyn HostSink>,
        calls: Arc<PendingCalls>,
        state: Arc<RwLock<ProviderState>>,
    ) -> Self {
        Self { sink, calls, state }
    }

    /// Posts `{id, method: handler, params}` to the host. When the provider
    /// has no address yet (and the handler is not the account request), or
    /// the sink is gone, the pending call is rejected instead. Returns whether
    /// the message crossed the boundary.
    pub fn send(&self, handler: HostHandler, id: u64, params: JsonValue) -> bool {
        let (ready, debug) = {
            let state = self.state.read().expect("provider state rwlock poisoned");
            (state.is_ready(), state.is_debug())
        };
        if !ready && !handler.allowed_before_ready() {
            log::debug!("refusing {} (id {id}): provider is not ready", handler.as_str());
            self.calls.reject(id, ProviderError::NotReady);
            return false;
        }
        let message = HostMessage { id, method: handler, params };
        if debug {
            log::info!("==> host {} id={id} params={}", handler.as_str(), message.params);
        } else {
            log::trace!("==> host {} id={id}", handler.as_str());
        }
        match self.sink.post(message) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("host sink rejected {} (id {id}): {err}", handler.as_str());
                self.calls.reject(id, err);
                false
            }
        }
    }

    pub fn deliver_result(&self, id: u64, result: JsonValue) -> Settlement {
        log::trace!("<== host result id={id}");
        self.calls.resolve(id, result)
    }

    pub fn deliver_error(&self, id: u64, error: JsonValue) -> Settlement {
        log::debug!("<== host error id={id}: {error}");
        self.calls.reject(id, ProviderError::from_host_value(error))
    }

    pub fn deliver(&self, delivery: HostDelivery) -> Settlement {
        match delivery.into_outcome() {
            (id, HostOutcome::Result(result)) => self.deliver_result(id, result),
            (id, HostOutcome::Error(error)) => self.deliver_error(id, error),
        }
    }
}
