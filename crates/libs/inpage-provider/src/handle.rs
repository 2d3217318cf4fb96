use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::ProviderError;
use crate::registry::CallOutcome;

pub(crate) type ForwardedCall = Pin<Box<dyn Future<Output = CallOutcome> + Send + 'static>>;

enum HandleState {
    Ready(Option<CallOutcome>),
    Pending { id: u64, rx: oneshot::Receiver<CallOutcome> },
    Forwarded { id: u64, call: ForwardedCall },
}

/// Future returned by dispatch, settled exactly once with the call outcome.
pub struct ResponseHandle {
    state: HandleState,
}

impl ResponseHandle {
    pub(crate) fn ready(outcome: CallOutcome) -> Self {
        Self { state: HandleState::Ready(Some(outcome)) }
    }

    pub(crate) fn pending(id: u64, rx: oneshot::Receiver<CallOutcome>) -> Self {
        Self { state: HandleState::Pending { id, rx } }
    }

    pub(crate) fn forwarded(id: u64, call: ForwardedCall) -> Self {
        Self { state: HandleState::Forwarded { id, call } }
    }

    /// `true` when the outcome was decided during dispatch.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Correlation id used on the host bridge or upstream, if any.
    pub fn correlation_id(&self) -> Option<u64> {
        match &self.state {
            HandleState::Ready(_) => None,
            HandleState::Pending { id, .. } | HandleState::Forwarded { id, .. } => Some(*id),
        }
    }
}

impl Future for ResponseHandle {
    type Output = CallOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(outcome) => Poll::Ready(outcome.take().unwrap_or_else(|| {
                Err(ProviderError::internal("response handle polled after completion"))
            })),
            HandleState::Pending { id, rx } => Pin::new(rx).poll(cx).map(|received| {
                received.unwrap_or_else(|_| {
                    Err(ProviderError::Disconnected {
                        reason: format!("pending call {id} was dropped by the provider"),
                    })
                })
            }),
            HandleState::Forwarded { call, .. } => call.as_mut().poll(cx),
        }
    }
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            HandleState::Ready(_) => "ready",
            HandleState::Pending { .. } => "pending",
            HandleState::Forwarded { .. } => "forwarded",
        };
        f.debug_struct("ResponseHandle")
            .field("state", &state)
            .field("correlation_id", &self.correlation_id())
            .finish()
    }
}
