use anyhow::{Context, Result};
use inpage_provider::{ChannelSink, Provider, ProviderConfig, ProviderEvent, Settlement};
use inpage_rpc::{
    codec, CallPayload, HostDelivery, HostMessage, RequestId, RpcErrorObject, RpcResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::protocol::{Inbound, Outbound};

const EXPIRY_SWEEP: Duration = Duration::from_secs(1);

/// A provider wired to line-oriented host I/O.
///
/// Host messages, provider events and call results are all funnelled into one
/// outbound queue. The queue closes once the session and every in-flight call
/// are gone.
pub struct Session {
    provider: Arc<Provider>,
    out: mpsc::UnboundedSender<Outbound>,
    expiry: JoinHandle<()>,
}

impl Session {
    pub fn start(config: ProviderConfig) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sink, host_rx) = ChannelSink::channel();
        let provider = Arc::new(Provider::new(config, Arc::new(sink)));
        Self::with_provider(provider, host_rx)
    }

    pub fn with_provider(
        provider: Arc<Provider>,
        host_rx: mpsc::UnboundedReceiver<HostMessage>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (out, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_host_messages(host_rx, out.clone()));
        tokio::spawn(forward_events(provider.subscribe(), out.clone()));
        let expiry = provider.spawn_expiry(EXPIRY_SWEEP);
        (Self { provider, out, expiry }, out_rx)
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    /// Applies one stdin line. Requests are answered asynchronously so later
    /// lines can carry the host's deliveries.
    pub fn handle_line(&self, line: &str) -> Result<()> {
        let inbound: Inbound = codec::decode_line(line).context("decode inbound line")?;
        match inbound {
            Inbound::Request { payload } => self.spawn_request(payload),
            Inbound::Deliver { id, result, error } => {
                if self.provider.deliver(HostDelivery { id, result, error }) == Settlement::NotFound
                {
                    self.emit(Outbound::Error { message: format!("no pending call for id {id}") });
                }
            }
            Inbound::SetAddress { address } => self.provider.set_address(&address),
            Inbound::Connect => self.provider.emit_connect(),
            Inbound::Disconnect { reason } => {
                let reason = reason.unwrap_or_else(|| "host disconnected".to_string());
                self.provider.disconnect(&reason);
            }
        }
        Ok(())
    }

    fn spawn_request(&self, payload: CallPayload) {
        let caller_id = match &payload {
            CallPayload::Single(request) => request.id.clone(),
            CallPayload::Method(_) | CallPayload::Batch(_) => None,
        };
        let pending = self.provider.send_async(payload);
        let out = self.out.clone();
        tokio::spawn(async move {
            let line = match pending.await {
                Ok(response) => Outbound::Response { response, retryable: false },
                Err(err) => {
                    let retryable = err.is_retryable();
                    if retryable {
                        log::warn!("request failed, host may retry: {err}");
                    } else {
                        log::debug!("request failed: {err}");
                    }
                    let response = failure_envelope(caller_id, err.into());
                    Outbound::Response { response, retryable }
                }
            };
            if out.send(line).is_err() {
                log::debug!("stdout writer gone; dropping response");
            }
        });
    }

    fn emit(&self, line: Outbound) {
        if self.out.send(line).is_err() {
            log::debug!("stdout writer gone; dropping line");
        }
    }

    /// Rejects everything still pending. The forwarders drain what is
    /// already queued and stop when the provider is dropped.
    pub fn shutdown(self, reason: &str) {
        self.provider.disconnect(reason);
        self.expiry.abort();
    }
}

fn failure_envelope(id: Option<RequestId>, error: RpcErrorObject) -> serde_json::Value {
    serde_json::to_value(RpcResponse::failure(id, error)).unwrap_or_default()
}

async fn forward_host_messages(
    mut host_rx: mpsc::UnboundedReceiver<HostMessage>,
    out: mpsc::UnboundedSender<Outbound>,
) {
    while let Some(message) = host_rx.recv().await {
        if out.send(Outbound::Host { message }).is_err() {
            break;
        }
    }
}

async fn forward_events(
    mut events: broadcast::Receiver<ProviderEvent>,
    out: mpsc::UnboundedSender<Outbound>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out.send(Outbound::Event { event }).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("dropped {skipped} provider event(s)");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Drives `session` from `input` until EOF, writing every outbound line to
/// `output`.
pub async fn run<R, W>(
    session: Session,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            let encoded = codec::encode_line(&line)?;
            output.write_all(encoded.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = session.handle_line(&line) {
            log::warn!("{err:#}");
            session.emit(Outbound::Error { message: format!("{err:#}") });
        }
    }

    log::info!("input closed; shutting down");
    session.shutdown("host input closed");
    writer.await.context("join stdout writer")?.context("write stdout")?;
    Ok(())
}
