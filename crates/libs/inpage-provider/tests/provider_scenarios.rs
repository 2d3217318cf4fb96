use async_trait::async_trait;
use inpage_provider::{
    ChannelSink, DuplicateIdPolicy, Provider, ProviderConfig, ProviderError, ResultShape,
    Settlement, UpstreamRpc,
};
use inpage_rpc::{CallPayload, HostHandler, HostMessage, RequestId, RpcRequest, RpcResponse};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Upstream node that echoes the method name and records every request.
#[derive(Default)]
struct RecordingUpstream {
    seen: Mutex<Vec<RpcRequest>>,
}

#[async_trait]
impl UpstreamRpc for RecordingUpstream {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, ProviderError> {
        self.seen.lock().expect("seen mutex poisoned").push(request.clone());
        if request.method == "eth_fail" {
            return Ok(RpcResponse::failure(
                request.id,
                inpage_rpc::RpcErrorObject::new(-32000, "execution reverted"),
            ));
        }
        Ok(RpcResponse::success(request.id, json!(format!("{}-ok", request.method))))
    }
}

fn provider_with(
    config: ProviderConfig,
) -> (Provider, UnboundedReceiver<HostMessage>, Arc<RecordingUpstream>) {
    let (sink, host_rx) = ChannelSink::channel();
    let upstream = Arc::new(RecordingUpstream::default());
    let provider = Provider::with_upstream(config, Arc::new(sink), upstream.clone());
    (provider, host_rx, upstream)
}

fn ready_provider() -> (Provider, UnboundedReceiver<HostMessage>, Arc<RecordingUpstream>) {
    provider_with(ProviderConfig::new(1, "").with_address("0xabc"))
}

#[tokio::test]
async fn local_accounts_resolve_immediately() {
    let (provider, mut host, upstream) = ready_provider();
    let handle = provider.dispatch(
        RpcRequest::new("eth_accounts", JsonValue::Null),
        ResultShape::Unwrapped,
    );
    assert!(handle.is_ready());
    assert_eq!(handle.await.expect("accounts"), json!(["0xabc"]));

    assert_eq!(provider.request(RpcRequest::new("eth_chainId", json!([]))).await, Ok(json!("0x1")));
    assert_eq!(provider.request(RpcRequest::new("cfx_coinbase", json!([]))).await, Ok(json!("0xabc")));
    assert_eq!(provider.pending_len(), 0);
    assert!(host.try_recv().is_err());
    assert!(upstream.seen.lock().expect("seen").is_empty());
}

#[tokio::test]
async fn personal_sign_round_trips_through_the_host() {
    let (provider, mut host, _) = ready_provider();
    let request = RpcRequest::new("personal_sign", json!(["0x48656c6c6f", "0xabc"])).with_id("abc");
    let handle = provider.dispatch(request, ResultShape::Wrapped);
    assert!(!handle.is_ready());

    let message = host.recv().await.expect("host message");
    assert_eq!(message.method, HostHandler::SignPersonalMessage);
    assert_eq!(message.params, json!({"raw": "0x48656c6c6f", "data": "0x48656c6c6f"}));
    assert_eq!(handle.correlation_id(), Some(message.id));
    assert_eq!(
        serde_json::to_value(&message).expect("encode")["method"],
        json!("signPersonalMessage")
    );

    assert_eq!(provider.deliver_result(message.id, json!("0xsig")), Settlement::Delivered);
    assert_eq!(
        handle.await.expect("signed"),
        json!({"jsonrpc": "2.0", "id": "abc", "result": "0xsig"})
    );
    assert_eq!(provider.pending_len(), 0);
}

#[tokio::test]
async fn unknown_deliveries_are_tolerated() {
    let (provider, _host, _) = ready_provider();
    assert_eq!(provider.deliver_result(999_999, json!("x")), Settlement::NotFound);
    assert_eq!(provider.deliver_error(999_999, JsonValue::Null), Settlement::NotFound);
}

#[tokio::test]
async fn signing_before_an_address_is_known_fails_with_not_ready() {
    let (provider, mut host, _) = provider_with(ProviderConfig::new(1, ""));
    let err = provider
        .request(RpcRequest::new("eth_sendTransaction", json!([{"to": "0x1"}])))
        .await
        .expect_err("not ready");
    assert_eq!(err, ProviderError::NotReady);
    assert_eq!(err.code(), 4100);
    assert!(host.try_recv().is_err());
    assert_eq!(provider.pending_len(), 0);
}

#[tokio::test]
async fn account_request_bootstraps_the_address() {
    let (provider, mut host, _) = provider_with(ProviderConfig::new(1, ""));
    let handle = provider.dispatch(
        RpcRequest::new("eth_requestAccounts", json!([])),
        ResultShape::Unwrapped,
    );
    let message = host.recv().await.expect("requestAccounts posted");
    assert_eq!(message.method, HostHandler::RequestAccounts);
    assert_eq!(message.params, json!({}));

    provider.set_address("0xDEF");
    provider.deliver_result(message.id, json!(["0xdef"]));
    assert_eq!(handle.await.expect("accounts"), json!(["0xdef"]));
    assert!(provider.is_ready());
}

#[tokio::test]
async fn filters_are_rejected_without_side_effects() {
    let (provider, mut host, upstream) = ready_provider();
    let handle = provider.dispatch(
        RpcRequest::new("eth_newFilter", json!([{}])).with_id(3),
        ResultShape::Wrapped,
    );
    assert!(handle.is_ready());
    let err = handle.await.expect_err("unsupported");
    assert_eq!(err.code(), 4200);
    assert_eq!(provider.pending_len(), 0);
    assert!(host.try_recv().is_err());
    assert!(upstream.seen.lock().expect("seen").is_empty());
}

#[tokio::test]
async fn invalid_params_never_reach_the_host() {
    let (provider, mut host, _) = ready_provider();
    let err = provider
        .request(RpcRequest::new("personal_sign", json!([])))
        .await
        .expect_err("missing message");
    assert_eq!(err.code(), -32602);
    assert!(host.try_recv().is_err());
    assert_eq!(provider.pending_len(), 0);
}

#[tokio::test]
async fn upstream_responses_carry_the_callers_id() {
    let (provider, _host, upstream) = ready_provider();
    let envelope = provider
        .send_async(RpcRequest::new("eth_blockNumber", json!([])).with_id("block").into())
        .await
        .expect("block number");
    assert_eq!(envelope, json!({"jsonrpc": "2.0", "id": "block", "result": "eth_blockNumber-ok"}));

    let seen = upstream.seen.lock().expect("seen").clone();
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0].id, Some(RequestId::Number(_))));

    let err = provider.request(RpcRequest::new("eth_fail", json!([]))).await.expect_err("reverted");
    assert_eq!(err.code(), -32000);
    assert_eq!(err.to_rpc_error().message, "execution reverted");
}

#[tokio::test]
async fn batches_settle_in_request_order() {
    let (provider, _host, _) = ready_provider();
    let batch = CallPayload::Batch(vec![
        RpcRequest::new("net_version", json!([])).with_id(1),
        RpcRequest::new("eth_gasPrice", json!([])).with_id(2),
    ]);
    let responses = provider.send_async(batch).await.expect("batch");
    assert_eq!(
        responses,
        json!([
            {"jsonrpc": "2.0", "id": 1, "result": "1"},
            {"jsonrpc": "2.0", "id": 2, "result": "eth_gasPrice-ok"},
        ])
    );
    assert_eq!(provider.call("eth_chainId", json!([])).await, Ok(json!("0x1")));
}

#[tokio::test]
async fn duplicate_ids_follow_the_configured_policy() {
    let mut config = ProviderConfig::new(1, "").with_address("0xabc");
    config.duplicate_ids = DuplicateIdPolicy::Reject;
    let (provider, mut host, _) = provider_with(config);

    let first = provider.dispatch(
        RpcRequest::new("eth_sign", json!(["0xabc", "0x48656c6c6f"])).with_id(42),
        ResultShape::Unwrapped,
    );
    let second = provider.dispatch(
        RpcRequest::new("eth_sign", json!(["0xabc", "0x48656c6c6f"])).with_id(42),
        ResultShape::Unwrapped,
    );
    assert_eq!(second.await, Err(ProviderError::DuplicateId { id: 42 }));
    assert_eq!(host.recv().await.expect("first posted").id, 42);
    provider.deliver_result(42, json!("0xfirst"));
    assert_eq!(first.await, Ok(json!("0xfirst")));

    provider.set_config(ProviderConfig::new(1, "").with_address("0xabc"));
    let first = provider.dispatch(
        RpcRequest::new("eth_sign", json!(["0xabc", "0x00"])).with_id(43),
        ResultShape::Unwrapped,
    );
    let second = provider.dispatch(
        RpcRequest::new("eth_sign", json!(["0xabc", "0x00"])).with_id(43),
        ResultShape::Unwrapped,
    );
    assert_eq!(first.await, Err(ProviderError::Superseded { id: 43 }));
    provider.deliver_result(43, json!("0xsecond"));
    assert_eq!(second.await, Ok(json!("0xsecond")));
}

async fn assert_colliding_ids_restore(policy: DuplicateIdPolicy) {
    let mut config = ProviderConfig::new(1, "").with_address("0xabc");
    config.duplicate_ids = policy;
    let (provider, mut host, _) = provider_with(config);

    let first = provider.dispatch(
        RpcRequest::new("personal_sign", json!(["0x48656c6c6f", "0xabc"])).with_id("abc"),
        ResultShape::Wrapped,
    );
    let synthetic = host.recv().await.expect("first posted").id;

    let second = provider.dispatch(
        RpcRequest::new("personal_sign", json!(["0x00", "0xabc"])).with_id(synthetic),
        ResultShape::Wrapped,
    );
    let carried = host.recv().await.expect("second posted").id;
    assert_ne!(carried, synthetic);
    assert_eq!(provider.pending_len(), 2);

    provider.deliver_result(carried, json!("0xsecond"));
    provider.deliver_result(synthetic, json!("0xfirst"));
    assert_eq!(
        second.await.expect("second signed"),
        json!({"jsonrpc": "2.0", "id": synthetic, "result": "0xsecond"})
    );
    assert_eq!(
        first.await.expect("first signed"),
        json!({"jsonrpc": "2.0", "id": "abc", "result": "0xfirst"})
    );
    assert_eq!(provider.pending_len(), 0);
}

#[tokio::test]
async fn colliding_native_id_is_restored_under_reject() {
    assert_colliding_ids_restore(DuplicateIdPolicy::Reject).await;
}

#[tokio::test]
async fn colliding_native_id_is_restored_under_replace() {
    assert_colliding_ids_restore(DuplicateIdPolicy::Replace).await;
}

#[tokio::test]
async fn unversioned_typed_data_reaches_the_host_as_v3() {
    let (provider, mut host, _) = ready_provider();
    let typed = json!({"types": {}, "primaryType": "Mail", "domain": {}, "message": {}});
    let handle = provider.dispatch(
        RpcRequest::new("eth_signTypedData", json!(["0xabc", typed])).with_id(9),
        ResultShape::Unwrapped,
    );

    let message = host.recv().await.expect("posted");
    assert_eq!(message.method, HostHandler::SignTypedMessage);
    assert_eq!(message.params["version"], json!("v3"));
    provider.deliver_result(message.id, json!("0xtyped"));
    assert_eq!(handle.await, Ok(json!("0xtyped")));
}

#[tokio::test(start_paused = true)]
async fn expiry_times_out_abandoned_host_calls() {
    let mut config = ProviderConfig::new(1, "").with_address("0xabc");
    config.request_timeout_ms = Some(1_000);
    let (provider, mut host, _) = provider_with(config);
    let provider = Arc::new(provider);
    let sweeper = provider.spawn_expiry(Duration::from_millis(100));

    let handle = provider.dispatch(
        RpcRequest::new("wallet_switchEthereumChain", json!([{"chainId": "0x38"}])).with_id("switch"),
        ResultShape::Wrapped,
    );
    let message = host.recv().await.expect("posted");
    assert_eq!(message.method, HostHandler::SwitchEthereumChain);

    match handle.await {
        Err(ProviderError::Timeout { method, .. }) => assert_eq!(method, "wallet_switchEthereumChain"),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(provider.pending_len(), 0);
    assert_eq!(provider.deliver_result(message.id, json!(null)), Settlement::NotFound);

    drop(provider);
    tokio::time::advance(Duration::from_millis(200)).await;
    sweeper.await.expect("sweeper stops once the provider is gone");
}
