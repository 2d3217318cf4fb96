use inpage_rpc::{RequestId, JSONRPC_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::correlator::IdCorrelator;
use crate::error::ProviderError;

pub type CallOutcome = Result<JsonValue, ProviderError>;

/// How a settled value is handed back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultShape {
    /// `{"jsonrpc": "2.0", "id": <caller id>, "result": value}`
    Wrapped,
    /// The bare value.
    Unwrapped,
}

/// What happens when a call is registered under an id that is still pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateIdPolicy {
    /// The newer call takes over the id; the older caller gets `Superseded`.
    #[default]
    Replace,
    /// The newer call fails with `DuplicateId`; the older one stays pending.
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Delivered,
    /// The entry existed but its caller had already dropped the handle.
    CallerGone,
    NotFound,
}

struct PendingCall {
    method: String,
    shape: ResultShape,
    registered_at: Instant,
    tx: oneshot::Sender<CallOutcome>,
}

/// Outstanding host-delegated calls keyed by correlation id.
///
/// Each entry is removed before its continuation runs, so an id settles at
/// most once no matter how many deliveries the host sends.
pub struct PendingCalls {
    calls: Mutex<HashMap<u64, PendingCall>>,
    correlator: Arc<IdCorrelator>,
    policy: Mutex<DuplicateIdPolicy>,
}

impl PendingCalls {
    pub fn new(correlator: Arc<IdCorrelator>, policy: DuplicateIdPolicy) -> Self {
        Self { calls: Mutex::new(HashMap::new()), correlator, policy: Mutex::new(policy) }
    }

    pub fn set_policy(&self, policy: DuplicateIdPolicy) {
        *self.policy.lock().expect("duplicate policy mutex poisoned") = policy;
    }

    pub fn policy(&self) -> DuplicateIdPolicy {
        *self.policy.lock().expect("duplicate policy mutex poisoned")
    }

    pub fn register(
        &self,
        id: u64,
        method: &str,
        shape: ResultShape,
    ) -> Result<oneshot::Receiver<CallOutcome>, ProviderError> {
        let policy = self.policy();
        let (tx, rx) = oneshot::channel();
        let call =
            PendingCall { method: method.to_string(), shape, registered_at: Instant::now(), tx };
        let replaced = {
            let mut calls = self.calls.lock().expect("pending calls mutex poisoned");
            if policy == DuplicateIdPolicy::Reject && calls.contains_key(&id) {
                log::warn!("rejecting {method}: request id {id} is already pending");
                return Err(ProviderError::DuplicateId { id });
            }
            calls.insert(id, call)
        };
        if let Some(previous) = replaced {
            log::warn!(
                "request id {id} re-registered by {method}; superseding pending {}",
                previous.method
            );
            let _ = previous.tx.send(Err(ProviderError::Superseded { id }));
        }
        Ok(rx)
    }

    /// Settles `id` with a value, restoring the caller's original id for
    /// wrapped results.
    pub fn resolve(&self, id: u64, value: JsonValue) -> Settlement {
        let Some(call) = self.take(id) else {
            log::warn!("{}", ProviderError::CallbackNotFound { id });
            return Settlement::NotFound;
        };
        let restored = self.correlator.restore(id);
        let payload = shape_result(call.shape, restored, value);
        deliver(id, call, Ok(payload))
    }

    pub fn reject(&self, id: u64, error: ProviderError) -> Settlement {
        let Some(call) = self.take(id) else {
            log::warn!("{} (dropping error: {error})", ProviderError::CallbackNotFound { id });
            return Settlement::NotFound;
        };
        self.correlator.forget(id);
        deliver(id, call, Err(error))
    }

    pub fn has(&self, id: u64) -> bool {
        self.calls.lock().expect("pending calls mutex poisoned").contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().expect("pending calls mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects every call pending for longer than `ttl` with `Timeout` and
    /// frees its id mapping. Returns the expired ids.
    pub fn expire(&self, ttl: Duration) -> Vec<u64> {
        let now = Instant::now();
        let expired = {
            let mut calls = self.calls.lock().expect("pending calls mutex poisoned");
            let ids = calls
                .iter()
                .filter(|(_, call)| now.duration_since(call.registered_at) >= ttl)
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();
            ids.into_iter()
                .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                .collect::<Vec<_>>()
        };
        let mut ids = Vec::with_capacity(expired.len());
        for (id, call) in expired {
            self.correlator.forget(id);
            let elapsed_ms =
                u64::try_from(now.duration_since(call.registered_at).as_millis()).unwrap_or(u64::MAX);
            log::warn!("{} (id {id}) expired after {elapsed_ms} ms", call.method);
            let error = ProviderError::Timeout { id, method: call.method.clone(), elapsed_ms };
            deliver(id, call, Err(error));
            ids.push(id);
        }
        ids
    }

    /// Rejects every pending call with `error`. Used when the host goes away.
    pub fn fail_all(&self, error: &ProviderError) -> usize {
        let drained = self
            .calls
            .lock()
            .expect("pending calls mutex poisoned")
            .drain()
            .collect::<Vec<_>>();
        let count = drained.len();
        for (id, call) in drained {
            self.correlator.forget(id);
            deliver(id, call, Err(error.clone()));
        }
        count
    }

    fn take(&self, id: u64) -> Option<PendingCall> {
        self.calls.lock().expect("pending calls mutex poisoned").remove(&id)
    }
}

fn deliver(id: u64, call: PendingCall, outcome: CallOutcome) -> Settlement {
    match call.tx.send(outcome) {
        Ok(()) => Settlement::Delivered,
        Err(_) => {
            log::debug!("caller for {} (id {id}) went away before settlement", call.method);
            Settlement::CallerGone
        }
    }
}

/// Applies `shape` to a settled value.
///
/// A wrapped value that already is a JSON-RPC envelope with a `result`
/// contributes only that `result`.
pub fn shape_result(shape: ResultShape, id: RequestId, value: JsonValue) -> JsonValue {
    match shape {
        ResultShape::Unwrapped => value,
        ResultShape::Wrapped => {
            let result = match value {
                JsonValue::Object(mut envelope)
                    if envelope.contains_key("jsonrpc")
                        && envelope.get("result").is_some_and(|result| !result.is_null()) =>
                {
                    envelope.remove("result").unwrap_or_default()
                }
                other => other,
            };
            json!({ "jsonrpc": JSONRPC_VERSION, "id": JsonValue::from(id), "result": result })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inpage_rpc::RpcRequest;

    fn registry(policy: DuplicateIdPolicy) -> (Arc<IdCorrelator>, PendingCalls) {
        let correlator = Arc::new(IdCorrelator::new());
        let calls = PendingCalls::new(correlator.clone(), policy);
        (correlator, calls)
    }

    #[tokio::test]
    async fn resolve_wraps_with_restored_id() {
        let (correlator, calls) = registry(DuplicateIdPolicy::Replace);
        let mut request = RpcRequest::new("personal_sign", json!([])).with_id("abc");
        let id = correlator.normalize(&mut request).id;
        let rx = calls.register(id, "personal_sign", ResultShape::Wrapped).expect("register");

        assert_eq!(calls.resolve(id, json!("0xsig")), Settlement::Delivered);
        let value = rx.await.expect("settled").expect("ok");
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": "abc", "result": "0xsig"}));
        assert!(!correlator.is_mapped(id));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn second_settlement_is_a_no_op() {
        let (_, calls) = registry(DuplicateIdPolicy::Replace);
        let rx = calls.register(5, "eth_sendTransaction", ResultShape::Unwrapped).expect("register");

        assert_eq!(calls.resolve(5, json!("0x1")), Settlement::Delivered);
        assert_eq!(calls.resolve(5, json!("0x2")), Settlement::NotFound);
        assert_eq!(calls.reject(5, ProviderError::NotReady), Settlement::NotFound);
        assert_eq!(rx.await.expect("settled"), Ok(json!("0x1")));
    }

    #[test]
    fn unknown_ids_are_tolerated() {
        let (_, calls) = registry(DuplicateIdPolicy::Replace);
        assert_eq!(calls.resolve(999_999, json!("x")), Settlement::NotFound);
        assert_eq!(calls.reject(999_999, ProviderError::NotReady), Settlement::NotFound);
    }

    #[test]
    fn dropped_callers_still_free_the_entry() {
        let (_, calls) = registry(DuplicateIdPolicy::Replace);
        let rx = calls.register(11, "eth_sign", ResultShape::Wrapped).expect("register");
        drop(rx);
        assert_eq!(calls.resolve(11, json!("late")), Settlement::CallerGone);
        assert!(!calls.has(11));
    }

    #[tokio::test]
    async fn replace_policy_supersedes_previous_caller() {
        let (_, calls) = registry(DuplicateIdPolicy::Replace);
        let first = calls.register(3, "eth_sign", ResultShape::Unwrapped).expect("first");
        let second = calls.register(3, "personal_sign", ResultShape::Unwrapped).expect("second");

        assert_eq!(first.await.expect("settled"), Err(ProviderError::Superseded { id: 3 }));
        calls.resolve(3, json!("0xsig"));
        assert_eq!(second.await.expect("settled"), Ok(json!("0xsig")));
    }

    #[tokio::test]
    async fn reject_policy_keeps_first_caller() {
        let (_, calls) = registry(DuplicateIdPolicy::Reject);
        let first = calls.register(3, "eth_sign", ResultShape::Unwrapped).expect("first");
        let err = calls.register(3, "personal_sign", ResultShape::Unwrapped).expect_err("dup");
        assert_eq!(err, ProviderError::DuplicateId { id: 3 });

        calls.resolve(3, json!("0xsig"));
        assert_eq!(first.await.expect("settled"), Ok(json!("0xsig")));
    }

    #[tokio::test(start_paused = true)]
    async fn expire_rejects_with_timeout_and_frees_mapping() {
        let (correlator, calls) = registry(DuplicateIdPolicy::Replace);
        let mut request = RpcRequest::new("eth_requestAccounts", json!([])).with_id("boot");
        let id = correlator.normalize(&mut request).id;
        let rx = calls.register(id, "eth_requestAccounts", ResultShape::Wrapped).expect("register");

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(calls.expire(Duration::from_millis(100)).is_empty());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(calls.expire(Duration::from_millis(100)), vec![id]);
        assert!(!calls.has(id));
        assert!(!correlator.is_mapped(id));
        match rx.await.expect("settled") {
            Err(ProviderError::Timeout { id: expired, method, .. }) => {
                assert_eq!(expired, id);
                assert_eq!(method, "eth_requestAccounts");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn wrapped_envelopes_are_not_double_wrapped() {
        let envelope = json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"});
        let shaped = shape_result(ResultShape::Wrapped, RequestId::from("x"), envelope.clone());
        assert_eq!(shaped, json!({"jsonrpc": "2.0", "id": "x", "result": "0x10"}));

        let raw = shape_result(ResultShape::Unwrapped, RequestId::Number(1), envelope.clone());
        assert_eq!(raw, envelope);
    }
}
