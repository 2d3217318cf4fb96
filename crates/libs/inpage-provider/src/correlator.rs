use inpage_rpc::{RequestId, RpcRequest};
use rand_core::{OsRng, RngCore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const ID_JITTER_RANGE: u32 = 1000;

/// The numeric id a request travels under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Normalized {
    pub id: u64,
    /// Whether a mapping was recorded for this request. Only then does a
    /// failed registration own the mapping to clean up.
    pub mapped: bool,
}

/// Maps caller-supplied request ids onto numeric correlation ids and back.
///
/// Generated ids are wall-clock milliseconds plus a random offset below
/// 1000, bumped past the last issued id so they are strictly increasing for
/// the lifetime of the correlator.
#[derive(Debug, Default)]
pub struct IdCorrelator {
    last_issued: AtomicU64,
    originals: Mutex<HashMap<u64, RequestId>>,
}

impl IdCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        let jitter = u64::from(OsRng.next_u32() % ID_JITTER_RANGE);
        let candidate = unix_millis().saturating_add(jitter);
        let mut last = self.last_issued.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last.saturating_add(1));
            match self.last_issued.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }

    /// Ensures `request.id` is numeric and returns it.
    ///
    /// Absent ids get a fresh number with nothing to restore. Non-numeric ids
    /// get a fresh number and the original is remembered until [`restore`]
    /// or [`forget`] consumes it. A native number that equals a live
    /// correlation id is treated the same way, so it can never be mistaken
    /// for the other caller's mapping.
    ///
    /// [`restore`]: IdCorrelator::restore
    /// [`forget`]: IdCorrelator::forget
    pub fn normalize(&self, request: &mut RpcRequest) -> Normalized {
        let normalized = match request.id.take() {
            None => Normalized { id: self.next_id(), mapped: false },
            Some(original) => {
                let mut originals = self.originals.lock().expect("id mapping mutex poisoned");
                match original {
                    RequestId::Number(id) if !originals.contains_key(&id) => {
                        Normalized { id, mapped: false }
                    }
                    original => {
                        let id = self.next_id();
                        log::trace!("correlating request id {:?} as {id}", original);
                        originals.insert(id, original);
                        Normalized { id, mapped: true }
                    }
                }
            }
        };
        request.id = Some(RequestId::Number(normalized.id));
        normalized
    }

    /// Like [`normalize`](IdCorrelator::normalize) but keeps the original id
    /// on the caller's side instead of in the mapping table. Used where the
    /// response is awaited inline and nothing can outlive the caller.
    pub fn normalize_unmapped(&self, request: &mut RpcRequest) -> RequestId {
        match request.id.take() {
            Some(RequestId::Number(id)) => {
                request.id = Some(RequestId::Number(id));
                RequestId::Number(id)
            }
            original => {
                let id = self.next_id();
                request.id = Some(RequestId::Number(id));
                original.unwrap_or(RequestId::Number(id))
            }
        }
    }

    /// Consumes the mapping for `id`, returning the caller's original id, or
    /// `id` itself when the caller supplied it natively.
    pub fn restore(&self, id: u64) -> RequestId {
        self.forget(id).unwrap_or(RequestId::Number(id))
    }

    pub fn forget(&self, id: u64) -> Option<RequestId> {
        self.originals.lock().expect("id mapping mutex poisoned").remove(&id)
    }

    pub fn is_mapped(&self, id: u64) -> bool {
        self.originals.lock().expect("id mapping mutex poisoned").contains_key(&id)
    }

    pub fn mapped_len(&self) -> usize {
        self.originals.lock().expect("id mapping mutex poisoned").len()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
