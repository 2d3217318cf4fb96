use serde::{Deserialize, Serialize};

/// Provider notifications for page-side listeners, delivered through
/// `tokio::sync::broadcast`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ProviderEvent {
    #[serde(rename_all = "camelCase")]
    Connect { chain_id: String },
    AccountsChanged { accounts: Vec<String> },
    #[serde(rename_all = "camelCase")]
    ChainChanged { chain_id: String },
}

pub(crate) const EVENT_CAPACITY: usize = 64;
