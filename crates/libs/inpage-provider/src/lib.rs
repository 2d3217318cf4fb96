//! Wallet provider core for in-page JSON-RPC.
//!
//! A [`Provider`] classifies each request and either answers it from
//! [`ProviderState`], posts it to the native wallet through a [`HostSink`]
//! and waits for the matching [`HostDelivery`](inpage_rpc::HostDelivery), or
//! forwards it to an [`UpstreamRpc`] node. Callers always get a
//! [`ResponseHandle`] future.
//!
//! Host-bound calls are parked in [`PendingCalls`] under a numeric id from
//! the [`IdCorrelator`], which also restores string ids on the way back.

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod handle;
pub mod message;
pub mod provider;
pub mod registry;
pub mod router;
pub mod state;
pub mod upstream;

pub use bridge::{ChannelSink, HostBridge, HostSink};
pub use config::ProviderConfig;
pub use correlator::{IdCorrelator, Normalized};
pub use error::ProviderError;
pub use events::ProviderEvent;
pub use handle::ResponseHandle;
pub use provider::Provider;
pub use registry::{CallOutcome, DuplicateIdPolicy, PendingCalls, ResultShape, Settlement};
pub use router::{classify, Route};
pub use state::ProviderState;
pub use upstream::{HttpUpstream, UpstreamRpc};
