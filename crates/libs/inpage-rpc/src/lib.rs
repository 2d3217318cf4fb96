//! JSON-RPC wire types shared by the inpage provider and the hosts that embed it.
//!
//! - [`RpcRequest`] / [`RpcResponse`] as seen by pages and upstream nodes
//! - [`HostMessage`] / [`HostDelivery`] exchanged with the native wallet
//! - JSON framing ([`codec`])

pub mod codec;
pub mod types;

pub use types::{
    CallPayload, HostDelivery, HostHandler, HostMessage, HostOutcome, RequestId, RpcErrorObject,
    RpcRequest, RpcResponse, JSONRPC_VERSION,
};
