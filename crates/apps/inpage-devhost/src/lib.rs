//! Line-oriented development host for the inpage provider.
//!
//! Each stdin line is a JSON [`Inbound`](protocol::Inbound) command; each
//! stdout line is a JSON [`Outbound`](protocol::Outbound) record. A wallet
//! shell (or a person with a terminal) plays the host: it answers `host`
//! lines with `deliver` lines carrying the same id.

pub mod protocol;
pub mod session;

pub use protocol::{Inbound, Outbound};
pub use session::{run, Session};
