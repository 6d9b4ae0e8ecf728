//! Client-side driver and its seams.
//!
//! This module provides the dual-role driver that represents one
//! application participant, the transport abstraction it speaks
//! through, and the identity cache that makes reconnection possible.

mod cache;
mod driver;
mod transport;
mod ws;

pub use cache::{CachedIdentity, IdentityCache, MemoryCache};
pub use driver::{is_host, AdmissionPredicate, Driver, DriverConfig, DriverPhase, Reducer};
pub use transport::{ChannelConnector, ChannelTransport, ClientTransport, Connector};
pub use ws::WsConnector;
