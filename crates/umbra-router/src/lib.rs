//! Umbra router service
//!
//! The protocol state machine tying the pieces together: datagrams come in
//! from the transport boundary, are validated (checksum, expiration) and
//! dispatched by type; the network database is consulted or mutated and
//! reply or flood envelopes go back out. Tunnel-build and tunnel-data
//! messages are handed to the tunnel manager.

pub mod config;
pub mod error;
pub mod service;
pub mod transport;

pub use config::RouterConfig;
pub use error::{Result, RouterError};
pub use service::RouterService;
pub use transport::{MockTransport, Transport, UdpTransport};
