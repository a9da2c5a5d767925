//! Router configuration
//!
//! One immutable struct, built once at startup by the bootstrap layer and
//! passed into each component. Nothing here is global or mutable at runtime.

use serde::{Deserialize, Serialize};

/// Default number of closest peers named in a search reply
pub const DEFAULT_SEARCH_REDUNDANCY: usize = 3;

/// Default number of closest peers a stored record is flooded to
pub const DEFAULT_FLOOD_REDUNDANCY: usize = 2;

/// Router runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Host this router advertises
    pub host: String,

    /// Port the routing protocol listens on
    pub routing_port: u16,

    /// Port the client session transport listens on
    pub session_port: u16,

    /// Bootstrap peer, as "host:port"
    pub bootstrap: Option<String>,

    /// Closest peers named in a DatabaseSearchReply
    pub search_redundancy: usize,

    /// Closest peers a stored record is flooded to
    pub flood_redundancy: usize,

    /// Lifetime stamped on outbound envelopes (milliseconds)
    pub message_ttl_ms: i64,

    /// Upper bound on a single flood send (milliseconds); a hung peer must
    /// not wedge the dispatch loop
    pub flood_timeout_ms: u64,
}

impl RouterConfig {
    /// Configuration for a router reachable at the given host and port
    pub fn new(host: impl Into<String>, routing_port: u16, session_port: u16) -> Self {
        RouterConfig {
            host: host.into(),
            routing_port,
            session_port,
            bootstrap: None,
            search_redundancy: DEFAULT_SEARCH_REDUNDANCY,
            flood_redundancy: DEFAULT_FLOOD_REDUNDANCY,
            message_ttl_ms: 60_000,
            flood_timeout_ms: 5_000,
        }
    }

    /// Set the bootstrap peer
    pub fn with_bootstrap(mut self, bootstrap: impl Into<String>) -> Self {
        self.bootstrap = Some(bootstrap.into());
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig::new("127.0.0.1", 4100, 4101)
    }
}
