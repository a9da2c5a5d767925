//! Umbra tunnel construction and relaying
//!
//! Multi-hop encrypted tunnels built with per-hop records that are hybrid
//! encrypted (sealed asymmetric envelope for the addressed fields, AES-GCM
//! for the bulk instructions) and layer encrypted so that every hop can read
//! exactly its own instructions and nothing else. Established hops relay
//! layered payloads: gateway in, participants along the path, endpoint out.

pub mod build;
pub mod error;
pub mod hop;
pub mod manager;

pub use build::{
    create_build, BuildRecord, BuildReplyRecord, BuildReplyStatus, EncryptedBuildRecord, HopInfo,
    HopKeys, HopRole, PendingBuild, TunnelBuild, TunnelBuildReply,
};
pub use error::{Result, TunnelError};
pub use hop::{peel_layer, wrap_layers, TunnelHop, TunnelStep};
pub use manager::{BuildAction, EstablishedTunnel, TunnelManager};

#[cfg(test)]
mod tests {
    #[test]
    fn test_placeholder() {
        assert_eq!(2 + 2, 4);
    }
}
