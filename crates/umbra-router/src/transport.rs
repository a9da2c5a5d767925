//! Transport boundary
//!
//! Serialized envelopes move between routers as datagrams. The service only
//! needs to send; receiving is the run loop's job. Tests swap the UDP socket
//! for a recording double.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::{Result, RouterError};

/// Outbound half of the datagram boundary
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one serialized envelope to a peer
    async fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> Result<()>;
}

/// UDP transport used in production
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind a socket on the given address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpTransport {
            socket: Arc::new(socket),
        })
    }

    /// Wrap an already bound socket
    pub fn from_socket(socket: Arc<UdpSocket>) -> Self {
        UdpTransport { socket }
    }

    /// The underlying socket, for the receive loop
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> Result<()> {
        self.socket
            .send_to(bytes, addr)
            .await
            .map_err(|e| RouterError::Transport(format!("send to {addr} failed: {e}")))?;
        Ok(())
    }
}

/// Recording transport double for tests
///
/// Captures every outbound datagram; addresses in `fail_addrs` refuse sends,
/// which lets tests exercise best-effort flooding.
#[derive(Default)]
pub struct MockTransport {
    sent: std::sync::Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    fail_addrs: std::sync::Mutex<HashSet<SocketAddr>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// Make sends to this address fail
    pub fn fail_for(&self, addr: SocketAddr) {
        self.fail_addrs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(addr);
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drain the send log
    pub fn take_sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(
            &mut *self
                .sent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> Result<()> {
        let failing = self
            .fail_addrs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&addr);
        if failing {
            return Err(RouterError::Transport(format!("mock failure for {addr}")));
        }

        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((addr, bytes.to_vec()));
        Ok(())
    }
}
