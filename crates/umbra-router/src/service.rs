//! Router service dispatch
//!
//! Stateless across messages except through the network database and the
//! tunnel manager: each inbound datagram is parsed, validated and dispatched
//! once, producing at most one logical unit of work. Integrity failures and
//! expired envelopes are dropped without a reply; an unknown message type is
//! rejected loudly at parse time.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use umbra_crypto::RouterIdentity;
use umbra_netdb::{DatabaseStore, NetDb, Record, RouterAddress, RouterInfo};
use umbra_protocol::messages::{from_payload, to_payload};
use umbra_protocol::{
    DatabaseLookup, DatabaseSearchReply, DeliveryStatus, Envelope, MessageType, RecordHash,
    ReplyPath, TunnelData, TunnelId,
};
use umbra_tunnel::{
    create_build, BuildAction, BuildReplyStatus, EstablishedTunnel, HopInfo, TunnelBuild,
    TunnelBuildReply, TunnelManager, TunnelStep,
};

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::transport::Transport;

/// Get current timestamp in epoch milliseconds
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// The protocol state machine for one router
pub struct RouterService {
    config: RouterConfig,
    identity: RouterIdentity,
    local_info: RouterInfo,
    local_hash: RecordHash,
    netdb: Arc<NetDb>,
    tunnels: Mutex<TunnelManager>,
    transport: Arc<dyn Transport>,
    local_delivery_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl RouterService {
    /// Create a service around the given identity and transport
    ///
    /// Builds and signs this router's own RouterInfo from the configured
    /// address and publishes it into the local database, as a booting router
    /// does.
    pub fn new(
        config: RouterConfig,
        identity: RouterIdentity,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let address = RouterAddress::new(config.host.clone(), config.routing_port);
        let local_info = RouterInfo::new(&identity, address);
        let local_hash = local_info.hash();

        let netdb = Arc::new(NetDb::new(local_hash));
        netdb.store(Record::RouterInfo(local_info.clone()));

        info!(local = %local_hash, addr = %local_info.address, "router service initialized");

        RouterService {
            config,
            identity,
            local_info,
            local_hash,
            netdb,
            tunnels: Mutex::new(TunnelManager::new()),
            transport,
            local_delivery_tx: None,
        }
    }

    /// This router's published record
    pub fn local_info(&self) -> &RouterInfo {
        &self.local_info
    }

    /// Identity hash this router goes by
    pub fn local_hash(&self) -> RecordHash {
        self.local_hash
    }

    /// The shared network database
    pub fn netdb(&self) -> &NetDb {
        &self.netdb
    }

    /// Create a channel for payloads delivered by a local tunnel endpoint
    pub fn create_local_delivery_channel() -> (
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        mpsc::unbounded_channel()
    }

    /// Set the local delivery channel
    pub fn set_local_delivery_channel(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) {
        self.local_delivery_tx = Some(tx);
    }

    /// Confirmed tunnel for a build this router originated
    pub async fn established_tunnel(&self, send_msg_id: u32) -> Option<EstablishedTunnel> {
        self.tunnels.lock().await.established(send_msg_id).cloned()
    }

    /// Blocking receive loop: one datagram processed to completion at a time
    pub async fn run(self: Arc<Self>, socket: Arc<UdpSocket>) -> Result<()> {
        let mut buf = vec![0u8; 65536];
        loop {
            let (len, src) = socket.recv_from(&mut buf).await?;
            if let Err(e) = self.handle_datagram(&buf[..len], src).await {
                error!(error = %e, %src, "failed to process datagram");
            }
        }
    }

    /// Validate and dispatch one inbound datagram
    pub async fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) -> Result<()> {
        // Malformed input and unknown types are rejected here, loudly.
        let envelope = Envelope::decode(bytes)?;

        // Integrity and expiry are expected adversarial/lifecycle
        // conditions: drop, log, never reply.
        if !envelope.verify_checksum() {
            warn!(%src, msg_id = envelope.msg_id, "checksum mismatch, dropping");
            return Ok(());
        }
        if envelope.is_expired(now_ms()) {
            debug!(%src, msg_id = envelope.msg_id, "expired envelope, dropping");
            return Ok(());
        }

        match envelope.msg_type {
            MessageType::DatabaseLookup => self.handle_lookup(&envelope, src).await,
            MessageType::DatabaseStore => self.handle_store(&envelope, src).await,
            MessageType::DatabaseSearchReply => self.handle_search_reply(&envelope),
            MessageType::DeliveryStatus => self.handle_delivery_status(&envelope),
            MessageType::TunnelBuild => self.handle_tunnel_build(&envelope).await,
            MessageType::TunnelBuildReply => self.handle_tunnel_build_reply(&envelope).await,
            MessageType::TunnelData => self.handle_tunnel_data(&envelope).await,
        }
    }

    async fn handle_lookup(&self, envelope: &Envelope, src: SocketAddr) -> Result<()> {
        let lookup: DatabaseLookup = from_payload(&envelope.payload)?;

        if let ReplyPath::Tunnel(tunnel) = lookup.reply {
            // TODO: route the reply through the named return tunnel once
            // client-bound tunnel delivery lands
            warn!(%tunnel, "tunnel lookup replies not supported yet, dropping");
            return Ok(());
        }

        match self.netdb.lookup(&lookup.key) {
            Some(record) => {
                debug!(key = %lookup.key, "lookup hit, replying with record");
                let store = DatabaseStore {
                    key: lookup.key,
                    record,
                    reply_token: 0,
                };
                self.send_message(MessageType::DatabaseStore, &store, src)
                    .await
            }
            None => {
                let peers = self
                    .netdb
                    .k_closest_router_infos(&lookup.key, self.config.search_redundancy);
                debug!(key = %lookup.key, candidates = peers.len(), "lookup miss, replying with closest peers");

                let reply = DatabaseSearchReply {
                    key: lookup.key,
                    from: self.local_hash,
                    peer_hashes: peers.iter().map(|info| info.hash()).collect(),
                };
                self.send_message(MessageType::DatabaseSearchReply, &reply, src)
                    .await
            }
        }
    }

    async fn handle_store(&self, envelope: &Envelope, src: SocketAddr) -> Result<()> {
        let store: DatabaseStore = from_payload(&envelope.payload)?;
        let hash = store.record.hash();

        // A record with a bad signature is dropped inside the database;
        // acknowledging or flooding it would launder garbage.
        if !self.netdb.store(store.record.clone()) {
            return Ok(());
        }

        if store.reply_token == 0 {
            return Ok(());
        }

        let status = DeliveryStatus {
            msg_id: store.reply_token,
            timestamp: now_ms(),
        };
        self.send_message(MessageType::DeliveryStatus, &status, src)
            .await?;

        self.flood(hash, store.record).await;
        Ok(())
    }

    /// Forward a freshly stored record to the peers closest to it
    ///
    /// Best-effort per peer: a refused or hung send is logged and skipped,
    /// never retried, and bounded so one dead peer cannot wedge dispatch.
    async fn flood(&self, hash: RecordHash, record: Record) {
        let candidates = self
            .netdb
            .k_closest_router_infos(&hash, self.config.flood_redundancy + 2);

        let peers: Vec<RouterInfo> = candidates
            .into_iter()
            .filter(|info| info.hash() != hash && info.hash() != self.local_hash)
            .take(self.config.flood_redundancy)
            .collect();

        for peer in peers {
            let addr = match resolve_address(&peer.address) {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(peer = %peer.hash(), error = %e, "skipping flood peer");
                    continue;
                }
            };

            let store = DatabaseStore {
                key: hash,
                record: record.clone(),
                reply_token: 0,
            };
            let bound = Duration::from_millis(self.config.flood_timeout_ms);
            match timeout(bound, self.send_message(MessageType::DatabaseStore, &store, addr)).await
            {
                Ok(Ok(())) => debug!(peer = %peer.hash(), %addr, "flooded record"),
                Ok(Err(e)) => warn!(peer = %peer.hash(), %addr, error = %e, "flood send failed"),
                Err(_) => warn!(peer = %peer.hash(), %addr, "flood send timed out"),
            }
        }
    }

    fn handle_search_reply(&self, envelope: &Envelope) -> Result<()> {
        let reply: DatabaseSearchReply = from_payload(&envelope.payload)?;
        debug!(
            key = %reply.key,
            from = %reply.from,
            candidates = reply.peer_hashes.len(),
            "search reply received"
        );
        Ok(())
    }

    fn handle_delivery_status(&self, envelope: &Envelope) -> Result<()> {
        let status: DeliveryStatus = from_payload(&envelope.payload)?;
        info!(msg_id = status.msg_id, timestamp = status.timestamp, "store acknowledged");
        Ok(())
    }

    async fn handle_tunnel_build(&self, envelope: &Envelope) -> Result<()> {
        let build: TunnelBuild = from_payload(&envelope.payload)?;

        let action = {
            let mut tunnels = self.tunnels.lock().await;
            tunnels.process_build(
                build,
                &self.local_hash.prefix(),
                &self.identity.router_id().encryption_key,
                self.identity.encryption_secret(),
            )?
        };

        match action {
            BuildAction::Forward { next_ident, build } => {
                let addr = self.resolve_peer(&next_ident)?;
                debug!(next = %next_ident, "forwarding tunnel build");
                self.send_message(MessageType::TunnelBuild, &build, addr)
                    .await
            }
            BuildAction::Reply { to, tunnel, reply } => {
                // The reply travels straight to the originator; routing it
                // through the named reply tunnel is future work.
                let addr = self.resolve_peer(&to)?;
                debug!(originator = %to, %tunnel, "endpoint returning build reply");
                self.send_message(MessageType::TunnelBuildReply, &reply, addr)
                    .await
            }
        }
    }

    async fn handle_tunnel_build_reply(&self, envelope: &Envelope) -> Result<()> {
        let reply: TunnelBuildReply = from_payload(&envelope.payload)?;

        let statuses = {
            let mut tunnels = self.tunnels.lock().await;
            tunnels.complete_build(&reply)?
        };

        if statuses
            .iter()
            .all(|status| *status == BuildReplyStatus::Accept)
        {
            info!(send_msg_id = reply.send_msg_id, hops = statuses.len(), "tunnel established");
        } else {
            warn!(send_msg_id = reply.send_msg_id, ?statuses, "tunnel build rejected by a hop");
        }
        Ok(())
    }

    async fn handle_tunnel_data(&self, envelope: &Envelope) -> Result<()> {
        let data: TunnelData = from_payload(&envelope.payload)?;

        let step = {
            let tunnels = self.tunnels.lock().await;
            tunnels.handle_data(&data.tunnel_id, &data.data)?
        };

        match step {
            TunnelStep::Forward { to, tunnel, data } => {
                let addr = self.resolve_peer(&to)?;
                let message = TunnelData {
                    tunnel_id: tunnel,
                    data,
                };
                self.send_message(MessageType::TunnelData, &message, addr)
                    .await
            }
            TunnelStep::Deliver { data } => {
                debug!(bytes = data.len(), "tunnel endpoint delivering payload");
                if let Some(tx) = &self.local_delivery_tx {
                    let _ = tx.send(data);
                }
                Ok(())
            }
        }
    }

    /// Send a lookup for `key` to a peer
    pub async fn query_remote(&self, key: RecordHash, addr: SocketAddr) -> Result<()> {
        let lookup = DatabaseLookup {
            key,
            from: self.local_hash,
            reply: ReplyPath::Direct,
        };
        self.send_message(MessageType::DatabaseLookup, &lookup, addr)
            .await
    }

    /// Publish a record to a peer, optionally requesting an acknowledgment
    pub async fn publish_remote(
        &self,
        record: Record,
        reply_token: u32,
        addr: SocketAddr,
    ) -> Result<()> {
        let store = DatabaseStore {
            key: record.hash(),
            record,
            reply_token,
        };
        self.send_message(MessageType::DatabaseStore, &store, addr)
            .await
    }

    /// Originate a tunnel across the given path
    ///
    /// Registers the pending build and hands the onion-wrapped request to
    /// the gateway. Returns the message id the build reply will carry.
    pub async fn build_tunnel(&self, path: &[HopInfo], reply_tunnel: TunnelId) -> Result<u32> {
        let (build, pending) = create_build(self.local_hash, reply_tunnel, path)?;
        let send_msg_id = pending.send_msg_id;
        let gateway = path[0].ident;

        {
            let mut tunnels = self.tunnels.lock().await;
            tunnels.register_pending(pending);
        }

        let addr = self.resolve_peer(&gateway)?;
        info!(%gateway, send_msg_id, hops = path.len(), "requesting tunnel build");
        self.send_message(MessageType::TunnelBuild, &build, addr)
            .await?;
        Ok(send_msg_id)
    }

    /// Resolve a peer's datagram address through the database
    fn resolve_peer(&self, ident: &RecordHash) -> Result<SocketAddr> {
        let record = self
            .netdb
            .lookup(ident)
            .ok_or_else(|| RouterError::PeerUnresolvable(ident.to_string()))?;

        match record.as_router_info() {
            Some(info) => resolve_address(&info.address),
            None => Err(RouterError::PeerUnresolvable(ident.to_string())),
        }
    }

    /// Wrap a payload in a fresh envelope and hand it to the transport
    async fn send_message<T: serde::Serialize>(
        &self,
        msg_type: MessageType,
        message: &T,
        addr: SocketAddr,
    ) -> Result<()> {
        let payload = to_payload(message)?;
        let envelope = Envelope::new(
            msg_type,
            rand::random(),
            now_ms() + self.config.message_ttl_ms,
            payload,
        )?;
        self.transport.send_to(addr, &envelope.encode()).await
    }
}

/// Parse a published router address into a socket address
fn resolve_address(address: &RouterAddress) -> Result<SocketAddr> {
    format!("{}:{}", address.host, address.port)
        .parse()
        .map_err(|_| RouterError::PeerUnresolvable(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_address() {
        let addr = resolve_address(&RouterAddress::new("127.0.0.1", 4100)).unwrap();
        assert_eq!(addr, "127.0.0.1:4100".parse().unwrap());

        assert!(resolve_address(&RouterAddress::new("not an address", 0)).is_err());
    }
}
