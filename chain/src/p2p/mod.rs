//! Peer-to-peer overlay.
//!
//! Transport is TCP with newline-delimited JSON frames. Every frame is
//! an [`Envelope`] `{type, data, sender_id, timestamp}`; the message
//! types are tabulated on [`kind`]. A node that boots without local
//! chain data dials its bootstrap peers as a client; a node with data
//! only listens.
//!
//! Task layout: one accept loop, one reader task per connection, one
//! writer task per connection (fed through a channel), one maintenance
//! task (ping + stale-peer eviction), and one sync task that polls peer
//! heights and backfills missing blocks from the highest-advertised
//! peer. Chain mutations all go through the shared node mutex, so the
//! block producer and the network serialize on the same critical
//! section.
//!
//! Failure modes: a socket error drops the connection and its writer;
//! malformed frames are logged and skipped without tearing the
//! connection down; network errors never affect chain state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::config::P2pConfig;
use crate::crypto::sha256_hex;
use crate::node::Blockchain;
use crate::storage::ChainStore;
use crate::types::{Block, Transaction};
use crate::vm::Interpreter;

/// Wire message types.
pub mod kind {
    pub const HANDSHAKE: &str = "handshake";
    pub const PEERS: &str = "peers";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const GET_BLOCK: &str = "get_block";
    pub const BLOCK: &str = "block";
    pub const TX: &str = "tx";
}

/// Frame envelope carried on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub sender_id: String,
    pub timestamp: u64,
}

impl Envelope {
    fn new(kind: &str, data: Value, sender_id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            sender_id: sender_id.to_string(),
            timestamp: unix_now(),
        }
    }

    fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("envelope is always serializable");
        line.push('\n');
        line
    }
}

/// Handshake payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandshakeData {
    pub node_id: String,
    pub chain_height: u64,
    pub version: String,
}

/// A known peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    /// `host:port` this peer is known under.
    pub address: String,
    pub node_id: String,
    #[serde(default)]
    pub chain_height: u64,
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub version: String,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generates the node identity: first 16 hex characters of
/// `sha256(hostname ‖ startup time)`.
fn generate_node_id() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    sha256_hex(format!("{hostname}{now}").as_bytes())[..16].to_string()
}

struct Inner<S, I> {
    node_id: String,
    config: P2pConfig,
    chain: Arc<Mutex<Blockchain<S, I>>>,
    peers: Mutex<HashMap<String, Peer>>,
    /// peer address → writer-channel for outgoing lines.
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a running P2P node.
pub struct P2pHandle<S, I> {
    inner: Arc<Inner<S, I>>,
    local_addr: std::net::SocketAddr,
}

/// Starts the P2P stack over a shared chain node: listener, bootstrap
/// dials (client mode only), maintenance, and the sync loop.
pub async fn start<S, I>(
    config: P2pConfig,
    chain: Arc<Mutex<Blockchain<S, I>>>,
) -> std::io::Result<P2pHandle<S, I>>
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let listener = TcpListener::bind(&config.listen_addr).await?;
    let local_addr = listener.local_addr()?;

    let client_mode = !chain.lock().await.was_restored();
    let inner = Arc::new(Inner {
        node_id: generate_node_id(),
        config,
        chain,
        peers: Mutex::new(HashMap::new()),
        connections: Mutex::new(HashMap::new()),
        tasks: Mutex::new(Vec::new()),
    });

    tracing::info!(addr = %local_addr, node_id = %inner.node_id, "p2p node listening");

    let accept = tokio::spawn(accept_loop(inner.clone(), listener));
    let maintenance = tokio::spawn(maintenance_loop(inner.clone()));
    let sync = tokio::spawn(sync_loop(inner.clone()));
    inner.tasks.lock().await.extend([accept, maintenance, sync]);

    if client_mode {
        let bootstrap = inner.config.bootstrap_peers.clone();
        tracing::info!(?bootstrap, "client mode, dialing bootstrap peers");
        for addr in bootstrap {
            let dialer = inner.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = connect_to_peer(dialer, addr.clone()).await {
                    tracing::warn!(peer = %addr, error = %e, "bootstrap dial failed");
                }
            });
            inner.tasks.lock().await.push(task);
        }
    }

    Ok(P2pHandle { inner, local_addr })
}

impl<S, I> P2pHandle<S, I>
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// This node's wire identity.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Currently known peers.
    pub async fn peers(&self) -> Vec<Peer> {
        self.inner.peers.lock().await.values().cloned().collect()
    }

    /// Dials a peer immediately (outside the bootstrap path).
    pub async fn connect(&self, addr: &str) -> std::io::Result<()> {
        connect_to_peer(self.inner.clone(), addr.to_string()).await
    }

    /// Runs one sync round now instead of waiting for the poller.
    pub async fn sync_now(&self) {
        sync_once(&self.inner).await;
    }

    /// Pushes a transaction to every connected peer.
    pub async fn broadcast_transaction(&self, tx: &Transaction) {
        broadcast(&self.inner, kind::TX, serde_json::to_value(tx).unwrap_or(Value::Null)).await;
    }

    /// Pushes a freshly committed block to every connected peer.
    pub async fn broadcast_block(&self, block: &Block) {
        broadcast(
            &self.inner,
            kind::BLOCK,
            serde_json::to_value(block).unwrap_or(Value::Null),
        )
        .await;
    }

    /// Stops all network tasks and drops every connection.
    pub async fn stop(self) {
        let tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        for task in tasks {
            task.abort();
        }
        self.inner.connections.lock().await.clear();
        tracing::info!("p2p node stopped");
    }
}

async fn accept_loop<S, I>(inner: Arc<Inner<S, I>>, listener: TcpListener)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let peer_addr = remote.to_string();
                tracing::debug!(peer = %peer_addr, "inbound connection");
                register_connection(inner.clone(), stream, peer_addr, false).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Dials a peer and sends our handshake.
async fn connect_to_peer<S, I>(inner: Arc<Inner<S, I>>, addr: String) -> std::io::Result<()>
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    if inner.connections.lock().await.contains_key(&addr) {
        return Ok(());
    }
    let stream = TcpStream::connect(&addr).await?;
    register_connection(inner.clone(), stream, addr.clone(), true).await;

    let handshake = handshake_envelope(&inner).await;
    send_line(&inner, &addr, handshake.to_line()).await;
    tracing::info!(peer = %addr, "connected to peer");
    Ok(())
}

async fn handshake_envelope<S, I>(inner: &Arc<Inner<S, I>>) -> Envelope
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let chain_height = inner.chain.lock().await.height();
    Envelope::new(
        kind::HANDSHAKE,
        json!(HandshakeData {
            node_id: inner.node_id.clone(),
            chain_height,
            version: inner.config.version.clone(),
        }),
        &inner.node_id,
    )
}

/// Splits a stream into a channel-fed writer task and a line-oriented
/// reader task, both registered for shutdown.
async fn register_connection<S, I>(
    inner: Arc<Inner<S, I>>,
    stream: TcpStream,
    peer_addr: String,
    initiated: bool,
) where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    inner.connections.lock().await.insert(peer_addr.clone(), tx);

    let writer = tokio::spawn(writer_task(write_half, rx, peer_addr.clone()));
    let reader = tokio::spawn(reader_task(inner.clone(), read_half, peer_addr, initiated));
    inner.tasks.lock().await.extend([writer, reader]);
}

async fn writer_task(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    peer_addr: String,
) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            tracing::debug!(peer = %peer_addr, error = %e, "write failed, closing");
            break;
        }
    }
}

async fn reader_task<S, I>(
    inner: Arc<Inner<S, I>>,
    read_half: tokio::net::tcp::OwnedReadHalf,
    peer_addr: String,
    initiated: bool,
) where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if !process_message(&inner, &line, &peer_addr, initiated).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(peer = %peer_addr, error = %e, "read failed");
                break;
            }
        }
    }
    drop_connection(&inner, &peer_addr).await;
}

async fn drop_connection<S, I>(inner: &Arc<Inner<S, I>>, peer_addr: &str) {
    inner.connections.lock().await.remove(peer_addr);
    if let Some(peer) = inner.peers.lock().await.get_mut(peer_addr) {
        peer.connected = false;
    }
    tracing::debug!(peer = %peer_addr, "connection dropped");
}

/// Handles one frame. Returns `false` when the connection must close
/// (handshake with self). Malformed frames are logged and skipped.
async fn process_message<S, I>(
    inner: &Arc<Inner<S, I>>,
    line: &str,
    peer_addr: &str,
    initiated: bool,
) -> bool
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(peer = %peer_addr, error = %e, "malformed frame, skipping");
            return true;
        }
    };

    match envelope.kind.as_str() {
        kind::HANDSHAKE => handle_handshake(inner, envelope, peer_addr, initiated).await,
        kind::PEERS => {
            handle_peers(inner, envelope).await;
            true
        }
        kind::PING => {
            send_message(inner, peer_addr, kind::PONG, json!({})).await;
            true
        }
        kind::PONG => {
            if let Some(peer) = inner.peers.lock().await.get_mut(peer_addr) {
                peer.last_seen = unix_now();
            }
            true
        }
        kind::GET_BLOCK => {
            handle_get_block(inner, envelope, peer_addr).await;
            true
        }
        kind::BLOCK => {
            handle_block(inner, envelope).await;
            true
        }
        kind::TX => {
            handle_tx(inner, envelope, peer_addr).await;
            true
        }
        other => {
            tracing::debug!(peer = %peer_addr, kind = other, "unknown message type, skipping");
            true
        }
    }
}

async fn handle_handshake<S, I>(
    inner: &Arc<Inner<S, I>>,
    envelope: Envelope,
    peer_addr: &str,
    initiated: bool,
) -> bool
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let data: HandshakeData = match serde_json::from_value(envelope.data) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(peer = %peer_addr, error = %e, "bad handshake payload");
            return true;
        }
    };

    // A handshake from ourselves means a loop; close immediately.
    if data.node_id == inner.node_id {
        tracing::warn!(peer = %peer_addr, "handshake from self, closing connection");
        return false;
    }

    tracing::info!(peer = %peer_addr, node_id = %data.node_id, height = data.chain_height, "handshake");
    inner.peers.lock().await.insert(
        peer_addr.to_string(),
        Peer {
            address: peer_addr.to_string(),
            node_id: data.node_id,
            chain_height: data.chain_height,
            last_seen: unix_now(),
            connected: true,
            version: data.version,
        },
    );

    // Inbound connections answer with their own handshake; the dialer
    // already sent one.
    if !initiated {
        let reply = handshake_envelope(inner).await;
        send_line(inner, peer_addr, reply.to_line()).await;
    }

    // Either way, share our peer table.
    let peers: Vec<Peer> = inner
        .peers
        .lock()
        .await
        .values()
        .take(20)
        .cloned()
        .collect();
    send_message(inner, peer_addr, kind::PEERS, json!({ "peers": peers })).await;
    true
}

async fn handle_peers<S, I>(inner: &Arc<Inner<S, I>>, envelope: Envelope)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let Some(list) = envelope.data.get("peers").and_then(Value::as_array) else {
        return;
    };
    for entry in list {
        let Ok(peer) = serde_json::from_value::<Peer>(entry.clone()) else {
            continue;
        };
        let known = inner.peers.lock().await.contains_key(&peer.address);
        let at_capacity = inner.peers.lock().await.len() >= inner.config.max_peers;
        if known || at_capacity {
            continue;
        }
        let dialer = inner.clone();
        let address = peer.address.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = connect_to_peer(dialer, address.clone()).await {
                tracing::debug!(peer = %address, error = %e, "gossip dial failed");
            }
        });
        inner.tasks.lock().await.push(task);
    }
}

async fn handle_get_block<S, I>(inner: &Arc<Inner<S, I>>, envelope: Envelope, peer_addr: &str)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let Some(height) = envelope.data.get("height").and_then(Value::as_u64) else {
        return;
    };
    let block = inner.chain.lock().await.get_block(height);
    match block {
        Ok(Some(block)) => {
            let data = serde_json::to_value(&block).unwrap_or(Value::Null);
            send_message(inner, peer_addr, kind::BLOCK, data).await;
            tracing::debug!(height, peer = %peer_addr, "served block");
        }
        Ok(None) => {
            tracing::debug!(height, peer = %peer_addr, "block not found");
        }
        Err(e) => {
            tracing::error!(height, error = %e, "block lookup failed");
        }
    }
}

async fn handle_block<S, I>(inner: &Arc<Inner<S, I>>, envelope: Envelope)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let block: Block = match serde_json::from_value(envelope.data) {
        Ok(block) => block,
        Err(e) => {
            tracing::warn!(error = %e, "bad block payload");
            return;
        }
    };

    let mut chain = inner.chain.lock().await;
    let current = chain.height();
    if block.height == current + 1 {
        let height = block.height;
        match chain.import_block(block) {
            Ok(()) => tracing::info!(height, "block synced"),
            Err(e) => tracing::warn!(height, error = %e, "block rejected"),
        }
    } else if block.height > current + 1 {
        // We are behind by more than one block; let the sync round pull
        // the gap in order.
        drop(chain);
        tracing::info!(received = block.height, local = current, "future block, resyncing");
        sync_once(inner).await;
    }
}

async fn handle_tx<S, I>(inner: &Arc<Inner<S, I>>, envelope: Envelope, peer_addr: &str)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let tx: Transaction = match serde_json::from_value(envelope.data) {
        Ok(tx) => tx,
        Err(e) => {
            tracing::warn!(peer = %peer_addr, error = %e, "bad tx payload");
            return;
        }
    };
    match inner.chain.lock().await.add_transaction(tx) {
        Ok(txid) => tracing::debug!(peer = %peer_addr, txid = %&txid[..16], "tx admitted from peer"),
        Err(e) => tracing::debug!(peer = %peer_addr, error = %e, "tx from peer rejected"),
    }
}

async fn send_message<S, I>(inner: &Arc<Inner<S, I>>, peer_addr: &str, msg_kind: &str, data: Value)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let envelope = Envelope::new(msg_kind, data, &inner.node_id);
    send_line(inner, peer_addr, envelope.to_line()).await;
}

async fn send_line<S, I>(inner: &Arc<Inner<S, I>>, peer_addr: &str, line: String) {
    let mut connections = inner.connections.lock().await;
    if let Some(sender) = connections.get(peer_addr) {
        if sender.send(line).is_err() {
            connections.remove(peer_addr);
            tracing::debug!(peer = %peer_addr, "writer gone, connection removed");
        }
    }
}

async fn broadcast<S, I>(inner: &Arc<Inner<S, I>>, msg_kind: &str, data: Value)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let targets: Vec<String> = inner.connections.lock().await.keys().cloned().collect();
    for peer_addr in targets {
        send_message(inner, &peer_addr, msg_kind, data.clone()).await;
    }
}

/// Pings live peers and evicts those unseen for too long.
async fn maintenance_loop<S, I>(inner: Arc<Inner<S, I>>)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let ping_interval = Duration::from_secs(inner.config.ping_interval_secs.max(1));
    loop {
        tokio::time::sleep(ping_interval).await;

        let now = unix_now();
        let stale: Vec<String> = inner
            .peers
            .lock()
            .await
            .iter()
            .filter(|(_, peer)| now.saturating_sub(peer.last_seen) > inner.config.peer_timeout_secs)
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in stale {
            tracing::info!(peer = %addr, "evicting stale peer");
            inner.peers.lock().await.remove(&addr);
            inner.connections.lock().await.remove(&addr);
        }

        broadcast(&inner, kind::PING, json!({})).await;
    }
}

/// Initial sync after a short settle delay, then periodic height polls.
async fn sync_loop<S, I>(inner: Arc<Inner<S, I>>)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    tokio::time::sleep(Duration::from_secs(5)).await;
    sync_once(&inner).await;

    let interval = Duration::from_secs(inner.config.sync_interval_secs.max(1));
    loop {
        tokio::time::sleep(interval).await;
        if !inner.peers.lock().await.is_empty() {
            sync_once(&inner).await;
        }
    }
}

/// One sync round: find the highest-advertised peer and request every
/// missing block in order, paced at roughly one request per 100 ms.
/// Blocks arrive asynchronously and commit on-order in
/// [`handle_block`].
async fn sync_once<S, I>(inner: &Arc<Inner<S, I>>)
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let local_height = inner.chain.lock().await.height();

    let best = inner
        .peers
        .lock()
        .await
        .values()
        .filter(|peer| peer.chain_height > local_height)
        .max_by_key(|peer| peer.chain_height)
        .map(|peer| (peer.address.clone(), peer.chain_height));

    let Some((peer_addr, target_height)) = best else {
        tracing::debug!(height = local_height, "no peers ahead");
        return;
    };

    tracing::info!(
        from = local_height + 1,
        to = target_height,
        peer = %peer_addr,
        "syncing missing blocks"
    );
    for height in (local_height + 1)..=target_height {
        send_message(inner, &peer_addr, kind::GET_BLOCK, json!({ "height": height })).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::crypto::KeyPair;
    use crate::storage::MemoryStore;
    use crate::types::{TxKind, TxPayload};
    use crate::vm::StaticCodeInterpreter;

    type TestChain = Blockchain<MemoryStore, StaticCodeInterpreter>;

    fn test_chain() -> Arc<Mutex<TestChain>> {
        let mut cfg = ChainConfig::devnet();
        cfg.staking.min_validator_stake = 1_000;
        let node =
            Blockchain::new(cfg, MemoryStore::new(), StaticCodeInterpreter::default()).unwrap();
        Arc::new(Mutex::new(node))
    }

    fn p2p_config(bootstrap: Vec<String>) -> P2pConfig {
        P2pConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            bootstrap_peers: bootstrap,
            ..P2pConfig::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handshake_populates_peer_tables() {
        let chain_a = test_chain();
        let chain_b = test_chain();

        let a = start(p2p_config(vec![]), chain_a).await.unwrap();
        let b = start(
            p2p_config(vec![a.local_addr().to_string()]),
            chain_b,
        )
        .await
        .unwrap();

        settle().await;

        let b_peers = b.peers().await;
        assert_eq!(b_peers.len(), 1, "b should know a");
        assert_eq!(b_peers[0].node_id, a.node_id());

        let a_peers = a.peers().await;
        assert_eq!(a_peers.len(), 1, "a should know b");
        assert_eq!(a_peers[0].node_id, b.node_id());

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resync_catches_up_to_the_highest_peer() {
        let producer_key = KeyPair::from_seed("producer").unwrap();
        let chain_a = test_chain();
        let chain_b = test_chain();

        // A is ahead by five blocks.
        let mut expected_hashes = Vec::new();
        {
            let mut a = chain_a.lock().await;
            for _ in 0..5 {
                let block = a.produce_block(&producer_key).unwrap();
                expected_hashes.push(block.hash.clone());
            }
        }

        let a = start(p2p_config(vec![]), chain_a.clone()).await.unwrap();
        let b = start(
            p2p_config(vec![a.local_addr().to_string()]),
            chain_b.clone(),
        )
        .await
        .unwrap();

        settle().await;
        b.sync_now().await;

        // Blocks arrive asynchronously; wait for the chain to catch up.
        let mut synced = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if chain_b.lock().await.height() == 5 {
                synced = true;
                break;
            }
        }
        assert!(synced, "b failed to sync to a's height");

        let b_chain = chain_b.lock().await;
        for (i, expected) in expected_hashes.iter().enumerate() {
            let block = b_chain.get_block(i as u64 + 1).unwrap().unwrap();
            assert_eq!(&block.hash, expected, "hash mismatch at height {}", i + 1);
        }
        assert_eq!(
            b_chain.state_root(),
            chain_a.lock().await.state_root(),
            "states must converge"
        );
        drop(b_chain);

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn self_handshake_closes_the_connection() {
        use tokio::io::AsyncReadExt;

        let chain = test_chain();
        let node = start(p2p_config(vec![]), chain).await.unwrap();

        // Pose as a peer that advertises the node's own identity.
        let mut stream = TcpStream::connect(node.local_addr()).await.unwrap();
        let forged = Envelope::new(
            kind::HANDSHAKE,
            json!(HandshakeData {
                node_id: node.node_id().to_string(),
                chain_height: 0,
                version: "2.0.0".to_string(),
            }),
            node.node_id(),
        );
        stream.write_all(forged.to_line().as_bytes()).await.unwrap();

        // The node must drop the connection without replying.
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
            .await
            .expect("connection should close promptly")
            .unwrap();
        assert_eq!(read, 0, "no reply expected on a self-handshake");
        assert!(node.peers().await.is_empty());

        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transaction_push_reaches_the_peer_mempool() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let bob = KeyPair::from_seed("bob").unwrap();

        // Fund the sender at genesis so both nodes consider the spend
        // valid.
        let funded_chain = || {
            let mut cfg = ChainConfig::devnet();
            cfg.staking.min_validator_stake = 1_000;
            cfg.genesis
                .allocations
                .push(crate::config::GenesisAccount {
                    address: alice.address(),
                    balance: 100_000,
                });
            let node =
                Blockchain::new(cfg, MemoryStore::new(), StaticCodeInterpreter::default())
                    .unwrap();
            Arc::new(Mutex::new(node))
        };
        let chain_a = funded_chain();
        let chain_b = funded_chain();

        let a = start(p2p_config(vec![]), chain_a.clone()).await.unwrap();
        let b = start(
            p2p_config(vec![a.local_addr().to_string()]),
            chain_b.clone(),
        )
        .await
        .unwrap();
        settle().await;

        let tx = TxPayload::new(
            alice.address(),
            0,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: 100,
            },
            10,
            unix_now(),
        )
        .sign(&alice);
        b.broadcast_transaction(&tx).await;

        let mut admitted = false;
        for _ in 0..30 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if chain_a.lock().await.mempool_size() == 1 {
                admitted = true;
                break;
            }
        }
        assert!(admitted, "peer mempool never saw the transaction");

        a.stop().await;
        b.stop().await;
    }
}
