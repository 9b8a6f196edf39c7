// chain/src/main.rs
//
// Validator node binary wiring up the chain library:
//
// - RocksDB-backed storage under `blockchain_data/`
// - ledger + mempool + stake-weighted block producer
// - EVM contract adapter (placeholder interpreter)
// - TCP peer overlay with bootstrap dialing and backfill sync
// - graceful shutdown on ctrl-c

use std::sync::Arc;

use tokio::signal;
use tokio::sync::Mutex;

use unicrium_chain::vm::StaticCodeInterpreter;
use unicrium_chain::{Blockchain, ChainConfig, KeyPair, RocksDbStore, p2p, spawn_producer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "unicrium_chain=info,unicrium_node=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    // Defaults for now; a config file / CLI layer can replace this.
    let mut cfg = ChainConfig::default();
    if let Ok(data_dir) = std::env::var("UNICRIUM_DATA_DIR") {
        cfg.storage.data_dir = data_dir;
    }
    if let Ok(peers) = std::env::var("UNICRIUM_BOOTSTRAP_PEERS") {
        cfg.p2p.bootstrap_peers = peers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // ---------------------------
    // Node identity
    // ---------------------------

    let keypair = match std::env::var("UNICRIUM_NODE_KEY") {
        Ok(key_hex) => KeyPair::from_private_key_hex(key_hex.trim())
            .map_err(|e| format!("invalid UNICRIUM_NODE_KEY: {e}"))?,
        Err(_) => {
            let kp = KeyPair::generate();
            tracing::warn!(
                address = %kp.address(),
                "UNICRIUM_NODE_KEY not set, generated an ephemeral identity"
            );
            kp
        }
    };
    tracing::info!(address = %keypair.address(), chain_id = %cfg.chain_id, "starting node");

    // ---------------------------
    // Storage + chain state
    // ---------------------------

    let store = RocksDbStore::open(&cfg.storage)
        .map_err(|e| format!("failed to open storage at {}: {e}", cfg.storage.data_dir))?;

    let interpreter = StaticCodeInterpreter::new(&cfg.contracts);
    let node = Blockchain::new(cfg.clone(), store, interpreter)
        .map_err(|e| format!("failed to initialize chain: {e}"))?;
    tracing::info!(height = node.height(), "chain ready");

    let signal_handle = node.mempool_signal();
    let shared = Arc::new(Mutex::new(node));

    // ---------------------------
    // Block producer
    // ---------------------------

    let producer = spawn_producer(shared.clone(), keypair, signal_handle);

    // ---------------------------
    // Peer networking
    // ---------------------------

    let network = p2p::start(cfg.p2p.clone(), shared.clone())
        .await
        .map_err(|e| format!("failed to start p2p listener on {}: {e}", cfg.p2p.listen_addr))?;
    tracing::info!(addr = %network.local_addr(), node_id = %network.node_id(), "p2p ready");

    // ---------------------------
    // Run until ctrl-c
    // ---------------------------

    signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {e}"))?;
    tracing::info!("shutdown signal received");

    producer.stop().await;
    network.stop().await;

    let node = shared.lock().await;
    tracing::info!(height = node.height(), "node stopped");
    Ok(())
}
