//! End-to-end scenarios over the public node API.

use std::sync::Arc;

use tokio::sync::Mutex;

use unicrium_chain::config::GenesisAccount;
use unicrium_chain::merkle::MerkleTree;
use unicrium_chain::vm::StaticCodeInterpreter;
use unicrium_chain::{
    Blockchain, COIN, ChainConfig, KeyPair, MemoryStore, RocksDbStore, TxKind, TxPayload, p2p,
};

type MemNode = Blockchain<MemoryStore, StaticCodeInterpreter>;

fn mem_node(cfg: ChainConfig) -> MemNode {
    Blockchain::new(cfg, MemoryStore::new(), StaticCodeInterpreter::default()).unwrap()
}

fn devnet_with(allocations: &[(&KeyPair, u64)]) -> ChainConfig {
    let mut cfg = ChainConfig::devnet();
    cfg.staking.min_validator_stake = 1_000;
    for (kp, balance) in allocations {
        cfg.genesis.allocations.push(GenesisAccount {
            address: kp.address(),
            balance: *balance,
        });
    }
    cfg
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[test]
fn deterministic_genesis() {
    let a = mem_node(ChainConfig::default());
    let b = mem_node(ChainConfig::default());

    assert_eq!(a.height(), 0);
    assert_eq!(a.total_minted(), 16_400_000 * COIN);

    // The same allocations must hash to the same state root on every
    // run.
    assert_eq!(a.state_root(), b.state_root());

    let founder = "0xacffecb00b07a53d61c38edccd7f74de83e36bf0".parse().unwrap();
    assert_eq!(a.get_balance(&founder), 5_000_000 * COIN);
}

#[test]
fn transfer_shifts_balances_and_nonce() {
    let producer_key = KeyPair::from_seed("producer").unwrap();
    let alice = KeyPair::from_seed("alice").unwrap();
    let bob = KeyPair::from_seed("bob").unwrap();

    let mut node = mem_node(devnet_with(&[(&alice, 1_000 * COIN)]));

    let tx = TxPayload::new(
        alice.address(),
        0,
        TxKind::Transfer {
            recipient: bob.address(),
            amount: 100 * COIN,
        },
        10 * COIN,
        now(),
    )
    .sign(&alice);
    node.add_transaction(tx).unwrap();

    let block = node.produce_block(&producer_key).unwrap();

    assert_eq!(node.get_balance(&alice.address()), 890 * COIN);
    assert_eq!(node.get_balance(&bob.address()), 100 * COIN);
    assert_eq!(node.get_nonce(&alice.address()), 1);
    assert!(block.total_fees >= 10 * COIN);
}

#[test]
fn committed_nonces_are_contiguous() {
    let producer_key = KeyPair::from_seed("producer").unwrap();
    let alice = KeyPair::from_seed("alice").unwrap();
    let bob = KeyPair::from_seed("bob").unwrap();

    let mut node = mem_node(devnet_with(&[(&alice, 1_000 * COIN)]));

    for nonce in 0..5 {
        let tx = TxPayload::new(
            alice.address(),
            nonce,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: COIN,
            },
            1,
            now(),
        )
        .sign(&alice);
        node.add_transaction(tx).unwrap();
    }
    node.produce_block(&producer_key).unwrap();

    assert_eq!(node.get_nonce(&alice.address()), 5);
    assert_eq!(node.get_balance(&bob.address()), 5 * COIN);
}

#[test]
fn block_links_and_signatures_hold_across_the_chain() {
    let producer_key = KeyPair::from_seed("producer").unwrap();
    let mut node = mem_node(devnet_with(&[]));

    for _ in 0..5 {
        node.produce_block(&producer_key).unwrap();
    }

    for height in 1..=5u64 {
        let block = node.get_block(height).unwrap().unwrap();
        let prev = node.get_block(height - 1).unwrap().unwrap();
        assert_eq!(block.prev_hash, prev.hash);
        assert_eq!(block.hash, block.compute_hash());
        assert!(block.verify_signature());
    }
}

#[test]
fn merkle_proofs_verify_for_included_transactions() {
    let producer_key = KeyPair::from_seed("producer").unwrap();
    let alice = KeyPair::from_seed("alice").unwrap();
    let bob = KeyPair::from_seed("bob").unwrap();

    let mut node = mem_node(devnet_with(&[(&alice, 1_000 * COIN)]));
    for nonce in 0..3 {
        let tx = TxPayload::new(
            alice.address(),
            nonce,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: COIN,
            },
            1,
            now(),
        )
        .sign(&alice);
        node.add_transaction(tx).unwrap();
    }

    let block = node.produce_block(&producer_key).unwrap();
    assert_eq!(block.transactions.len(), 3);

    let tx_ids = block.tx_ids();
    let tree = MerkleTree::new(tx_ids.clone());
    assert_eq!(tree.root(), block.tx_root);

    for (index, tx_id) in tx_ids.iter().enumerate() {
        let proof = tree.get_proof(index).unwrap();
        assert!(MerkleTree::verify_proof(tx_id, &proof, &block.tx_root));
    }
}

#[test]
fn total_supply_stays_within_the_cap() {
    let producer_key = KeyPair::from_seed("producer").unwrap();
    let alice = KeyPair::from_seed("alice").unwrap();
    let bob = KeyPair::from_seed("bob").unwrap();

    let mut node = mem_node(devnet_with(&[(&alice, 1_000 * COIN)]));
    for nonce in 0..3 {
        let tx = TxPayload::new(
            alice.address(),
            nonce,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: COIN,
            },
            1,
            now(),
        )
        .sign(&alice);
        node.add_transaction(tx).unwrap();
        node.produce_block(&producer_key).unwrap();
    }

    let cfg = node.config();
    assert!(node.total_minted() <= cfg.tokenomics.max_supply);
    // Fees burn out of circulation, so account totals never exceed what
    // was minted.
    assert!(node.ledger().total_supply() <= node.total_minted());
}

#[test]
fn rocksdb_restart_preserves_height_and_state_root() {
    let producer_key = KeyPair::from_seed("producer").unwrap();
    let alice = KeyPair::from_seed("alice").unwrap();
    let bob = KeyPair::from_seed("bob").unwrap();

    let tmp = tempfile::TempDir::new().unwrap();
    let mut cfg = devnet_with(&[(&alice, 1_000 * COIN)]);
    cfg.storage.data_dir = tmp.path().to_string_lossy().to_string();

    let (height, root) = {
        let store = RocksDbStore::open(&cfg.storage).unwrap();
        let mut node =
            Blockchain::new(cfg.clone(), store, StaticCodeInterpreter::default()).unwrap();
        assert!(!node.was_restored());

        let tx = TxPayload::new(
            alice.address(),
            0,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: 100 * COIN,
            },
            10 * COIN,
            now(),
        )
        .sign(&alice);
        node.add_transaction(tx).unwrap();
        node.produce_block(&producer_key).unwrap();
        (node.height(), node.state_root())
    };

    let store = RocksDbStore::open(&cfg.storage).unwrap();
    let node = Blockchain::new(cfg, store, StaticCodeInterpreter::default()).unwrap();
    assert!(node.was_restored());
    assert_eq!(node.height(), height);
    assert_eq!(node.state_root(), root);
    assert_eq!(node.get_balance(&bob.address()), 100 * COIN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_nodes_converge_after_resync() {
    let producer_key = KeyPair::from_seed("producer").unwrap();

    let fresh = || {
        let mut cfg = ChainConfig::devnet();
        cfg.staking.min_validator_stake = 1_000;
        Arc::new(Mutex::new(mem_node(cfg)))
    };
    let chain_a = fresh();
    let chain_b = fresh();

    {
        let mut a = chain_a.lock().await;
        for _ in 0..4 {
            a.produce_block(&producer_key).unwrap();
        }
    }

    let mut p2p_cfg_a = unicrium_chain::P2pConfig::default();
    p2p_cfg_a.listen_addr = "127.0.0.1:0".to_string();
    let a = p2p::start(p2p_cfg_a, chain_a.clone()).await.unwrap();

    let mut p2p_cfg_b = unicrium_chain::P2pConfig::default();
    p2p_cfg_b.listen_addr = "127.0.0.1:0".to_string();
    p2p_cfg_b.bootstrap_peers = vec![a.local_addr().to_string()];
    let b = p2p::start(p2p_cfg_b, chain_b.clone()).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    b.sync_now().await;

    let mut synced = false;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if chain_b.lock().await.height() == 4 {
            synced = true;
            break;
        }
    }
    assert!(synced);

    let a_chain = chain_a.lock().await;
    let b_chain = chain_b.lock().await;
    for height in 1..=4u64 {
        assert_eq!(
            a_chain.get_block(height).unwrap().unwrap().hash,
            b_chain.get_block(height).unwrap().unwrap().hash
        );
    }
    drop((a_chain, b_chain));

    a.stop().await;
    b.stop().await;
}
