//! Transaction pool.
//!
//! The mempool deduplicates by transaction id, orders per-sender by
//! nonce, prioritizes by fee, and expires old entries. Admission signals
//! a [`Notify`] so the block producer can wake before its timer.
//!
//! Index discipline: `transactions` is the source of truth;
//! `by_sender`, `by_fee`, and `insertion_time` are kept consistent with
//! it under the node's lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;

use crate::error::MempoolError;
use crate::types::{Address, Transaction};

/// Aggregate mempool statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MempoolStats {
    pub size: usize,
    pub senders: usize,
    pub total_fees: u64,
    pub oldest_age_seconds: u64,
}

/// Pending-transaction pool with nonce ordering and fee priority.
pub struct Mempool {
    max_size: usize,
    max_age_secs: u64,
    /// txid → transaction.
    transactions: HashMap<String, Transaction>,
    /// sender → txids sorted by nonce ascending.
    by_sender: HashMap<Address, Vec<String>>,
    /// (fee, txid) sorted by fee descending.
    by_fee: Vec<(u64, String)>,
    /// txid → unix insertion time.
    insertion_time: HashMap<String, u64>,
    /// Edge-triggered "new transaction available" signal.
    new_tx: Arc<Notify>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Mempool {
    pub fn new(max_size: usize, max_age_secs: u64) -> Self {
        tracing::info!(max_size, max_age_secs, "mempool initialized");
        Self {
            max_size,
            max_age_secs,
            transactions: HashMap::new(),
            by_sender: HashMap::new(),
            by_fee: Vec::new(),
            insertion_time: HashMap::new(),
            new_tx: Arc::new(Notify::new()),
        }
    }

    /// Handle the producer waits on for early wakeups.
    pub fn signal(&self) -> Arc<Notify> {
        self.new_tx.clone()
    }

    /// Admits a transaction. Duplicates are rejected; when full, expired
    /// entries are evicted first and admission fails if none were.
    pub fn add(&mut self, tx: Transaction) -> Result<String, MempoolError> {
        self.add_at(tx, unix_now())
    }

    fn add_at(&mut self, tx: Transaction, now: u64) -> Result<String, MempoolError> {
        let txid = tx.txid();
        if self.transactions.contains_key(&txid) {
            return Err(MempoolError::Duplicate(txid));
        }
        if self.transactions.len() >= self.max_size {
            if self.evict_expired_at(now) == 0 {
                tracing::warn!(size = self.transactions.len(), "mempool full");
                return Err(MempoolError::Full);
            }
        }

        let sender = tx.sender();
        let fee = tx.fee();
        self.insertion_time.insert(txid.clone(), now);
        self.transactions.insert(txid.clone(), tx);

        let sender_txids = self.by_sender.entry(sender).or_default();
        sender_txids.push(txid.clone());
        let transactions = &self.transactions;
        sender_txids.sort_by_key(|tid| transactions[tid].nonce());

        self.by_fee.push((fee, txid.clone()));
        self.by_fee.sort_by(|a, b| b.0.cmp(&a.0));

        tracing::debug!(txid = %&txid[..16], %sender, fee, "transaction admitted");
        self.new_tx.notify_one();
        Ok(txid)
    }

    /// Removes a transaction from every index. Returns whether it was
    /// present.
    pub fn remove(&mut self, txid: &str) -> bool {
        let Some(tx) = self.transactions.remove(txid) else {
            return false;
        };
        self.insertion_time.remove(txid);

        if let Some(txids) = self.by_sender.get_mut(&tx.sender()) {
            txids.retain(|tid| tid != txid);
            if txids.is_empty() {
                self.by_sender.remove(&tx.sender());
            }
        }
        self.by_fee.retain(|(_, tid)| tid != txid);
        true
    }

    /// Removes a batch of txids (after a block commit). Returns how many
    /// were present.
    pub fn remove_batch(&mut self, txids: &[String]) -> usize {
        txids.iter().filter(|txid| self.remove(txid)).count()
    }

    pub fn get(&self, txid: &str) -> Option<&Transaction> {
        self.transactions.get(txid)
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.transactions.contains_key(txid)
    }

    /// All of a sender's pending transactions, nonce ascending.
    pub fn get_by_sender(&self, sender: &Address) -> Vec<&Transaction> {
        self.by_sender
            .get(sender)
            .map(|txids| txids.iter().map(|tid| &self.transactions[tid]).collect())
            .unwrap_or_default()
    }

    /// Senders with pending transactions.
    pub fn senders(&self) -> impl Iterator<Item = &Address> {
        self.by_sender.keys()
    }

    /// Transactions ready for inclusion: for each sender, the contiguous
    /// nonce run starting at its expected nonce; the harvest is sorted by
    /// fee descending and truncated to `max_count`. Gapped transactions
    /// stay in the pool.
    pub fn get_ready(
        &self,
        expected_nonces: &std::collections::BTreeMap<Address, u64>,
        max_count: usize,
    ) -> Vec<Transaction> {
        let mut ready: Vec<&Transaction> = Vec::new();

        for (sender, txids) in &self.by_sender {
            let mut expected = expected_nonces.get(sender).copied().unwrap_or(0);
            for txid in txids {
                let tx = &self.transactions[txid];
                if tx.nonce() == expected {
                    ready.push(tx);
                    expected += 1;
                } else if tx.nonce() > expected {
                    // Gap: stop harvesting this sender.
                    break;
                }
                // Stale nonces (below expected) are skipped; eviction
                // removes them after the block commit.
            }
        }

        ready.sort_by(|a, b| b.fee().cmp(&a.fee()));
        ready.into_iter().take(max_count).cloned().collect()
    }

    /// Top transactions by fee, regardless of nonce readiness.
    pub fn get_top_by_fee(&self, count: usize) -> Vec<&Transaction> {
        self.by_fee
            .iter()
            .take(count)
            .map(|(_, txid)| &self.transactions[txid])
            .collect()
    }

    /// Evicts transactions older than the configured maximum age.
    pub fn evict_expired(&mut self) -> usize {
        self.evict_expired_at(unix_now())
    }

    fn evict_expired_at(&mut self, now: u64) -> usize {
        let expired: Vec<String> = self
            .insertion_time
            .iter()
            .filter(|(_, &inserted)| now.saturating_sub(inserted) > self.max_age_secs)
            .map(|(txid, _)| txid.clone())
            .collect();
        for txid in &expired {
            self.remove(txid);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "evicted expired transactions");
        }
        expired.len()
    }

    pub fn size(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() >= self.max_size
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
        self.by_sender.clear();
        self.by_fee.clear();
        self.insertion_time.clear();
    }

    pub fn stats(&self) -> MempoolStats {
        let now = unix_now();
        MempoolStats {
            size: self.transactions.len(),
            senders: self.by_sender.len(),
            total_fees: self.transactions.values().map(|tx| tx.fee()).sum(),
            oldest_age_seconds: self
                .insertion_time
                .values()
                .map(|&t| now.saturating_sub(t))
                .max()
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::{TxKind, TxPayload};
    use std::collections::BTreeMap;

    fn transfer(kp: &KeyPair, nonce: u64, fee: u64) -> Transaction {
        let recipient = KeyPair::from_seed("recipient").unwrap().address();
        TxPayload::new(
            kp.address(),
            nonce,
            TxKind::Transfer {
                recipient,
                amount: 100,
            },
            fee,
            1_700_000_000 + nonce,
        )
        .sign(kp)
    }

    fn nonces(sender: Address, expected: u64) -> BTreeMap<Address, u64> {
        let mut m = BTreeMap::new();
        m.insert(sender, expected);
        m
    }

    #[test]
    fn duplicates_are_rejected() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(10, 3_600);
        let tx = transfer(&alice, 0, 10);

        pool.add(tx.clone()).unwrap();
        let err = pool.add(tx).unwrap_err();
        assert!(matches!(err, MempoolError::Duplicate(_)));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn full_pool_rejects_when_nothing_expires() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(2, 3_600);
        pool.add(transfer(&alice, 0, 1)).unwrap();
        pool.add(transfer(&alice, 1, 1)).unwrap();

        let err = pool.add(transfer(&alice, 2, 1)).unwrap_err();
        assert!(matches!(err, MempoolError::Full));
    }

    #[test]
    fn full_pool_evicts_expired_entries_first() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(2, 100);
        pool.add_at(transfer(&alice, 0, 1), 1_000).unwrap();
        pool.add_at(transfer(&alice, 1, 1), 1_000).unwrap();

        // Both entries are now 200s old; the third admission evicts them.
        pool.add_at(transfer(&alice, 2, 1), 1_200).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn ready_selection_stops_at_nonce_gap() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(10, 3_600);
        // Submit 0, 2, 1 out of order.
        pool.add(transfer(&alice, 0, 5)).unwrap();
        pool.add(transfer(&alice, 2, 5)).unwrap();
        pool.add(transfer(&alice, 1, 5)).unwrap();

        let ready = pool.get_ready(&nonces(alice.address(), 0), 10);
        let got: Vec<u64> = ready.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(got, vec![0, 1, 2]);

        // With nonce 1 missing, only nonce 0 is ready.
        let mut pool = Mempool::new(10, 3_600);
        pool.add(transfer(&alice, 0, 5)).unwrap();
        pool.add(transfer(&alice, 2, 5)).unwrap();
        let ready = pool.get_ready(&nonces(alice.address(), 0), 10);
        let got: Vec<u64> = ready.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(got, vec![0]);
        assert_eq!(pool.size(), 2, "gapped tx stays pooled");
    }

    #[test]
    fn ready_selection_skips_stale_nonces() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(10, 3_600);
        pool.add(transfer(&alice, 0, 5)).unwrap();
        pool.add(transfer(&alice, 1, 5)).unwrap();

        // Ledger already consumed nonce 0.
        let ready = pool.get_ready(&nonces(alice.address(), 1), 10);
        let got: Vec<u64> = ready.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(got, vec![1]);
    }

    #[test]
    fn ready_selection_orders_by_fee_across_senders() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let bob = KeyPair::from_seed("bob").unwrap();
        let mut pool = Mempool::new(10, 3_600);
        pool.add(transfer(&alice, 0, 1)).unwrap();
        pool.add(transfer(&bob, 0, 50)).unwrap();

        let mut expected = BTreeMap::new();
        expected.insert(alice.address(), 0);
        expected.insert(bob.address(), 0);

        let ready = pool.get_ready(&expected, 10);
        assert_eq!(ready[0].sender(), bob.address());
        assert_eq!(ready[1].sender(), alice.address());

        // max_count truncates after the fee sort.
        let top = pool.get_ready(&expected, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].sender(), bob.address());
    }

    #[test]
    fn remove_batch_clears_all_indexes() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(10, 3_600);
        let tx0 = transfer(&alice, 0, 1);
        let tx1 = transfer(&alice, 1, 2);
        pool.add(tx0.clone()).unwrap();
        pool.add(tx1.clone()).unwrap();

        let removed = pool.remove_batch(&[tx0.txid(), tx1.txid(), "missing".to_string()]);
        assert_eq!(removed, 2);
        assert_eq!(pool.size(), 0);
        assert!(pool.get_top_by_fee(10).is_empty());
        assert!(pool.get_by_sender(&alice.address()).is_empty());
    }

    #[tokio::test]
    async fn admission_signals_the_producer() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut pool = Mempool::new(10, 3_600);
        let signal = pool.signal();

        pool.add(transfer(&alice, 0, 1)).unwrap();
        // The permit is stored, so this resolves immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), signal.notified())
            .await
            .expect("notify should have a stored permit");
    }
}
