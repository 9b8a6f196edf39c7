//! Background block production.
//!
//! The producer is a single cooperative task: it produces a block, then
//! waits for either the mempool's new-transaction signal or a timer
//! (the configured interval while transactions are pending, the long
//! empty-block heartbeat otherwise). A watch channel stops it; `stop`
//! joins within two seconds and aborts past that.
//!
//! Production continues through transaction- and block-level errors; it
//! halts only on a storage fault, since advancing metadata past a failed
//! write would corrupt the chain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

use crate::crypto::KeyPair;
use crate::error::ChainError;
use crate::storage::ChainStore;
use crate::vm::Interpreter;

use super::Blockchain;

/// Handle to a running producer task.
pub struct ProducerHandle {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProducerHandle {
    /// Signals the producer to stop and joins it, aborting if it fails
    /// to wind down within two seconds.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(Duration::from_secs(2), &mut self.handle).await {
            Ok(_) => tracing::info!("block producer stopped"),
            Err(_) => {
                tracing::warn!("block producer did not stop in time, aborting");
                self.handle.abort();
            }
        }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Spawns the block producer over a shared node.
///
/// `signal` is the mempool's new-transaction [`Notify`]
/// ([`Blockchain::mempool_signal`]); admission wakes the producer before
/// its timer fires.
pub fn spawn_producer<S, I>(
    node: Arc<Mutex<Blockchain<S, I>>>,
    keypair: KeyPair,
    signal: Arc<Notify>,
) -> ProducerHandle
where
    S: ChainStore + 'static,
    I: Interpreter + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let (interval, idle_interval) = {
            let node = node.lock().await;
            let cfg = &node.config().producer;
            (
                Duration::from_secs(cfg.interval_secs.max(1)),
                Duration::from_secs(cfg.idle_interval_secs.max(1)),
            )
        };
        tracing::info!(
            interval_secs = interval.as_secs(),
            idle_secs = idle_interval.as_secs(),
            "block producer started"
        );

        loop {
            if *stop_rx.borrow() {
                break;
            }

            // Pending count is sampled before the block is built; it
            // decides how long to wait afterwards.
            let pending = {
                let mut node = node.lock().await;
                let pending = node.mempool_size();
                match node.produce_block(&keypair) {
                    Ok(block) => {
                        if block.transactions.is_empty() {
                            tracing::debug!(height = block.height, "empty block produced");
                        }
                    }
                    Err(ChainError::Storage(e)) => {
                        tracing::error!(error = %e, "storage fault, halting block production");
                        return;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "block production failed");
                    }
                }
                pending
            };

            let wait = if pending > 0 { interval } else { idle_interval };
            tokio::select! {
                _ = signal.notified() => {}
                _ = tokio::time::sleep(wait) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    ProducerHandle { stop_tx, handle }
}
