//! Periodic nonce and stuck transaction checks for configured wallets

use crate::nonce::NonceFetcher;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ethers::types::Address;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Fetcher bound to one chain
#[derive(Clone)]
pub struct ChainTarget {
    pub chain_id: u64,
    pub fetcher: NonceFetcher,
}

/// Outcome of the most recent check of one wallet on one chain
#[derive(Debug, Clone, Serialize)]
pub struct WalletStatus {
    pub chain_id: u64,
    pub wallet: Address,
    /// Pending nonce, absent when every attempt failed
    pub pending_nonce: Option<u64>,
    /// `false` also covers a failed stuck check
    pub stuck: bool,
    pub last_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Watches a fixed set of wallets across chains
pub struct NonceWatcher {
    targets: Vec<ChainTarget>,
    wallets: Vec<Address>,
    max_attempts: u32,
    poll_interval: Duration,
    statuses: DashMap<(u64, Address), WalletStatus>,
    shutdown: Arc<RwLock<bool>>,
}

impl NonceWatcher {
    pub fn new(
        targets: Vec<ChainTarget>,
        wallets: Vec<Address>,
        max_attempts: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            targets,
            wallets,
            max_attempts,
            poll_interval,
            statuses: DashMap::new(),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Run checks every poll interval until stopped
    pub async fn run(&self) {
        info!(
            "Watching {} wallets on {} chains every {:?}",
            self.wallets.len(),
            self.targets.len(),
            self.poll_interval
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;

            if *self.shutdown.read().await {
                break;
            }

            self.check_all().await;
        }

        info!("Nonce watcher stopped");
    }

    /// Check every wallet on every chain once
    pub async fn check_all(&self) {
        let checks = self.targets.iter().flat_map(|target| {
            self.wallets
                .iter()
                .map(move |wallet| self.check_wallet(target, *wallet))
        });
        let results = futures::future::join_all(checks).await;

        for target in &self.targets {
            let stuck = results
                .iter()
                .filter(|s| s.chain_id == target.chain_id && s.stuck)
                .count();
            crate::metrics::record_stuck_wallets(target.chain_id, stuck);
        }

        for status in results {
            self.statuses.insert((status.chain_id, status.wallet), status);
        }
    }

    async fn check_wallet(&self, target: &ChainTarget, wallet: Address) -> WalletStatus {
        let (stuck, nonce) = tokio::join!(
            target.fetcher.has_stuck_transactions(wallet),
            target
                .fetcher
                .get_current_nonce_with_attempts(wallet, self.max_attempts),
        );
        crate::metrics::record_check(target.chain_id);

        let (pending_nonce, last_error) = match nonce {
            Ok(nonce) => {
                crate::metrics::record_pending_nonce(
                    target.chain_id,
                    &format!("{:?}", wallet),
                    nonce,
                );
                debug!(
                    "Chain {} wallet {:?}: pending nonce {}",
                    target.chain_id, wallet, nonce
                );
                (Some(nonce), None)
            }
            Err(e) => {
                crate::metrics::record_fetch_failure(target.chain_id);
                warn!(
                    "Chain {} wallet {:?}: nonce unavailable: {}",
                    target.chain_id, wallet, e
                );
                (None, Some(e.to_string()))
            }
        };

        WalletStatus {
            chain_id: target.chain_id,
            wallet,
            pending_nonce,
            stuck,
            last_error,
            checked_at: Utc::now(),
        }
    }

    /// Latest status of every checked wallet, ordered by chain then wallet
    pub fn statuses(&self) -> Vec<WalletStatus> {
        let mut statuses: Vec<_> = self.statuses.iter().map(|e| e.value().clone()).collect();
        statuses.sort_by_key(|s| (s.chain_id, s.wallet));
        statuses
    }

    /// Latest status for one wallet on one chain
    pub fn status(&self, chain_id: u64, wallet: Address) -> Option<WalletStatus> {
        self.statuses.get(&(chain_id, wallet)).map(|e| e.value().clone())
    }

    /// Number of wallets flagged as stuck in their latest check
    pub fn stuck_count(&self) -> usize {
        self.statuses.iter().filter(|e| e.value().stuck).count()
    }

    /// Stop the watch loop at its next tick
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BlockTag, MockChainReader};
    use crate::error::ReadError;
    use crate::nonce::log::recording::RecordingLogger;
    use crate::nonce::create_nonce_fetcher;

    fn address(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn target(chain_id: u64, reader: MockChainReader) -> ChainTarget {
        ChainTarget {
            chain_id,
            fetcher: create_nonce_fetcher(
                Arc::new(reader),
                Arc::new(RecordingLogger::default()),
            ),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn records_status_per_chain_and_wallet() {
        let stuck_wallet = address(0x11);
        let healthy_wallet = address(0x22);

        let mut reader = MockChainReader::new();
        reader
            .expect_get_transaction_count()
            .returning(move |wallet, tag| match (wallet == stuck_wallet, tag) {
                (true, BlockTag::Latest) => Ok(3),
                (true, BlockTag::Pending) => Ok(8),
                (false, BlockTag::Latest) => Ok(10),
                (false, BlockTag::Pending) => Ok(11),
            });

        let mut failing = MockChainReader::new();
        failing
            .expect_get_transaction_count()
            .returning(|_, _| Err(ReadError::from("gateway timeout")));

        let watcher = NonceWatcher::new(
            vec![target(1, reader), target(2, failing)],
            vec![stuck_wallet, healthy_wallet],
            2,
            Duration::from_secs(30),
        );
        watcher.check_all().await;

        assert_eq!(watcher.statuses().len(), 4);
        assert_eq!(watcher.stuck_count(), 1);

        let stuck = watcher.status(1, stuck_wallet).unwrap();
        assert!(stuck.stuck);
        assert_eq!(stuck.pending_nonce, Some(8));
        assert!(stuck.last_error.is_none());

        let healthy = watcher.status(1, healthy_wallet).unwrap();
        assert!(!healthy.stuck);
        assert_eq!(healthy.pending_nonce, Some(11));

        let failed = watcher.status(2, healthy_wallet).unwrap();
        assert!(!failed.stuck);
        assert_eq!(failed.pending_nonce, None);
        assert_eq!(failed.last_error.as_deref(), Some("gateway timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_run_loop() {
        let mut reader = MockChainReader::new();
        reader
            .expect_get_transaction_count()
            .returning(|_, _| Ok(1));

        let watcher = Arc::new(NonceWatcher::new(
            vec![target(7, reader)],
            vec![address(0x33)],
            1,
            Duration::from_secs(5),
        ));

        let handle = tokio::spawn({
            let watcher = watcher.clone();
            async move { watcher.run().await }
        });

        tokio::time::sleep(Duration::from_secs(6)).await;
        watcher.stop().await;
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("watcher should stop")
            .unwrap();

        assert_eq!(watcher.status(7, address(0x33)).unwrap().pending_nonce, Some(1));
    }
}
