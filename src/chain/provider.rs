//! Chain provider with multi-RPC support and automatic failover

use super::{BlockTag, ChainReader};
use crate::config::ChainConfig;
use crate::error::{NonceError, NonceResult, ReadError};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> NonceResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(NonceError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    fn active_index(&self) -> usize {
        self.current_provider.load(Ordering::Acquire) % self.http_providers.len()
    }

    /// Move past the provider at `failed`, unless a concurrent request
    /// already did. Requests that fail together rotate only once.
    fn failover_from(&self, failed: usize) {
        let len = self.http_providers.len();
        if len < 2 {
            return;
        }
        let next = (failed + 1) % len;
        if self
            .current_provider
            .compare_exchange(failed, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!("Chain {} failover to provider {}", self.config.chain_id, next);
        }
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> NonceResult<u64> {
        for _ in 0..self.http_providers.len() {
            let used = self.active_index();
            let request = self.http_providers[used].get_block_number();
            match timeout(self.config.request_timeout(), request).await {
                Ok(Ok(block)) => return Ok(block.as_u64()),
                Ok(Err(e)) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover_from(used);
                }
                Err(_) => {
                    warn!("Block number request timed out on chain {}", self.config.chain_id);
                    self.failover_from(used);
                }
            }
        }

        Err(NonceError::ChainConnection {
            chain_id: self.config.chain_id,
            message: "All providers failed".to_string(),
        })
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Get chain name
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[async_trait]
impl ChainReader for ChainProvider {
    /// Issues exactly one request against the active RPC. A failed request
    /// rotates away from the RPC it used so the caller's next attempt uses
    /// another node.
    async fn get_transaction_count(
        &self,
        address: Address,
        tag: BlockTag,
    ) -> Result<u64, ReadError> {
        let used = self.active_index();
        let request = self.http_providers[used].get_transaction_count(address, Some(tag.into()));

        let count = match timeout(self.config.request_timeout(), request).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                self.failover_from(used);
                return Err(e.into());
            }
            Err(elapsed) => {
                self.failover_from(used);
                return Err(elapsed.into());
            }
        };

        if count > U256::from(u64::MAX) {
            return Err(ReadError::Message(format!(
                "transaction count {} at {} exceeds u64 range",
                count, tag
            )));
        }

        Ok(count.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_config(rpc_urls: &[&str]) -> ChainConfig {
        ChainConfig {
            chain_id: 31337,
            name: "local".to_string(),
            rpc_urls: rpc_urls.iter().map(|u| u.to_string()).collect(),
            request_timeout_ms: 2_000,
            enabled: true,
        }
    }

    #[test]
    fn rejects_config_without_valid_urls() {
        let result = ChainProvider::new(chain_config(&["not a url"]));
        assert!(matches!(
            result,
            Err(NonceError::ChainConnection { chain_id: 31337, .. })
        ));
    }

    #[test]
    fn skips_invalid_urls() {
        let provider =
            ChainProvider::new(chain_config(&["not a url", "http://127.0.0.1:1"])).unwrap();
        assert_eq!(provider.http_providers.len(), 1);
        assert_eq!(provider.name(), "local");
    }

    #[test]
    fn failover_rotates_active_provider() {
        let provider =
            ChainProvider::new(chain_config(&["http://127.0.0.1:1", "http://127.0.0.1:2"]))
                .unwrap();
        assert_eq!(provider.active_index(), 0);
        provider.failover_from(0);
        assert_eq!(provider.active_index(), 1);
        provider.failover_from(1);
        assert_eq!(provider.active_index(), 0);
    }

    #[tokio::test]
    async fn failed_count_request_rotates_and_surfaces_error() {
        let provider =
            ChainProvider::new(chain_config(&["http://127.0.0.1:1", "http://127.0.0.1:2"]))
                .unwrap();

        let result = provider
            .get_transaction_count(Address::zero(), BlockTag::Pending)
            .await;

        assert!(matches!(result, Err(ReadError::Provider(_))));
        assert_eq!(provider.active_index(), 1);
    }

    #[tokio::test]
    async fn concurrent_failures_rotate_once() {
        let provider =
            ChainProvider::new(chain_config(&["http://127.0.0.1:1", "http://127.0.0.1:2"]))
                .unwrap();

        let (latest, pending) = tokio::join!(
            provider.get_transaction_count(Address::zero(), BlockTag::Latest),
            provider.get_transaction_count(Address::zero(), BlockTag::Pending),
        );

        assert!(latest.is_err());
        assert!(pending.is_err());
        assert_eq!(provider.active_index(), 1);
    }

    #[test]
    fn stale_failure_does_not_rotate() {
        let provider = ChainProvider::new(chain_config(&[
            "http://127.0.0.1:1",
            "http://127.0.0.1:2",
            "http://127.0.0.1:3",
        ]))
        .unwrap();

        provider.failover_from(0);
        provider.failover_from(0);
        assert_eq!(provider.active_index(), 1);
    }

    #[tokio::test]
    async fn health_check_fails_when_no_rpc_answers() {
        let provider = ChainProvider::new(chain_config(&["http://127.0.0.1:1"])).unwrap();
        assert!(!provider.health_check().await);
    }
}
