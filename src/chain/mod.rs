//! Chain module - read access to the chains whose wallets are watched
//!
//! This module provides:
//! - The `ChainReader` seam the nonce fetcher depends on
//! - Multi-RPC provider management with automatic failover
//! - Health monitoring for every configured chain

pub mod provider;

pub use provider::ChainProvider;

use crate::config::Settings;
use crate::error::{NonceError, NonceResult, ReadError};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{Address, BlockId, BlockNumber};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Chain-state reference point for account queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    /// Last confirmed block
    Latest,
    /// Includes transactions visible in the mempool
    Pending,
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Pending => write!(f, "pending"),
        }
    }
}

impl From<BlockTag> for BlockId {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockId::Number(BlockNumber::Latest),
            BlockTag::Pending => BlockId::Number(BlockNumber::Pending),
        }
    }
}

/// Minimal read surface of a blockchain node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Number of transactions sent from `address` as observed at `tag`
    async fn get_transaction_count(&self, address: Address, tag: BlockTag)
        -> Result<u64, ReadError>;
}

/// Manages providers for all configured chains
pub struct ChainManager {
    /// Chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
}

impl ChainManager {
    /// Create a chain manager with a provider for every enabled chain
    pub fn new(settings: &Settings) -> NonceResult<Self> {
        let providers = DashMap::new();

        for (name, chain_config) in settings.enabled_chains() {
            info!(
                "Initializing chain {} (ID: {}) as {}",
                chain_config.name, chain_config.chain_id, name
            );

            let provider = ChainProvider::new(chain_config.clone())?;
            providers.insert(chain_config.chain_id, Arc::new(provider));
        }

        if providers.is_empty() {
            return Err(NonceError::Config("No chains could be initialized".to_string()));
        }

        Ok(Self { providers })
    }

    /// Get provider for a specific chain
    pub fn get_provider(&self, chain_id: u64) -> NonceResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .map(|p| p.clone())
            .ok_or(NonceError::ChainNotFound { chain_id })
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let providers: Vec<_> = self
            .providers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut results = Vec::with_capacity(providers.len());
        for (chain_id, provider) in providers {
            let healthy = provider.health_check().await;
            if !healthy {
                warn!("Chain {} health check failed", chain_id);
            }
            crate::metrics::record_chain_health(chain_id, healthy);
            results.push((chain_id, healthy));
        }

        results
    }

    /// Chain ID and display name of every connected chain
    pub fn chains(&self) -> Vec<(u64, String)> {
        let mut chains: Vec<_> = self
            .providers
            .iter()
            .map(|e| (*e.key(), e.value().name().to_string()))
            .collect();
        chains.sort_unstable();
        chains
    }

    /// Get all connected chain IDs
    pub fn connected_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.providers.iter().map(|e| *e.key()).collect();
        chains.sort_unstable();
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_tags_map_to_rpc_block_numbers() {
        assert_eq!(
            BlockId::from(BlockTag::Latest),
            BlockId::Number(BlockNumber::Latest)
        );
        assert_eq!(
            BlockId::from(BlockTag::Pending),
            BlockId::Number(BlockNumber::Pending)
        );
        assert_eq!(BlockTag::Pending.to_string(), "pending");
    }

    #[test]
    fn manager_builds_enabled_chains_only() {
        let settings = Settings::parse(
            r#"
[watcher]
poll_interval_secs = 5

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[chains.a]
chain_id = 10
name = "A"
rpc_urls = ["http://127.0.0.1:1"]
enabled = true

[chains.b]
chain_id = 20
name = "B"
rpc_urls = ["http://127.0.0.1:1"]
enabled = false

[wallets]
addresses = ["0x8ba1f109551bd432803012645ac136ddd64dba72"]
"#,
        )
        .unwrap();

        let manager = ChainManager::new(&settings).unwrap();
        assert_eq!(manager.connected_chains(), vec![10]);
        assert_eq!(manager.chains(), vec![(10, "A".to_string())]);
        assert!(manager.get_provider(10).is_ok());
        assert!(matches!(
            manager.get_provider(20),
            Err(NonceError::ChainNotFound { chain_id: 20 })
        ));
    }
}
