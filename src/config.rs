//! Configuration management for the nonce watcher
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::nonce::DEFAULT_MAX_ATTEMPTS;

/// Environment variable pointing at the configuration file
pub const CONFIG_ENV: &str = "NONCE_WATCH_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub watcher: WatcherConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
    pub wallets: WalletsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub enabled: bool,
}

impl ChainConfig {
    /// Timeout applied to a single RPC request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsConfig {
    pub addresses: Vec<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Settings {
    /// Load settings from the configured file
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse and validate a TOML document
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.watcher.max_attempts == 0 {
            anyhow::bail!("watcher.max_attempts must be at least 1");
        }

        if self.watcher.poll_interval_secs == 0 {
            anyhow::bail!("watcher.poll_interval_secs must be at least 1");
        }

        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
        }

        if self.wallets.addresses.is_empty() {
            anyhow::bail!("At least one wallet address must be configured");
        }

        self.wallet_addresses()?;

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Parse the configured wallet addresses
    pub fn wallet_addresses(&self) -> Result<Vec<Address>> {
        self.wallets
            .addresses
            .iter()
            .map(|raw| {
                raw.parse::<Address>()
                    .with_context(|| format!("Invalid wallet address: {}", raw))
            })
            .collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WALLET: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

    fn sample(rpc: &str, wallet: &str) -> String {
        format!(
            r#"
[watcher]
poll_interval_secs = 15

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[chains.mainnet]
chain_id = 1
name = "Ethereum"
rpc_urls = ["{rpc}"]
enabled = true

[chains.sepolia]
chain_id = 11155111
name = "Sepolia"
rpc_urls = []
enabled = false

[wallets]
addresses = ["{wallet}"]
"#
        )
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("NONCE_WATCH_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${NONCE_WATCH_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample("http://localhost:8545", WALLET).as_bytes())
            .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.watcher.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(settings.enabled_chains().len(), 1);

        let chain = &settings.chains["mainnet"];
        assert_eq!(chain.request_timeout(), Duration::from_secs(10));
        assert_eq!(
            settings.wallet_addresses().unwrap(),
            vec![WALLET.parse::<Address>().unwrap()]
        );
    }

    #[test]
    fn test_rpc_url_from_environment() {
        env::set_var("NONCE_WATCH_TEST_RPC", "http://node.internal:8545");
        let settings = Settings::parse(&sample("${NONCE_WATCH_TEST_RPC}", WALLET)).unwrap();
        assert_eq!(
            settings.chains["mainnet"].rpc_urls,
            vec!["http://node.internal:8545".to_string()]
        );
    }

    #[test]
    fn test_rejects_invalid_wallet() {
        let err = Settings::parse(&sample("http://localhost:8545", "0xnot-an-address"))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid wallet address"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = sample("http://localhost:8545", WALLET).replace(
            "poll_interval_secs = 15",
            "poll_interval_secs = 15\nmax_attempts = 0",
        );
        assert!(Settings::parse(&config).is_err());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = Settings::load_from(Path::new("/nonexistent/nonce-watch.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
