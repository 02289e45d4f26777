//! Node configuration

use std::env;
use std::fmt;
use std::time::Duration;

use eyre::{eyre, Result};

use bridge::address_codec::DEFAULT_ADDRESS_PREFIX;
use bridge::state::{DEFAULT_DENOM, DEFAULT_MODULE_ACCOUNT};

/// Deposit contract on the source chain unless overridden
pub const DEFAULT_DEPOSIT_CONTRACT: &str = "0xcc391c8f1aFd6DB5D8b0e064BA81b1383b14FE5B";

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_api_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    9098
}

fn default_node_url() -> String {
    "http://127.0.0.1:9098".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_block_range() -> u64 {
    999
}

/// Node configuration, loaded from the environment
#[derive(Clone)]
pub struct Config {
    /// Source-chain JSON-RPC URL (required by `serve` and `relay`)
    pub eth_rpc_url: Option<String>,
    /// Deposit contract address, used verbatim in identifiers
    pub deposit_contract: String,
    /// Address allowed to pin the source block height (required by `serve`)
    pub authority: Option<String>,
    pub denom: String,
    pub module_account: String,
    pub address_prefix: String,
    /// Bound on each source-chain call
    pub rpc_timeout_ms: u64,

    pub api_bind_address: String,
    pub api_port: u16,
    /// Node API used by the CLI commands and the relayer
    pub node_url: String,

    pub relayer: RelayerConfig,
}

/// Relayer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerConfig {
    /// Creator address submitted with `ProcessDeposit`
    pub creator: Option<String>,
    /// First block scanned; 0 means "latest - 10"
    pub start_block: u64,
    pub poll_interval_secs: u64,
    /// Maximum blocks per log query
    pub max_block_range: u64,
}

/// Custom Debug that redacts the RPC URL (it usually embeds an API key).
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("eth_rpc_url", &self.eth_rpc_url.as_ref().map(|_| "<redacted>"))
            .field("deposit_contract", &self.deposit_contract)
            .field("authority", &self.authority)
            .field("denom", &self.denom)
            .field("module_account", &self.module_account)
            .field("address_prefix", &self.address_prefix)
            .field("rpc_timeout_ms", &self.rpc_timeout_ms)
            .field("api_bind_address", &self.api_bind_address)
            .field("api_port", &self.api_port)
            .field("node_url", &self.node_url)
            .field("relayer", &self.relayer)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        Ok(Self {
            eth_rpc_url: optional("ETH_RPC_URL"),
            deposit_contract: optional("DEPOSIT_CONTRACT_ADDRESS")
                .unwrap_or_else(|| DEFAULT_DEPOSIT_CONTRACT.to_string()),
            authority: optional("BRIDGE_AUTHORITY"),
            denom: optional("BRIDGE_DENOM").unwrap_or_else(|| DEFAULT_DENOM.to_string()),
            module_account: optional("BRIDGE_MODULE_ACCOUNT")
                .unwrap_or_else(|| DEFAULT_MODULE_ACCOUNT.to_string()),
            address_prefix: optional("ADDRESS_PREFIX")
                .unwrap_or_else(|| DEFAULT_ADDRESS_PREFIX.to_string()),
            rpc_timeout_ms: parsed("RPC_TIMEOUT_MS")?.unwrap_or_else(default_rpc_timeout_ms),

            api_bind_address: optional("API_BIND_ADDRESS")
                .unwrap_or_else(default_api_bind_address),
            api_port: parsed("API_PORT")?.unwrap_or_else(default_api_port),
            node_url: optional("NODE_URL").unwrap_or_else(default_node_url),

            relayer: RelayerConfig {
                creator: optional("RELAYER_CREATOR"),
                start_block: parsed("RELAYER_START_BLOCK")?.unwrap_or(0),
                poll_interval_secs: parsed("RELAYER_POLL_INTERVAL_SECS")?
                    .unwrap_or_else(default_poll_interval_secs),
                max_block_range: parsed("RELAYER_MAX_BLOCK_RANGE")?
                    .unwrap_or_else(default_max_block_range),
            },
        })
    }

    pub fn rpc_url(&self) -> Result<&str> {
        self.eth_rpc_url
            .as_deref()
            .ok_or_else(|| eyre!("ETH_RPC_URL required"))
    }

    pub fn bridge_authority(&self) -> Result<&str> {
        self.authority
            .as_deref()
            .ok_or_else(|| eyre!("BRIDGE_AUTHORITY required"))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Unset and empty variables are both treated as absent.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    optional(name)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| eyre!("Invalid {}: {}", name, v))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ETH_RPC_URL",
        "DEPOSIT_CONTRACT_ADDRESS",
        "BRIDGE_AUTHORITY",
        "BRIDGE_DENOM",
        "BRIDGE_MODULE_ACCOUNT",
        "ADDRESS_PREFIX",
        "RPC_TIMEOUT_MS",
        "API_BIND_ADDRESS",
        "API_PORT",
        "NODE_URL",
        "RELAYER_CREATOR",
        "RELAYER_START_BLOCK",
        "RELAYER_POLL_INTERVAL_SECS",
        "RELAYER_MAX_BLOCK_RANGE",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::load().unwrap();

        assert_eq!(config.eth_rpc_url, None);
        assert_eq!(config.deposit_contract, DEFAULT_DEPOSIT_CONTRACT);
        assert_eq!(config.denom, "usdc");
        assert_eq!(config.module_account, "bridge");
        assert_eq!(config.address_prefix, "b52");
        assert_eq!(config.rpc_timeout(), Duration::from_secs(10));
        assert_eq!(config.api_port, 9098);
        assert_eq!(config.node_url, "http://127.0.0.1:9098");
        assert_eq!(config.relayer.start_block, 0);
        assert_eq!(config.relayer.poll_interval_secs, 60);
        assert_eq!(config.relayer.max_block_range, 999);
        assert!(config.rpc_url().is_err());
        assert!(config.bridge_authority().is_err());
    }

    #[test]
    #[serial]
    fn test_overrides_and_invalid_numbers() {
        clear_env();
        env::set_var("ETH_RPC_URL", "https://eth.example/v2/secret-key");
        env::set_var("API_PORT", "7000");
        env::set_var("RELAYER_MAX_BLOCK_RANGE", "100");
        let config = Config::load().unwrap();
        assert_eq!(config.rpc_url().unwrap(), "https://eth.example/v2/secret-key");
        assert_eq!(config.api_port, 7000);
        assert_eq!(config.relayer.max_block_range, 100);

        env::set_var("API_PORT", "not-a-port");
        assert!(Config::load().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_debug_redacts_rpc_url() {
        clear_env();
        env::set_var("ETH_RPC_URL", "https://eth.example/v2/secret-key");
        let config = Config::load().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
        clear_env();
    }
}
