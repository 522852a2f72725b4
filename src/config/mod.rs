//! Configuration Module - TOML-based Broker Configuration
//!
//! Loads and validates configuration from `config.toml`. Secrets (venue
//! API keys, the broker private key) are resolved through the environment
//! variable names given here - nothing sensitive lives in the file itself.

pub mod loader;

use serde::Deserialize;

/// Top-level broker configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the broker begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Broker identity and metadata.
    pub broker: BrokerConfig,
    /// Blockchain gateway and signing parameters.
    pub chain: ChainConfig,
    /// Aggregator hub transport endpoint.
    pub hub: HubConfig,
    /// Liability discharge parameters.
    #[serde(default)]
    pub liability: LiabilityConfig,
    /// Persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Operator REST surface.
    #[serde(default)]
    pub operator: OperatorConfig,
    /// Venue definitions, in priority order for withdrawal planning.
    pub exchanges: Vec<ExchangeConfig>,
    /// Token registry entries (symbol, on-chain address, decimals).
    pub tokens: Vec<TokenConfig>,
}

/// Broker identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Human-readable broker name, sent to the hub on registration.
    pub name: String,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Blockchain gateway and signing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Base URL of the blockchain gateway REST surface.
    pub gateway_url: String,
    /// URL of the external gas price feed.
    pub gas_feed_url: String,
    /// Production flag; selects chain ID 1 (mainnet) vs 3.
    #[serde(default)]
    pub production: bool,
    /// On-chain matcher address authorized to co-sign settlement.
    pub matcher_address: String,
    /// Settlement contract address.
    pub contract_address: String,
    /// Environment variable holding the broker wallet private key.
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl ChainConfig {
    /// Chain ID derived from the production flag.
    pub fn chain_id(&self) -> u64 {
        if self.production {
            1
        } else {
            3
        }
    }
}

/// Hub transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// WebSocket URL of the aggregator hub.
    pub ws_url: String,
}

/// Liability discharge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LiabilityConfig {
    /// Grace period before an outstanding liability is acted on (seconds).
    #[serde(default = "default_due_period")]
    pub due_period_seconds: u64,
}

impl Default for LiabilityConfig {
    fn default() -> Self {
        Self {
            due_period_seconds: default_due_period(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the journal file.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Operator REST configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// Bind address for the operator REST + health server.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Individual venue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Venue identifier used in sub-orders (e.g. "binance").
    pub id: String,
    /// REST API base URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Environment variable holding the API secret.
    pub api_secret_env: String,
    /// Whether on-chain withdrawals may be sourced from this venue.
    #[serde(default = "default_true")]
    pub withdraw_enabled: bool,
}

/// Token registry entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Currency symbol (e.g. "USDT").
    pub symbol: String,
    /// ERC-20 contract address; the zero address denotes ETH.
    pub address: String,
    /// Token decimals used when scaling deposit amounts.
    pub decimals: u8,
}

// Default value functions for serde

fn default_log_level() -> String {
    "info".to_string()
}

fn default_private_key_env() -> String {
    "BROKER_PRIVATE_KEY".to_string()
}

fn default_due_period() -> u64 {
    3600
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_true() -> bool {
    true
}
