//! Configuration loader — reads and validates `config.toml`.
//!
//! Loads the TOML configuration file from the given path and
//! deserializes it into `AppConfig`. Validates critical fields
//! so wiring failures surface at startup, not mid-reconciliation.

use std::str::FromStr;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read config file: {path}"))?;

    let config: AppConfig =
        toml::from_str(&content).context("Failed to parse config.toml")?;

    validate_config(&config)?;

    info!(path = path, "Configuration loaded successfully");
    Ok(config)
}

/// Validate critical configuration fields.
fn validate_config(config: &AppConfig) -> Result<()> {
    anyhow::ensure!(
        !config.chain.gateway_url.is_empty(),
        "chain.gateway_url must not be empty"
    );
    anyhow::ensure!(
        !config.chain.gas_feed_url.is_empty(),
        "chain.gas_feed_url must not be empty"
    );
    anyhow::ensure!(
        !config.hub.ws_url.is_empty(),
        "hub.ws_url must not be empty"
    );
    anyhow::ensure!(
        config.liability.due_period_seconds > 0,
        "liability.due_period_seconds must be positive"
    );
    anyhow::ensure!(
        !config.exchanges.is_empty(),
        "exchanges must contain at least one venue"
    );
    anyhow::ensure!(
        !config.tokens.is_empty(),
        "tokens must contain at least one entry"
    );

    Address::from_str(&config.chain.matcher_address)
        .context("chain.matcher_address is not a valid address")?;
    Address::from_str(&config.chain.contract_address)
        .context("chain.contract_address is not a valid address")?;

    for token in &config.tokens {
        Address::from_str(&token.address).context(format!(
            "tokens: {} address is not a valid address",
            token.symbol
        ))?;
    }

    // The signed-order fee asset and the gas currency must be registered.
    for required in ["ETH", "ORN"] {
        anyhow::ensure!(
            config.tokens.iter().any(|t| t.symbol == required),
            "tokens must include {required}"
        );
    }

    Ok(())
}
