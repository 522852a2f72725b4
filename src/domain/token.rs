//! Token registry and base-unit scaling.
//!
//! Process-wide map from currency symbol to on-chain address and decimals,
//! initialized once from config and shared by the chain client and the
//! venue adapters. Signed orders carry amounts and prices in 1e8 base
//! units regardless of token decimals; deposits scale by the token's own
//! decimals.

use std::collections::HashMap;
use std::str::FromStr;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::TokenConfig;
use crate::error::BrokerError;

/// Multiplier applied to signed-order amounts and prices.
pub const BASE_UNIT_SCALE: u64 = 100_000_000;

/// Fee asset for all signed orders.
pub const FEE_ASSET: &str = "ORN";

/// A registered token.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// Currency symbol.
    pub symbol: String,
    /// ERC-20 contract address; the zero address denotes ETH.
    pub address: Address,
    /// Token decimals.
    pub decimals: u8,
}

/// Symbol → token map, built once at startup.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<TokenInfo>,
    by_symbol: HashMap<String, usize>,
}

impl TokenRegistry {
    /// Build the registry from config entries.
    pub fn from_config(entries: &[TokenConfig]) -> Result<Self> {
        let mut tokens = Vec::with_capacity(entries.len());
        let mut by_symbol = HashMap::with_capacity(entries.len());

        for entry in entries {
            let address = Address::from_str(&entry.address)
                .context(format!("Invalid address for token {}", entry.symbol))?;
            by_symbol.insert(entry.symbol.clone(), tokens.len());
            tokens.push(TokenInfo {
                symbol: entry.symbol.clone(),
                address,
                decimals: entry.decimals,
            });
        }

        Ok(Self { tokens, by_symbol })
    }

    /// Look up a token by symbol.
    pub fn get(&self, symbol: &str) -> Option<&TokenInfo> {
        self.by_symbol.get(symbol).map(|&i| &self.tokens[i])
    }

    /// On-chain address for a symbol, or `UnknownAsset`.
    pub fn address(&self, symbol: &str) -> Result<Address, BrokerError> {
        self.get(symbol)
            .map(|t| t.address)
            .ok_or_else(|| BrokerError::UnknownAsset(symbol.to_string()))
    }

    /// Whether the chain recognizes this currency.
    pub fn contains(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    /// All registered tokens, in config order.
    pub fn tokens(&self) -> &[TokenInfo] {
        &self.tokens
    }
}

/// Scale a decimal value into 1e8 signed-order base units, truncating.
pub fn to_base_units(value: Decimal) -> Result<u64, BrokerError> {
    (value * Decimal::from(BASE_UNIT_SCALE))
        .trunc()
        .to_u64()
        .ok_or(BrokerError::AmountOverflow(value))
}

/// Scale a decimal value by a token's own decimals, truncating.
pub fn to_token_units(value: Decimal, decimals: u8) -> Option<u128> {
    let scale = Decimal::from(10u128.pow(u32::from(decimals)));
    (value * scale).trunc().to_u128()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_base_unit_scaling() {
        assert_eq!(to_base_units(dec!(0.01)).unwrap(), 1_000_000);
        assert_eq!(to_base_units(dec!(10000)).unwrap(), 1_000_000_000_000);
        assert_eq!(to_base_units(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn test_token_unit_scaling() {
        assert_eq!(to_token_units(dec!(1.5), 6), Some(1_500_000));
        assert_eq!(
            to_token_units(dec!(2), 18),
            Some(2_000_000_000_000_000_000)
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TokenRegistry::from_config(&[TokenConfig {
            symbol: "USDT".to_string(),
            address: "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string(),
            decimals: 6,
        }])
        .unwrap();

        assert!(registry.contains("USDT"));
        assert!(!registry.contains("DOGE"));
        assert!(registry.address("DOGE").is_err());
        assert_eq!(registry.get("USDT").unwrap().decimals, 6);
    }
}
