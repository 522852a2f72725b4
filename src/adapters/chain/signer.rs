//! Order Signer - Canonical Hashing and Typed-Data Signatures
//!
//! Produces the settlement order for a terminal trade: the keccak-256
//! digest of the canonical byte form, the EIP-712 signature under the
//! exchange domain, and the EIP-191 personal-message signature used to
//! authenticate the broker to the hub. All outputs are deterministic
//! functions of their inputs and are recomputed on demand.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{b256, hex, keccak256, Address};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain};
use anyhow::{Context, Result};

use crate::domain::order::{Side, SubOrder, Trade};
use crate::domain::settlement::BlockchainOrder;
use crate::domain::token::{to_base_units, TokenRegistry, FEE_ASSET};

/// Signed-order lifetime added to the sub-order timestamp.
pub const DEFAULT_EXPIRATION_MS: u64 = 29 * 24 * 60 * 60 * 1000;

/// Domain-separator tag prefixed to the canonical byte form.
const ORDER_TYPE_TAG: u8 = 0x03;

sol! {
    /// Settlement order struct as the contract verifies it.
    struct Order {
        address senderAddress;
        address matcherAddress;
        address baseAsset;
        address quoteAsset;
        address matcherFeeAsset;
        uint64 amount;
        uint64 price;
        uint64 matcherFee;
        uint64 nonce;
        uint64 expiration;
        uint8 buySide;
    }
}

/// Keccak-256 digest of the canonical order byte form.
///
/// Layout: tag byte, five 20-byte addresses, five big-endian u64 fields,
/// one side byte.
pub fn hash_order(order: &BlockchainOrder) -> Result<String> {
    let mut buf = Vec::with_capacity(1 + 5 * 20 + 5 * 8 + 1);
    buf.push(ORDER_TYPE_TAG);

    for addr in [
        &order.sender_address,
        &order.matcher_address,
        &order.base_asset,
        &order.quote_asset,
        &order.matcher_fee_asset,
    ] {
        let parsed = Address::from_str(addr).context(format!("Invalid address {addr}"))?;
        buf.extend_from_slice(parsed.as_slice());
    }

    for value in [
        order.amount,
        order.price,
        order.matcher_fee,
        order.nonce,
        order.expiration,
    ] {
        buf.extend_from_slice(&value.to_be_bytes());
    }

    buf.push(order.buy_side);

    Ok(hex::encode_prefixed(keccak256(&buf)))
}

/// Holds the broker key and signs orders and hub handshakes.
pub struct OrderSigner {
    wallet: PrivateKeySigner,
    matcher: Address,
    registry: Arc<TokenRegistry>,
    domain: Eip712Domain,
}

impl OrderSigner {
    /// Create a signer from a private key hex string.
    pub fn new(
        private_key_hex: &str,
        matcher: Address,
        chain_id: u64,
        registry: Arc<TokenRegistry>,
    ) -> Result<Self> {
        let wallet: PrivateKeySigner = private_key_hex
            .parse()
            .context("Failed to parse broker private key")?;

        let domain = eip712_domain! {
            name: "Orion Exchange",
            version: "1",
            chain_id: chain_id,
            salt: b256!("f2d857f4a3edcb9b78b4d503bfe733db1e3f6cdc2b7971ee739626c97e86a557"),
        };

        Ok(Self {
            wallet,
            matcher,
            registry,
            domain,
        })
    }

    /// Broker wallet address, checksummed.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// The underlying wallet, for raw transaction signing.
    pub fn wallet(&self) -> &PrivateKeySigner {
        &self.wallet
    }

    /// Build and sign the settlement order for a terminal trade.
    pub fn sign_trade(&self, sub_order: &SubOrder, trade: &Trade) -> Result<BlockchainOrder> {
        let (base, quote) = sub_order
            .currencies()
            .context(format!("Malformed symbol {}", sub_order.symbol))?;

        let base_asset = self.registry.address(base)?;
        let quote_asset = self.registry.address(quote)?;
        let fee_asset = self.registry.address(FEE_ASSET)?;

        let mut order = BlockchainOrder {
            id: String::new(),
            sender_address: self.wallet.address().to_checksum(None),
            matcher_address: self.matcher.to_checksum(None),
            base_asset: base_asset.to_checksum(None),
            quote_asset: quote_asset.to_checksum(None),
            matcher_fee_asset: fee_asset.to_checksum(None),
            amount: to_base_units(trade.amount)?,
            price: to_base_units(trade.price)?,
            matcher_fee: 0,
            nonce: sub_order.timestamp,
            expiration: sub_order.timestamp + DEFAULT_EXPIRATION_MS,
            buy_side: match sub_order.side {
                Side::Buy => 1,
                Side::Sell => 0,
            },
            signature: String::new(),
        };

        order.id = hash_order(&order)?;

        let typed = Order {
            senderAddress: self.wallet.address(),
            matcherAddress: self.matcher,
            baseAsset: base_asset,
            quoteAsset: quote_asset,
            matcherFeeAsset: fee_asset,
            amount: order.amount,
            price: order.price,
            matcherFee: order.matcher_fee,
            nonce: order.nonce,
            expiration: order.expiration,
            buySide: order.buy_side,
        };

        let signature = self
            .wallet
            .sign_typed_data_sync(&typed, &self.domain)
            .context("Typed-data signing failed")?;
        order.signature = hex::encode_prefixed(signature.as_bytes());

        Ok(order)
    }

    /// EIP-191 personal-message signature over a UTF-8 payload.
    pub fn sign_auth(&self, payload: &str) -> Result<String> {
        let signature = self
            .wallet
            .sign_message_sync(payload.as_bytes())
            .context("Personal-message signing failed")?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::domain::order::{SubOrderStatus, TradeStatus};
    use rust_decimal_macros::dec;

    const TEST_KEY: &str =
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_registry() -> Arc<TokenRegistry> {
        Arc::new(
            TokenRegistry::from_config(&[
                TokenConfig {
                    symbol: "ETH".to_string(),
                    address: "0x0000000000000000000000000000000000000000".to_string(),
                    decimals: 18,
                },
                TokenConfig {
                    symbol: "ORN".to_string(),
                    address: "0x0258F474786DdFd37ABCE6df6BBb1Dd5dfC4434a".to_string(),
                    decimals: 8,
                },
                TokenConfig {
                    symbol: "BTC".to_string(),
                    address: "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599".to_string(),
                    decimals: 8,
                },
                TokenConfig {
                    symbol: "USDT".to_string(),
                    address: "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string(),
                    decimals: 6,
                },
            ])
            .unwrap(),
        )
    }

    fn test_signer() -> OrderSigner {
        let matcher =
            Address::from_str("0x1fF516E5ce789085CFF86d37fc27747dF852a80a").unwrap();
        OrderSigner::new(TEST_KEY, matcher, 3, test_registry()).unwrap()
    }

    fn sample_inputs() -> (SubOrder, Trade) {
        let sub = SubOrder {
            id: 1,
            symbol: "BTC-USDT".to_string(),
            side: Side::Buy,
            price: dec!(10000),
            amount: dec!(0.01),
            exchange: "binance".to_string(),
            timestamp: 1_700_000_000_000,
            status: SubOrderStatus::Filled,
            filled_amount: dec!(0.01),
            exchange_order_id: Some("e1".to_string()),
            sent_to_aggregator: false,
        };
        let trade = Trade {
            exchange: "binance".to_string(),
            exchange_order_id: "e1".to_string(),
            price: dec!(10000),
            amount: dec!(0.01),
            status: TradeStatus::Filled,
        };
        (sub, trade)
    }

    #[test]
    fn test_sign_trade_field_scaling() {
        let signer = test_signer();
        let (sub, trade) = sample_inputs();

        let order = signer.sign_trade(&sub, &trade).unwrap();
        assert_eq!(order.amount, 1_000_000);
        assert_eq!(order.price, 1_000_000_000_000);
        assert_eq!(order.matcher_fee, 0);
        assert_eq!(order.buy_side, 1);
        assert_eq!(order.nonce, sub.timestamp);
        assert_eq!(order.expiration, sub.timestamp + DEFAULT_EXPIRATION_MS);
    }

    #[test]
    fn test_sign_trade_deterministic() {
        let signer = test_signer();
        let (sub, trade) = sample_inputs();

        let first = signer.sign_trade(&sub, &trade).unwrap();
        let second = signer.sign_trade(&sub, &trade).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.signature, second.signature);
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let signer = test_signer();
        let (sub, trade) = sample_inputs();
        let base = signer.sign_trade(&sub, &trade).unwrap();

        let mut perturbed = base.clone();
        perturbed.amount += 1;
        assert_ne!(hash_order(&perturbed).unwrap(), base.id);

        let mut perturbed = base.clone();
        perturbed.buy_side = 0;
        assert_ne!(hash_order(&perturbed).unwrap(), base.id);

        let mut perturbed = base.clone();
        perturbed.nonce += 1;
        assert_ne!(hash_order(&perturbed).unwrap(), base.id);
    }

    #[test]
    fn test_auth_signature_deterministic() {
        let signer = test_signer();
        let first = signer.sign_auth("1700000000000").unwrap();
        let second = signer.sign_auth("1700000000000").unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("0x"));
    }
}
