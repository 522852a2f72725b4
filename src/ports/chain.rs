//! Chain Client Port - On-chain Interaction Interface
//!
//! Order hashing and signing are deterministic functions of their inputs
//! and never retried; reads go through the blockchain gateway REST
//! surface; writes build, sign, and broadcast raw transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::order::{SubOrder, Trade};
use crate::domain::settlement::{BlockchainOrder, Liability, Transaction, TxQueryStatus};

/// Trait for on-chain interactions.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// The broker wallet address as a 0x-prefixed hex string.
    fn address(&self) -> String;

    /// Keccak-256 digest of the canonical order byte form.
    fn hash_order(&self, order: &BlockchainOrder) -> anyhow::Result<String>;

    /// Build and sign the settlement order for a filled or canceled trade.
    /// Identical inputs yield byte-identical `id` and `signature`.
    fn sign_trade(&self, sub_order: &SubOrder, trade: &Trade) -> anyhow::Result<BlockchainOrder>;

    /// EIP-191 personal-message signature, used to authenticate to the hub.
    fn sign_auth(&self, payload: &str) -> anyhow::Result<String>;

    /// ERC-20 allowance granted by the broker wallet to the contract.
    async fn get_allowance(&self, asset: &str) -> anyhow::Result<Decimal>;

    /// Next usable wallet nonce, or `None` if the gateway has none.
    async fn get_nonce(&self) -> anyhow::Result<Option<u64>>;

    /// Current broker stake in the contract.
    async fn get_stake(&self) -> anyhow::Result<Decimal>;

    /// Chain status of a broadcast transaction.
    async fn get_transaction_status(&self, hash: &str) -> anyhow::Result<TxQueryStatus>;

    /// Outstanding liabilities of the broker toward the contract.
    async fn get_liabilities(&self) -> anyhow::Result<Vec<Liability>>;

    /// Broker balances held inside the settlement contract.
    async fn get_contract_balance(&self) -> anyhow::Result<HashMap<String, Decimal>>;

    /// Broker wallet balances on chain.
    async fn get_wallet_balance(&self) -> anyhow::Result<HashMap<String, Decimal>>;

    /// Deposit ETH into the settlement contract.
    async fn deposit_eth(&self, amount: Decimal) -> anyhow::Result<Transaction>;

    /// Deposit an ERC-20 asset into the settlement contract.
    async fn deposit_erc20(&self, amount: Decimal, asset: &str) -> anyhow::Result<Transaction>;

    /// Withdraw an asset from the settlement contract to the wallet.
    async fn withdraw(&self, amount: Decimal, asset: &str) -> anyhow::Result<Transaction>;

    /// Approve the settlement contract to spend an ERC-20 asset.
    async fn approve_erc20(&self, amount: Decimal, asset: &str) -> anyhow::Result<Transaction>;

    /// Lock ORN stake in the contract.
    async fn lock_stake(&self, amount: Decimal) -> anyhow::Result<Transaction>;

    /// Request release of the locked stake.
    async fn release_stake(&self) -> anyhow::Result<Transaction>;
}
