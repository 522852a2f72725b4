//! On-chain adapters: blockchain gateway REST client, gas price feed,
//! order signer, and the chain client that composes them.

pub mod client;
pub mod gas;
pub mod gateway;
pub mod signer;

pub use client::OrionChainClient;

/// Hard cap on the broadcast gas price.
pub const MAX_GAS_PRICE_GWEI: u64 = 300;

/// Gas limits per contract method.
pub const GAS_LIMIT_DEPOSIT_ETH: u64 = 70_000;
pub const GAS_LIMIT_DEPOSIT_ERC20: u64 = 150_000;
pub const GAS_LIMIT_WITHDRAW: u64 = 150_000;
pub const GAS_LIMIT_APPROVE: u64 = 70_000;
pub const GAS_LIMIT_LOCK_STAKE: u64 = 70_000;
pub const GAS_LIMIT_RELEASE_STAKE: u64 = 100_000;
