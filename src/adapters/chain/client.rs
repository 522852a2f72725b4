//! Chain Client - Gateway Reads and Raw Transaction Writes
//!
//! Composes the gateway REST client, the gas price feed, and the order
//! signer into the `ChainClient` port. Writes follow populate → fill
//! (nonce from the gateway, gas price from the feed, fixed gas limit) →
//! sign → broadcast, and return a PENDING `Transaction` the reconciler
//! tracks to a terminal status.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{hex, Address, Bytes, TxKind, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use super::gas::GasPriceFeed;
use super::gateway::BlockchainGateway;
use super::signer::OrderSigner;
use super::{
    GAS_LIMIT_APPROVE, GAS_LIMIT_DEPOSIT_ERC20, GAS_LIMIT_DEPOSIT_ETH, GAS_LIMIT_LOCK_STAKE,
    GAS_LIMIT_RELEASE_STAKE, GAS_LIMIT_WITHDRAW,
};
use crate::domain::order::{SubOrder, Trade};
use crate::domain::settlement::{
    BlockchainOrder, Liability, Transaction, TransactionStatus, TxMethod, TxQueryStatus,
};
use crate::domain::token::{to_token_units, TokenRegistry};
use crate::domain::{now_ms, token::FEE_ASSET};
use crate::error::BrokerError;
use crate::ports::chain::ChainClient;

sol! {
    function deposit() external payable;
    function depositAsset(address assetAddress, uint256 amount) external;
    function withdraw(address assetAddress, uint256 amount) external;
    function lockStake(uint256 stakeAmount) external;
    function requestReleaseStake() external;
    function approve(address spender, uint256 amount) external returns (bool);
}

/// Concrete chain client over the gateway, gas feed, and signer.
pub struct OrionChainClient {
    gateway: BlockchainGateway,
    gas: GasPriceFeed,
    signer: OrderSigner,
    registry: Arc<TokenRegistry>,
    /// Settlement contract address.
    contract: Address,
    chain_id: u64,
    /// Broker wallet address, cached as a checksummed string.
    address: String,
}

impl OrionChainClient {
    pub fn new(
        gateway: BlockchainGateway,
        gas: GasPriceFeed,
        signer: OrderSigner,
        registry: Arc<TokenRegistry>,
        contract: Address,
        chain_id: u64,
    ) -> Self {
        let address = signer.address().to_checksum(None);
        Self {
            gateway,
            gas,
            signer,
            registry,
            contract,
            chain_id,
            address,
        }
    }

    /// Scale a display amount into the token's native units.
    fn native_units(&self, amount: Decimal, asset: &str) -> Result<U256> {
        let token = self
            .registry
            .get(asset)
            .ok_or_else(|| BrokerError::UnknownAsset(asset.to_string()))?;
        let units = to_token_units(amount, token.decimals)
            .ok_or(BrokerError::AmountOverflow(amount))?;
        Ok(U256::from(units))
    }

    /// Fill, sign, and broadcast a contract call; returns the pending
    /// transaction record.
    #[instrument(skip(self, input), fields(method = ?method, asset, %amount))]
    async fn broadcast(
        &self,
        method: TxMethod,
        asset: &str,
        amount: Decimal,
        to: Address,
        value: U256,
        input: Vec<u8>,
        gas_limit: u64,
    ) -> Result<Transaction> {
        let nonce = self
            .gateway
            .get_nonce(&self.address)
            .await?
            .ok_or_else(|| BrokerError::NonceUnavailable(self.address.clone()))?;

        let gas_gwei = self.gas.fast_gwei().await?;

        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: u128::from(gas_gwei) * 1_000_000_000,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input: Bytes::from(input),
        };

        let signature = self
            .signer
            .wallet()
            .sign_transaction_sync(&mut tx)
            .context("Transaction signing failed")?;
        let signed = tx.into_signed(signature);

        let raw = hex::encode_prefixed(signed.encoded_2718());
        let transaction_hash = hex::encode_prefixed(signed.hash());

        self.gateway.execute(&raw).await?;

        info!(
            hash = %transaction_hash,
            gas_gwei,
            nonce,
            "Transaction broadcast"
        );

        Ok(Transaction {
            transaction_hash,
            method,
            asset: asset.to_string(),
            amount,
            create_time: now_ms(),
            status: TransactionStatus::Pending,
        })
    }
}

#[async_trait]
impl ChainClient for OrionChainClient {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn hash_order(&self, order: &BlockchainOrder) -> Result<String> {
        super::signer::hash_order(order)
    }

    fn sign_trade(&self, sub_order: &SubOrder, trade: &Trade) -> Result<BlockchainOrder> {
        self.signer.sign_trade(sub_order, trade)
    }

    fn sign_auth(&self, payload: &str) -> Result<String> {
        self.signer.sign_auth(payload)
    }

    async fn get_allowance(&self, asset: &str) -> Result<Decimal> {
        self.gateway.get_allowance(&self.address, asset).await
    }

    async fn get_nonce(&self) -> Result<Option<u64>> {
        self.gateway.get_nonce(&self.address).await
    }

    async fn get_stake(&self) -> Result<Decimal> {
        self.gateway.get_stake(&self.address).await
    }

    async fn get_transaction_status(&self, hash: &str) -> Result<TxQueryStatus> {
        self.gateway.get_transaction_status(hash).await
    }

    async fn get_liabilities(&self) -> Result<Vec<Liability>> {
        self.gateway.get_liabilities(&self.address).await
    }

    async fn get_contract_balance(&self) -> Result<HashMap<String, Decimal>> {
        self.gateway.get_contract_balance(&self.address).await
    }

    async fn get_wallet_balance(&self) -> Result<HashMap<String, Decimal>> {
        self.gateway.get_wallet_balance(&self.address).await
    }

    async fn deposit_eth(&self, amount: Decimal) -> Result<Transaction> {
        let value = self.native_units(amount, "ETH")?;
        self.broadcast(
            TxMethod::DepositEth,
            "ETH",
            amount,
            self.contract,
            value,
            depositCall {}.abi_encode(),
            GAS_LIMIT_DEPOSIT_ETH,
        )
        .await
    }

    async fn deposit_erc20(&self, amount: Decimal, asset: &str) -> Result<Transaction> {
        let asset_address = self.registry.address(asset)?;
        let units = self.native_units(amount, asset)?;
        self.broadcast(
            TxMethod::DepositErc20,
            asset,
            amount,
            self.contract,
            U256::ZERO,
            depositAssetCall {
                assetAddress: asset_address,
                amount: units,
            }
            .abi_encode(),
            GAS_LIMIT_DEPOSIT_ERC20,
        )
        .await
    }

    async fn withdraw(&self, amount: Decimal, asset: &str) -> Result<Transaction> {
        let asset_address = self.registry.address(asset)?;
        let units = self.native_units(amount, asset)?;
        self.broadcast(
            TxMethod::Withdraw,
            asset,
            amount,
            self.contract,
            U256::ZERO,
            withdrawCall {
                assetAddress: asset_address,
                amount: units,
            }
            .abi_encode(),
            GAS_LIMIT_WITHDRAW,
        )
        .await
    }

    async fn approve_erc20(&self, amount: Decimal, asset: &str) -> Result<Transaction> {
        let token_address = self.registry.address(asset)?;
        let units = self.native_units(amount, asset)?;
        self.broadcast(
            TxMethod::Approve,
            asset,
            amount,
            token_address,
            U256::ZERO,
            approveCall {
                spender: self.contract,
                amount: units,
            }
            .abi_encode(),
            GAS_LIMIT_APPROVE,
        )
        .await
    }

    async fn lock_stake(&self, amount: Decimal) -> Result<Transaction> {
        let units = self.native_units(amount, FEE_ASSET)?;
        self.broadcast(
            TxMethod::LockStake,
            FEE_ASSET,
            amount,
            self.contract,
            U256::ZERO,
            lockStakeCall { stakeAmount: units }.abi_encode(),
            GAS_LIMIT_LOCK_STAKE,
        )
        .await
    }

    async fn release_stake(&self) -> Result<Transaction> {
        self.broadcast(
            TxMethod::ReleaseStake,
            FEE_ASSET,
            Decimal::ZERO,
            self.contract,
            U256::ZERO,
            requestReleaseStakeCall {}.abi_encode(),
            GAS_LIMIT_RELEASE_STAKE,
        )
        .await
    }
}
