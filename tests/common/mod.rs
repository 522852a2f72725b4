//! Shared test fixtures: mock port implementations and builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use mockall::mock;
use rust_decimal::Decimal;

use orion_broker::adapters::chain::signer::OrderSigner;
use orion_broker::config::TokenConfig;
use orion_broker::domain::order::{Side, SubOrder, Trade};
use orion_broker::domain::settlement::{
    BlockchainOrder, Liability, Transaction, TxQueryStatus, Withdrawal,
};
use orion_broker::domain::token::TokenRegistry;
use orion_broker::ports::exchange::{VenueOrder, WithdrawLimit, WithdrawalUpdate};
use orion_broker::ports::hub::{BrokerRegistration, HubAuth};
use orion_broker::domain::order::{CreateSubOrder, SubOrderReport};

pub const TEST_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const MATCHER: &str = "0x1fF516E5ce789085CFF86d37fc27747dF852a80a";

mock! {
    pub Venue {}

    #[async_trait::async_trait]
    impl orion_broker::ports::exchange::Exchange for Venue {
        fn id(&self) -> &str;

        async fn submit_sub_order(
            &self,
            id: u64,
            symbol: &str,
            side: Side,
            amount: Decimal,
            price: Decimal,
        ) -> anyhow::Result<VenueOrder>;

        async fn cancel_sub_order(&self, sub_order: &SubOrder) -> anyhow::Result<()>;

        async fn check_sub_orders(&self, sub_orders: &[SubOrder]) -> anyhow::Result<Vec<Trade>>;

        async fn balances(&self) -> anyhow::Result<HashMap<String, Decimal>>;

        fn has_withdraw(&self) -> bool;

        async fn withdraw_limit(&self, currency: &str) -> anyhow::Result<WithdrawLimit>;

        async fn withdraw(
            &self,
            currency: &str,
            amount: Decimal,
            address: &str,
        ) -> Option<String>;

        async fn check_withdraws(
            &self,
            withdrawals: &[Withdrawal],
        ) -> anyhow::Result<Vec<WithdrawalUpdate>>;
    }
}

mock! {
    pub Chain {}

    #[async_trait::async_trait]
    impl orion_broker::ports::chain::ChainClient for Chain {
        fn address(&self) -> String;

        fn hash_order(&self, order: &BlockchainOrder) -> anyhow::Result<String>;

        fn sign_trade(
            &self,
            sub_order: &SubOrder,
            trade: &Trade,
        ) -> anyhow::Result<BlockchainOrder>;

        fn sign_auth(&self, payload: &str) -> anyhow::Result<String>;

        async fn get_allowance(&self, asset: &str) -> anyhow::Result<Decimal>;

        async fn get_nonce(&self) -> anyhow::Result<Option<u64>>;

        async fn get_stake(&self) -> anyhow::Result<Decimal>;

        async fn get_transaction_status(&self, hash: &str) -> anyhow::Result<TxQueryStatus>;

        async fn get_liabilities(&self) -> anyhow::Result<Vec<Liability>>;

        async fn get_contract_balance(&self) -> anyhow::Result<HashMap<String, Decimal>>;

        async fn get_wallet_balance(&self) -> anyhow::Result<HashMap<String, Decimal>>;

        async fn deposit_eth(&self, amount: Decimal) -> anyhow::Result<Transaction>;

        async fn deposit_erc20(&self, amount: Decimal, asset: &str) -> anyhow::Result<Transaction>;

        async fn withdraw(&self, amount: Decimal, asset: &str) -> anyhow::Result<Transaction>;

        async fn approve_erc20(&self, amount: Decimal, asset: &str) -> anyhow::Result<Transaction>;

        async fn lock_stake(&self, amount: Decimal) -> anyhow::Result<Transaction>;

        async fn release_stake(&self) -> anyhow::Result<Transaction>;
    }
}

mock! {
    pub Hub {}

    #[async_trait::async_trait]
    impl orion_broker::ports::hub::HubOutbound for Hub {
        async fn connect(&self, auth: HubAuth) -> anyhow::Result<()>;

        async fn register(&self, registration: &BrokerRegistration) -> anyhow::Result<()>;

        async fn send_sub_order_status(&self, report: &SubOrderReport) -> anyhow::Result<()>;

        async fn send_balances(&self, payload: &str) -> anyhow::Result<()>;

        async fn last_balances_json(&self) -> Option<String>;
    }
}

/// Registry with the tokens the scenarios use.
pub fn test_registry() -> Arc<TokenRegistry> {
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

/// A real signer so engine tests exercise genuine signatures.
pub fn test_signer() -> OrderSigner {
    OrderSigner::new(
        TEST_KEY,
        Address::from_str(MATCHER).unwrap(),
        3,
        test_registry(),
    )
    .unwrap()
}

/// Mock chain whose signing delegates to a real signer; reads are wired
/// per test.
pub fn chain_with_real_signing() -> MockChain {
    let mut chain = MockChain::new();
    let signer = test_signer();
    let address = signer.address().to_checksum(None);

    chain.expect_address().return_const(address);
    chain
        .expect_sign_trade()
        .returning(move |sub, trade| signer.sign_trade(sub, trade));
    chain
}

/// Standard BTC-USDT create request.
pub fn create_request(id: u64) -> CreateSubOrder {
    CreateSubOrder {
        id,
        symbol: "BTC-USDT".to_string(),
        side: Side::Buy,
        price: Decimal::from(10_000),
        amount: Decimal::new(1, 2),
        exchange: "binance".to_string(),
    }
}
