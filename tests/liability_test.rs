//! Integration tests for liability discharge planning and the balance
//! broadcast debounce.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{chain_with_real_signing, MockHub, MockVenue};
use orion_broker::adapters::exchange::ExchangeRegistry;
use orion_broker::adapters::persistence::FileStore;
use orion_broker::domain::now_secs;
use orion_broker::domain::settlement::{
    Liability, Transaction, TransactionStatus, TxMethod,
};
use orion_broker::ports::exchange::WithdrawLimit;
use orion_broker::ports::store::Store;
use orion_broker::usecases::engine::SubOrderEngine;
use orion_broker::usecases::liability::LiabilityPlanner;
use orion_broker::usecases::reconciler::{BalanceBook, Reconciler};

const DUE_PERIOD: u64 = 3600;

fn due_liability(asset: &str, outstanding: Decimal) -> Liability {
    Liability {
        asset_name: asset.to_string(),
        outstanding_amount: outstanding,
        timestamp: now_secs() - DUE_PERIOD - 60,
    }
}

fn pending_tx(hash: &str) -> Transaction {
    Transaction {
        transaction_hash: hash.to_string(),
        method: TxMethod::DepositErc20,
        asset: "USDT".to_string(),
        amount: dec!(1),
        create_time: 0,
        status: TransactionStatus::Pending,
    }
}

async fn fresh_store() -> (Arc<FileStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().to_str().unwrap()).await.unwrap());
    (store, dir)
}

fn quiet_venue(id: &str) -> MockVenue {
    let mut venue = MockVenue::new();
    venue.expect_id().return_const(id.to_owned());
    venue
}

#[tokio::test]
async fn liability_covered_by_wallet_deposits() {
    let (store, _dir) = fresh_store().await;

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().returning(|| {
        Ok(HashMap::from([
            ("USDT".to_string(), dec!(200)),
            ("ETH".to_string(), dec!(0.1)),
        ]))
    });
    chain
        .expect_get_allowance()
        .returning(|_| Ok(dec!(1000)));
    chain
        .expect_deposit_erc20()
        .times(1)
        .withf(|amount, asset| *amount == dec!(100) && asset == "USDT")
        .returning(|amount, asset| {
            Ok(Transaction {
                transaction_hash: "0xdeadbeef".to_string(),
                method: TxMethod::DepositErc20,
                asset: asset.to_string(),
                amount,
                create_time: 0,
                status: TransactionStatus::Pending,
            })
        });

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(quiet_venue("binance"))]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        Arc::new(BalanceBook::default()),
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("USDT", dec!(100)))
        .await
        .unwrap();

    assert_eq!(store.pending_transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn liability_shortfall_withdraws_from_venue() {
    let (store, _dir) = fresh_store().await;

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().returning(|| {
        Ok(HashMap::from([
            ("USDT".to_string(), dec!(0)),
            ("ETH".to_string(), dec!(0.1)),
        ]))
    });
    chain.expect_deposit_erc20().never();
    chain.expect_deposit_eth().never();

    let mut venue = quiet_venue("binance");
    venue.expect_has_withdraw().return_const(true);
    venue.expect_withdraw_limit().returning(|_| {
        Ok(WithdrawLimit {
            min: dec!(10),
            fee: dec!(1),
        })
    });
    venue
        .expect_withdraw()
        .times(1)
        .withf(|currency, amount, _| currency == "USDT" && *amount == dec!(101))
        .returning(|_, _, _| Some("w1".to_string()));

    let balances = Arc::new(BalanceBook::default());
    balances.replace("binance", HashMap::from([("USDT".to_string(), dec!(200))]));

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(venue)]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        balances,
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("USDT", dec!(100)))
        .await
        .unwrap();

    let withdrawals = store.withdrawals_to_check().await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].amount, dec!(101));
    assert_eq!(withdrawals[0].exchange, "binance");
}

#[tokio::test]
async fn pending_transaction_guards_the_planner() {
    let (store, _dir) = fresh_store().await;
    store.insert_transaction(&pending_tx("0x1")).await.unwrap();

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().never();
    chain.expect_deposit_erc20().never();

    let mut venue = quiet_venue("binance");
    venue.expect_withdraw().never();

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(venue)]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        Arc::new(BalanceBook::default()),
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("USDT", dec!(100)))
        .await
        .unwrap();
}

#[tokio::test]
async fn pending_withdrawal_guards_the_planner() {
    let (store, _dir) = fresh_store().await;
    store
        .insert_withdrawal(&orion_broker::domain::settlement::Withdrawal {
            exchange_withdraw_id: "w0".to_string(),
            exchange: "binance".to_string(),
            currency: "USDT".to_string(),
            amount: dec!(50),
            status: orion_broker::domain::settlement::WithdrawalStatus::Pending,
        })
        .await
        .unwrap();

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().never();
    chain.expect_deposit_erc20().never();

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(quiet_venue("binance"))]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        Arc::new(BalanceBook::default()),
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("USDT", dec!(100)))
        .await
        .unwrap();
}

#[tokio::test]
async fn liability_within_grace_period_is_ignored() {
    let (store, _dir) = fresh_store().await;

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().never();

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(quiet_venue("binance"))]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        Arc::new(BalanceBook::default()),
        DUE_PERIOD,
    );

    let fresh = Liability {
        asset_name: "USDT".to_string(),
        outstanding_amount: dec!(100),
        timestamp: now_secs(),
    };
    planner.manage(&fresh).await.unwrap();
}

#[tokio::test]
async fn first_qualifying_venue_wins() {
    let (store, _dir) = fresh_store().await;

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().returning(|| {
        Ok(HashMap::from([
            ("USDT".to_string(), dec!(0)),
            ("ETH".to_string(), dec!(0.1)),
        ]))
    });

    // First venue has a balance below the fee-inclusive amount.
    let mut poor = quiet_venue("poor");
    poor.expect_has_withdraw().return_const(true);
    poor.expect_withdraw_limit().returning(|_| {
        Ok(WithdrawLimit {
            min: dec!(10),
            fee: dec!(1),
        })
    });
    poor.expect_withdraw().never();

    let mut rich = quiet_venue("rich");
    rich.expect_has_withdraw().return_const(true);
    rich.expect_withdraw_limit().returning(|_| {
        Ok(WithdrawLimit {
            min: dec!(10),
            fee: dec!(1),
        })
    });
    rich.expect_withdraw()
        .times(1)
        .returning(|_, _, _| Some("w2".to_string()));

    let balances = Arc::new(BalanceBook::default());
    balances.replace("poor", HashMap::from([("USDT".to_string(), dec!(50))]));
    balances.replace("rich", HashMap::from([("USDT".to_string(), dec!(500))]));

    let exchanges = Arc::new(ExchangeRegistry::new(vec![
        Arc::new(poor),
        Arc::new(rich),
    ]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        balances,
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("USDT", dec!(100)))
        .await
        .unwrap();

    let withdrawals = store.withdrawals_to_check().await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].exchange, "rich");
}

#[tokio::test]
async fn eth_liability_reserves_gas() {
    let (store, _dir) = fresh_store().await;

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().returning(|| {
        Ok(HashMap::from([("ETH".to_string(), dec!(1.045))]))
    });
    chain
        .expect_deposit_eth()
        .times(1)
        .withf(|amount| *amount == dec!(1))
        .returning(|amount| {
            Ok(Transaction {
                transaction_hash: "0xfeed".to_string(),
                method: TxMethod::DepositEth,
                asset: "ETH".to_string(),
                amount,
                create_time: 0,
                status: TransactionStatus::Pending,
            })
        });

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(quiet_venue("binance"))]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        Arc::new(BalanceBook::default()),
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("ETH", dec!(1)))
        .await
        .unwrap();

    assert_eq!(store.pending_transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn low_allowance_defers_erc20_deposit() {
    let (store, _dir) = fresh_store().await;

    let mut chain = chain_with_real_signing();
    chain.expect_get_wallet_balance().returning(|| {
        Ok(HashMap::from([
            ("USDT".to_string(), dec!(200)),
            ("ETH".to_string(), dec!(0.1)),
        ]))
    });
    chain.expect_get_allowance().returning(|_| Ok(dec!(5)));
    chain.expect_deposit_erc20().never();

    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(quiet_venue("binance"))]));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::new(chain),
        exchanges,
        Arc::new(BalanceBook::default()),
        DUE_PERIOD,
    );

    planner
        .manage(&due_liability("USDT", dec!(100)))
        .await
        .unwrap();

    assert!(store.pending_transactions().await.unwrap().is_empty());
}

/// Build a reconciler whose engine and planner share the given mocks.
async fn build_reconciler(
    venue: MockVenue,
    hub: MockHub,
) -> (Arc<Reconciler<FileStore, common::MockChain>>, tempfile::TempDir) {
    let (store, dir) = fresh_store().await;
    let chain = Arc::new(chain_with_real_signing());
    let exchanges = Arc::new(ExchangeRegistry::new(vec![Arc::new(venue)]));
    let hub: Arc<dyn orion_broker::ports::hub::HubOutbound> = Arc::new(hub);
    let balances = Arc::new(BalanceBook::default());

    let engine = Arc::new(SubOrderEngine::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&exchanges),
        Arc::clone(&hub),
    ));
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&exchanges),
        Arc::clone(&balances),
        DUE_PERIOD,
    );

    (
        Arc::new(Reconciler::new(
            store, chain, exchanges, hub, engine, balances, planner,
        )),
        dir,
    )
}

#[tokio::test]
async fn balances_are_sent_when_changed() {
    let mut venue = quiet_venue("binance");
    venue
        .expect_balances()
        .returning(|| Ok(HashMap::from([("USDT".to_string(), dec!(100))])));

    let mut hub = MockHub::new();
    hub.expect_last_balances_json().returning(|| None);
    hub.expect_send_balances()
        .times(1)
        .returning(|_| Ok(()));

    let (reconciler, _dir) = build_reconciler(venue, hub).await;
    reconciler.poll_balances().await.unwrap();
}

#[tokio::test]
async fn unchanged_balances_are_not_resent() {
    let mut venue = quiet_venue("binance");
    venue
        .expect_balances()
        .returning(|| Ok(HashMap::from([("USDT".to_string(), dec!(100))])));

    // The payload the reconciler will build for the same book contents.
    let expected = {
        let book = BalanceBook::default();
        book.replace("binance", HashMap::from([("USDT".to_string(), dec!(100))]));
        book.to_json().unwrap()
    };

    let mut hub = MockHub::new();
    hub.expect_last_balances_json()
        .returning(move || Some(expected.clone()));
    hub.expect_send_balances().never();

    let (reconciler, _dir) = build_reconciler(venue, hub).await;
    reconciler.poll_balances().await.unwrap();
}
