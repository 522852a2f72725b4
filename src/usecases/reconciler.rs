//! Reconciler - Periodic Background Loops
//!
//! Five independent loops: balance broadcast, sub-order resend + venue
//! polling, withdrawal polling, transaction polling, and liability
//! planning. Every loop body is wrapped log-and-continue, and no loop
//! starts a tick while its previous tick is still running.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::engine::SubOrderEngine;
use super::liability::LiabilityPlanner;
use crate::adapters::exchange::ExchangeRegistry;
use crate::domain::now_ms;
use crate::domain::settlement::{TransactionStatus, TxQueryStatus};
use crate::ports::chain::ChainClient;
use crate::ports::hub::HubOutbound;
use crate::ports::store::Store;

const BALANCES_PERIOD: Duration = Duration::from_secs(10);
const SUB_ORDERS_PERIOD: Duration = Duration::from_secs(10);
const WITHDRAWALS_PERIOD: Duration = Duration::from_secs(60);
const TRANSACTIONS_PERIOD: Duration = Duration::from_secs(10);
const LIABILITIES_PERIOD: Duration = Duration::from_secs(300);

/// A transaction the chain has never seen for this long is dropped.
const TX_NONE_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Last known venue balances.
///
/// Written only by the balances loop; read by the liability planner and
/// the operator REST surface. The whole per-venue map is replaced
/// atomically per poll.
#[derive(Default)]
pub struct BalanceBook {
    inner: std::sync::RwLock<HashMap<String, HashMap<String, Decimal>>>,
}

impl BalanceBook {
    /// Replace one venue's balances.
    pub fn replace(&self, exchange: &str, balances: HashMap<String, Decimal>) {
        self.inner
            .write()
            .expect("balance book poisoned")
            .insert(exchange.to_string(), balances);
    }

    /// Last known balance of one currency on one venue.
    pub fn get(&self, exchange: &str, currency: &str) -> Option<Decimal> {
        self.inner
            .read()
            .expect("balance book poisoned")
            .get(exchange)
            .and_then(|m| m.get(currency))
            .copied()
    }

    /// Full copy, for the operator REST surface.
    pub fn snapshot(&self) -> HashMap<String, HashMap<String, Decimal>> {
        self.inner.read().expect("balance book poisoned").clone()
    }

    /// Canonical JSON of the book: sorted keys, decimal strings. Equal
    /// books serialize identically, which makes payload comparison a
    /// valid duplicate-send suppression.
    pub fn to_json(&self) -> Result<String> {
        let inner = self.inner.read().expect("balance book poisoned");
        let ordered: BTreeMap<&str, BTreeMap<&str, String>> = inner
            .iter()
            .map(|(venue, balances)| {
                let currencies = balances
                    .iter()
                    .map(|(currency, amount)| (currency.as_str(), amount.to_string()))
                    .collect();
                (venue.as_str(), currencies)
            })
            .collect();
        Ok(serde_json::to_string(&ordered)?)
    }
}

/// Owns the background loops and their collaborators.
pub struct Reconciler<S: Store, C: ChainClient> {
    store: Arc<S>,
    chain: Arc<C>,
    exchanges: Arc<ExchangeRegistry>,
    hub: Arc<dyn HubOutbound>,
    engine: Arc<SubOrderEngine<S, C>>,
    balances: Arc<BalanceBook>,
    planner: LiabilityPlanner<S, C>,
}

impl<S: Store, C: ChainClient> Reconciler<S, C> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        exchanges: Arc<ExchangeRegistry>,
        hub: Arc<dyn HubOutbound>,
        engine: Arc<SubOrderEngine<S, C>>,
        balances: Arc<BalanceBook>,
        planner: LiabilityPlanner<S, C>,
    ) -> Self {
        Self {
            store,
            chain,
            exchanges,
            hub,
            engine,
            balances,
            planner,
        }
    }

    /// The shared balance book.
    pub fn balance_book(&self) -> Arc<BalanceBook> {
        Arc::clone(&self.balances)
    }

    /// Spawn all five loops. Each stops at its next yield once the
    /// shutdown channel fires; in-flight I/O completes.
    pub fn spawn_loops(
        self: &Arc<Self>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            spawn_tick("balances", BALANCES_PERIOD, shutdown.subscribe(), {
                let r = Arc::clone(self);
                move || {
                    let r = Arc::clone(&r);
                    async move { r.poll_balances().await }
                }
            }),
            spawn_tick("sub_orders", SUB_ORDERS_PERIOD, shutdown.subscribe(), {
                let r = Arc::clone(self);
                move || {
                    let r = Arc::clone(&r);
                    async move { r.poll_sub_orders().await }
                }
            }),
            spawn_tick("withdrawals", WITHDRAWALS_PERIOD, shutdown.subscribe(), {
                let r = Arc::clone(self);
                move || {
                    let r = Arc::clone(&r);
                    async move { r.poll_withdrawals().await }
                }
            }),
            spawn_tick("transactions", TRANSACTIONS_PERIOD, shutdown.subscribe(), {
                let r = Arc::clone(self);
                move || {
                    let r = Arc::clone(&r);
                    async move { r.poll_transactions().await }
                }
            }),
            spawn_tick("liabilities", LIABILITIES_PERIOD, shutdown.subscribe(), {
                let r = Arc::clone(self);
                move || {
                    let r = Arc::clone(&r);
                    async move { r.poll_liabilities().await }
                }
            }),
        ]
    }

    /// Poll venue balances and push the payload when it changed.
    pub async fn poll_balances(&self) -> Result<()> {
        for venue in self.exchanges.iter() {
            match venue.balances().await {
                Ok(balances) => self.balances.replace(venue.id(), balances),
                Err(e) => {
                    warn!(venue = venue.id(), error = %e, "Balance poll failed");
                }
            }
        }

        let payload = self.balances.to_json()?;
        if self.hub.last_balances_json().await.as_deref() != Some(payload.as_str()) {
            self.hub.send_balances(&payload).await?;
        }
        Ok(())
    }

    /// Resend unacknowledged terminal statuses, then poll venues for
    /// open sub-orders; terminal events flow through the engine.
    pub async fn poll_sub_orders(&self) -> Result<()> {
        for sub_order in self.store.sub_orders_to_resend().await? {
            match self.engine.on_check_sub_order(sub_order.id).await {
                Ok(report) => {
                    if let Err(e) = self.hub.send_sub_order_status(&report).await {
                        warn!(id = sub_order.id, error = %e, "Status resend failed");
                    }
                }
                Err(e) => {
                    warn!(id = sub_order.id, error = %e, "Status check failed");
                }
            }
        }

        let to_check = self.store.sub_orders_to_check().await?;
        for venue in self.exchanges.iter() {
            let batch: Vec<_> = to_check
                .iter()
                .filter(|s| s.exchange == venue.id())
                .cloned()
                .collect();
            if batch.is_empty() {
                continue;
            }

            match venue.check_sub_orders(&batch).await {
                Ok(trades) => {
                    for trade in trades {
                        if let Err(e) = self.engine.on_trade(trade).await {
                            warn!(venue = venue.id(), error = %e, "Trade handling failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(venue = venue.id(), error = %e, "Sub-order poll failed");
                }
            }
        }

        Ok(())
    }

    /// Poll venues for pending withdrawals and persist settled statuses.
    pub async fn poll_withdrawals(&self) -> Result<()> {
        let pending = self.store.withdrawals_to_check().await?;
        for venue in self.exchanges.iter() {
            let batch: Vec<_> = pending
                .iter()
                .filter(|w| w.exchange == venue.id())
                .cloned()
                .collect();
            if batch.is_empty() {
                continue;
            }

            match venue.check_withdraws(&batch).await {
                Ok(updates) => {
                    for update in updates {
                        self.store
                            .update_withdrawal_status(
                                &update.exchange_withdraw_id,
                                update.status,
                            )
                            .await?;
                    }
                }
                Err(e) => {
                    warn!(venue = venue.id(), error = %e, "Withdrawal poll failed");
                }
            }
        }

        Ok(())
    }

    /// Track pending transactions to a terminal status. A hash the chain
    /// has never seen within the timeout is treated as dropped.
    pub async fn poll_transactions(&self) -> Result<()> {
        for transaction in self.store.pending_transactions().await? {
            let hash = &transaction.transaction_hash;
            match self.chain.get_transaction_status(hash).await {
                Ok(TxQueryStatus::Ok) => {
                    self.store
                        .update_transaction_status(hash, TransactionStatus::Ok)
                        .await?;
                }
                Ok(TxQueryStatus::Fail) => {
                    self.store
                        .update_transaction_status(hash, TransactionStatus::Fail)
                        .await?;
                }
                Ok(TxQueryStatus::None)
                    if now_ms().saturating_sub(transaction.create_time)
                        > TX_NONE_TIMEOUT_MS =>
                {
                    warn!(hash = %hash, "Transaction never mined, marking failed");
                    self.store
                        .update_transaction_status(hash, TransactionStatus::Fail)
                        .await?;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(hash = %hash, error = %e, "Transaction status poll failed");
                }
            }
        }

        Ok(())
    }

    /// Fetch liabilities and let the planner act on each.
    pub async fn poll_liabilities(&self) -> Result<()> {
        for liability in self.chain.get_liabilities().await? {
            if let Err(e) = self.planner.manage(&liability).await {
                warn!(
                    asset = %liability.asset_name,
                    error = %e,
                    "Liability handling failed"
                );
            }
        }
        Ok(())
    }
}

/// Drive one loop: tick, run the body to completion, tick again.
/// `MissedTickBehavior::Delay` coalesces ticks a slow body skipped.
fn spawn_tick<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = tick().await {
                        warn!(loop_name = name, error = %e, "Loop tick failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(loop_name = name, "Loop stopped");
                    break;
                }
            }
        }
    })
}
