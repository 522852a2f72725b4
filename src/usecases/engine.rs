//! Sub-order Engine - Lifecycle State Machine
//!
//! Drives a sub-order from creation through venue placement, polling,
//! terminal status, and acknowledgement to the hub. All handlers for a
//! given id are serialized behind a keyed lock, so the status machine is
//! free of races; handlers for distinct ids run in parallel.
//!
//! Status sequence per id is a prefix of
//! PREPARE → ACCEPTED → (FILLED | CANCELED | REJECTED). Terminal states
//! never regress; the single exception is the hub-forced
//! ACCEPTED → REJECTED override in the acknowledgement handler.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::adapters::exchange::ExchangeRegistry;
use crate::domain::now_ms;
use crate::domain::order::{
    CreateSubOrder, StatusAck, SubOrder, SubOrderReport, SubOrderStatus, Trade, TradeStatus,
};
use crate::error::BrokerError;
use crate::ports::chain::ChainClient;
use crate::ports::hub::HubOutbound;
use crate::ports::store::Store;

/// The sub-order lifecycle engine.
pub struct SubOrderEngine<S: Store, C: ChainClient> {
    store: Arc<S>,
    chain: Arc<C>,
    exchanges: Arc<ExchangeRegistry>,
    hub: Arc<dyn HubOutbound>,
    /// Per-id handler locks.
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
    /// State-change feed for the operator UI.
    updates: broadcast::Sender<SubOrderReport>,
}

impl<S: Store, C: ChainClient> SubOrderEngine<S, C> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        exchanges: Arc<ExchangeRegistry>,
        hub: Arc<dyn HubOutbound>,
    ) -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            store,
            chain,
            exchanges,
            hub,
            locks: Mutex::new(HashMap::new()),
            updates,
        }
    }

    /// Subscribe to sub-order state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SubOrderReport> {
        self.updates.subscribe()
    }

    /// Acquire the handler lock for one sub-order id.
    async fn lock_id(&self, id: u64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Broadcast a state change to UI subscribers.
    fn publish(&self, report: &SubOrderReport) {
        let _ = self.updates.send(report.clone());
    }

    /// Build the status report for an id.
    ///
    /// PREPARE is private to the broker and reported as ACCEPTED. An
    /// unknown id reports a null status: the hub may poll ahead of a
    /// restart-recovered broker. The settlement order is recomputed on
    /// demand whenever a trade exists; identical inputs produce identical
    /// signatures.
    async fn report(&self, id: u64) -> Result<SubOrderReport> {
        let Some(sub_order) = self.store.sub_order_by_id(id).await? else {
            return Ok(SubOrderReport {
                id,
                status: None,
                filled_amount: Decimal::ZERO,
                blockchain_order: None,
            });
        };

        let trade = match &sub_order.exchange_order_id {
            Some(eid) => {
                self.store
                    .trade_by_exchange_id(&sub_order.exchange, eid)
                    .await?
            }
            None => None,
        };

        let blockchain_order = trade
            .as_ref()
            .map(|t| self.chain.sign_trade(&sub_order, t))
            .transpose()?;

        let status = match sub_order.status {
            SubOrderStatus::Prepare => SubOrderStatus::Accepted,
            other => other,
        };

        Ok(SubOrderReport {
            id,
            status: Some(status),
            filled_amount: sub_order.filled_amount,
            blockchain_order,
        })
    }

    /// Handle `create_sub_order`. Replays are idempotent: an existing id
    /// short-circuits into a status check without touching the venue.
    #[instrument(skip(self, request), fields(id = request.id, exchange = %request.exchange))]
    pub async fn on_create_sub_order(&self, request: CreateSubOrder) -> Result<SubOrderReport> {
        let _guard = self.lock_id(request.id).await;

        if self.store.sub_order_by_id(request.id).await?.is_some() {
            debug!("Replayed create for known sub-order");
            return self.report(request.id).await;
        }

        let mut sub_order = SubOrder {
            id: request.id,
            symbol: request.symbol,
            side: request.side,
            price: request.price,
            amount: request.amount,
            exchange: request.exchange,
            timestamp: now_ms(),
            status: SubOrderStatus::Prepare,
            filled_amount: Decimal::ZERO,
            exchange_order_id: None,
            sent_to_aggregator: false,
        };
        self.store.insert_sub_order(&sub_order).await?;

        let placement = match self.exchanges.get(&sub_order.exchange) {
            Some(venue) => {
                venue
                    .submit_sub_order(
                        sub_order.id,
                        &sub_order.symbol,
                        sub_order.side,
                        sub_order.amount,
                        sub_order.price,
                    )
                    .await
            }
            None => Err(BrokerError::UnknownVenue(sub_order.exchange.clone()).into()),
        };

        match placement {
            Ok(venue_order) => {
                sub_order.exchange_order_id = Some(venue_order.exchange_order_id);
                sub_order.status = SubOrderStatus::Accepted;
                info!(
                    exchange_order_id = ?sub_order.exchange_order_id,
                    "Sub-order accepted by venue"
                );
            }
            Err(e) => {
                warn!(error = %e, "Venue rejected sub-order");
                sub_order.status = SubOrderStatus::Rejected;
            }
        }

        self.store.update_sub_order(&sub_order).await?;

        let report = self.report(sub_order.id).await?;
        self.publish(&report);
        Ok(report)
    }

    /// Handle `cancel_sub_order`.
    ///
    /// PREPARE returns `None`: the handler lock means a submit is never
    /// in flight here, so a PREPARE is an unresolved placement (e.g.
    /// recovered after a crash) that the polling loop must settle first.
    /// ACCEPTED forwards an advisory cancel to the venue; the terminal
    /// status arrives through polling. Terminal states report directly.
    #[instrument(skip(self))]
    pub async fn on_cancel_sub_order(&self, id: u64) -> Result<Option<SubOrderReport>> {
        let _guard = self.lock_id(id).await;

        let sub_order = self
            .store
            .sub_order_by_id(id)
            .await?
            .ok_or(BrokerError::NotFound(id))?;

        match sub_order.status {
            SubOrderStatus::Prepare => Ok(None),
            SubOrderStatus::Accepted => {
                match self.exchanges.get(&sub_order.exchange) {
                    Some(venue) => {
                        if let Err(e) = venue.cancel_sub_order(&sub_order).await {
                            warn!(error = %e, "Venue cancel request failed");
                        }
                    }
                    None => {
                        warn!(exchange = %sub_order.exchange, "Cancel for unknown venue");
                    }
                }
                Ok(None)
            }
            _ => Ok(Some(self.report(id).await?)),
        }
    }

    /// Handle `check_sub_order`.
    pub async fn on_check_sub_order(&self, id: u64) -> Result<SubOrderReport> {
        let _guard = self.lock_id(id).await;
        self.report(id).await
    }

    /// Handle `sub_order_status_accepted`.
    ///
    /// A hub-reported REJECTED overrides a non-terminal local status (the
    /// hub is authoritative on rejection). When the acknowledged status
    /// matches a terminal local status, resending stops.
    #[instrument(skip(self, ack), fields(id = ack.id, status = %ack.status))]
    pub async fn on_sub_order_status_accepted(&self, ack: StatusAck) -> Result<()> {
        let _guard = self.lock_id(ack.id).await;

        let Some(mut sub_order) = self.store.sub_order_by_id(ack.id).await? else {
            warn!("Acknowledgement for unknown sub-order");
            return Ok(());
        };

        let mut changed = false;
        let mut status_changed = false;

        if ack.status == SubOrderStatus::Rejected
            && sub_order.status != SubOrderStatus::Rejected
            && !sub_order.status.is_terminal()
        {
            info!(previous = %sub_order.status, "Hub forced rejection");
            sub_order.status = SubOrderStatus::Rejected;
            changed = true;
            status_changed = true;
        }

        if ack.status == sub_order.status && sub_order.status.is_terminal() {
            if !sub_order.sent_to_aggregator {
                sub_order.sent_to_aggregator = true;
                changed = true;
            }
        }

        if changed {
            self.store.update_sub_order(&sub_order).await?;
        }
        if status_changed {
            let report = self.report(ack.id).await?;
            self.publish(&report);
        }

        Ok(())
    }

    /// Handle a venue-terminal trade event from polling.
    ///
    /// The trade is persisted before the sub-order turns terminal, so a
    /// crash between the two writes leaves enough state to recompute the
    /// settlement order. Redelivery against an already-terminal
    /// sub-order is a no-op.
    #[instrument(skip(self, trade), fields(exchange = %trade.exchange, exchange_order_id = %trade.exchange_order_id))]
    pub async fn on_trade(&self, trade: Trade) -> Result<()> {
        let Some(known) = self
            .store
            .sub_order_by_exchange_id(&trade.exchange, &trade.exchange_order_id)
            .await?
        else {
            warn!("Trade for unknown sub-order");
            return Ok(());
        };

        let _guard = self.lock_id(known.id).await;

        let mut sub_order = self
            .store
            .sub_order_by_id(known.id)
            .await?
            .context("Sub-order vanished under lock")?;

        if sub_order.status.is_terminal() {
            debug!(id = sub_order.id, "Trade redelivered for terminal sub-order");
            return Ok(());
        }

        if trade.status == TradeStatus::Filled && trade.amount != sub_order.amount {
            anyhow::bail!(
                "partial fill unsupported: sub-order {} amount {} filled {}",
                sub_order.id,
                sub_order.amount,
                trade.amount
            );
        }

        sub_order.filled_amount = trade.amount;
        sub_order.status = match trade.status {
            TradeStatus::Filled => SubOrderStatus::Filled,
            TradeStatus::Canceled => SubOrderStatus::Canceled,
        };

        if trade.amount > Decimal::ZERO {
            self.store.insert_trade(&trade).await?;
        }
        self.store.update_sub_order(&sub_order).await?;

        info!(id = sub_order.id, status = %sub_order.status, "Sub-order terminal");

        let report = self.report(sub_order.id).await?;
        self.publish(&report);
        if let Err(e) = self.hub.send_sub_order_status(&report).await {
            // The resend loop redelivers until the hub acknowledges.
            debug!(error = %e, "Status push deferred to resend loop");
        }

        Ok(())
    }
}
