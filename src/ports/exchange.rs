//! Exchange Port - Venue Adapter Interface
//!
//! One implementation per venue. Adapters paper over venue idiosyncrasies
//! (funding-account transfers before withdrawal, optimistic withdrawal
//! statuses) so the engine and the reconciler see a uniform surface.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::order::{Side, SubOrder, Trade};
use crate::domain::settlement::{Withdrawal, WithdrawalStatus};

/// Venue answer to an accepted order placement.
#[derive(Debug, Clone)]
pub struct VenueOrder {
    /// Venue-assigned order identifier.
    pub exchange_order_id: String,
}

/// Venue withdrawal constraints for a currency.
#[derive(Debug, Clone)]
pub struct WithdrawLimit {
    /// Minimum withdrawable amount.
    pub min: Decimal,
    /// Flat withdrawal fee.
    pub fee: Decimal,
}

/// Non-pending status observed for a tracked withdrawal.
#[derive(Debug, Clone)]
pub struct WithdrawalUpdate {
    pub exchange_withdraw_id: String,
    pub status: WithdrawalStatus,
}

/// Trait for venue adapters.
#[async_trait]
pub trait Exchange: Send + Sync + 'static {
    /// Venue identifier as used in sub-orders.
    fn id(&self) -> &str;

    /// Place a limit order on the venue.
    ///
    /// The hub-assigned `id` is passed through as the client order id, so
    /// a retried submit observes the original placement instead of
    /// creating a second order.
    ///
    /// # Errors
    /// Any venue-reported rejection surfaces as `BrokerError::Submit`.
    async fn submit_sub_order(
        &self,
        id: u64,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> anyhow::Result<VenueOrder>;

    /// Request cancellation. The result is advisory; the authoritative
    /// terminal status arrives through `check_sub_orders`.
    async fn cancel_sub_order(&self, sub_order: &SubOrder) -> anyhow::Result<()>;

    /// Poll the venue for the given sub-orders and return a `Trade` for
    /// each one that has reached FILLED or CANCELED venue-side. A venue
    /// cancellation without a reported fill carries amount 0.
    async fn check_sub_orders(&self, sub_orders: &[SubOrder]) -> anyhow::Result<Vec<Trade>>;

    /// Free balances, filtered to currencies the chain recognizes.
    async fn balances(&self) -> anyhow::Result<HashMap<String, Decimal>>;

    /// Whether on-chain withdrawals may be sourced from this venue.
    fn has_withdraw(&self) -> bool;

    /// Withdrawal constraints for a currency.
    async fn withdraw_limit(&self, currency: &str) -> anyhow::Result<WithdrawLimit>;

    /// Initiate a withdrawal to `address`. Venue errors are swallowed and
    /// reported as `None`; the liability loop retries on a later tick.
    async fn withdraw(&self, currency: &str, amount: Decimal, address: &str) -> Option<String>;

    /// Poll the venue for the given withdrawals. Only non-pending
    /// statuses are returned.
    async fn check_withdraws(
        &self,
        withdrawals: &[Withdrawal],
    ) -> anyhow::Result<Vec<WithdrawalUpdate>>;
}
