//! Store Port - Durable Keyed State Interface
//!
//! Persistence for sub-orders, trades, withdrawals, and on-chain
//! transactions. All operations are idempotent upserts, durable across
//! restarts, and safe under concurrent calls from the reconciler loops
//! and the hub handlers.

use async_trait::async_trait;

use crate::domain::order::{SubOrder, Trade};
use crate::domain::settlement::{Transaction, TransactionStatus, Withdrawal, WithdrawalStatus};

/// Trait for broker state persistence.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Persist a new sub-order.
    async fn insert_sub_order(&self, sub_order: &SubOrder) -> anyhow::Result<()>;

    /// Persist an updated sub-order (same id).
    async fn update_sub_order(&self, sub_order: &SubOrder) -> anyhow::Result<()>;

    /// Fetch a sub-order by hub-assigned id.
    async fn sub_order_by_id(&self, id: u64) -> anyhow::Result<Option<SubOrder>>;

    /// Fetch a sub-order by its venue-assigned order id.
    async fn sub_order_by_exchange_id(
        &self,
        exchange: &str,
        exchange_order_id: &str,
    ) -> anyhow::Result<Option<SubOrder>>;

    /// Sub-orders with status PREPARE or ACCEPTED.
    async fn open_sub_orders(&self) -> anyhow::Result<Vec<SubOrder>>;

    /// Sub-orders that need venue polling: ACCEPTED with a venue order id.
    async fn sub_orders_to_check(&self) -> anyhow::Result<Vec<SubOrder>>;

    /// Terminal sub-orders the hub has not acknowledged yet.
    async fn sub_orders_to_resend(&self) -> anyhow::Result<Vec<SubOrder>>;

    /// All sub-orders, for the operator history surface.
    async fn all_sub_orders(&self) -> anyhow::Result<Vec<SubOrder>>;

    /// Persist the venue-terminal trade of a sub-order.
    async fn insert_trade(&self, trade: &Trade) -> anyhow::Result<()>;

    /// Fetch the trade recorded for `(exchange, exchange_order_id)`.
    /// At most one exists per sub-order.
    async fn trade_by_exchange_id(
        &self,
        exchange: &str,
        exchange_order_id: &str,
    ) -> anyhow::Result<Option<Trade>>;

    /// Persist a freshly initiated withdrawal.
    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> anyhow::Result<()>;

    /// Update a withdrawal's status. Terminal statuses are sticky; an
    /// update against a terminal record is ignored.
    async fn update_withdrawal_status(
        &self,
        exchange_withdraw_id: &str,
        status: WithdrawalStatus,
    ) -> anyhow::Result<()>;

    /// Withdrawals still pending venue confirmation.
    async fn withdrawals_to_check(&self) -> anyhow::Result<Vec<Withdrawal>>;

    /// Persist a broadcast transaction.
    async fn insert_transaction(&self, transaction: &Transaction) -> anyhow::Result<()>;

    /// Update a transaction's status. OK and FAIL are sticky.
    async fn update_transaction_status(
        &self,
        transaction_hash: &str,
        status: TransactionStatus,
    ) -> anyhow::Result<()>;

    /// Transactions awaiting chain confirmation.
    async fn pending_transactions(&self) -> anyhow::Result<Vec<Transaction>>;
}
