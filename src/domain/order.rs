//! Sub-order lifecycle types.
//!
//! A sub-order is a single venue-bound child order dispatched by the
//! aggregator hub. Its status machine is a prefix of
//! PREPARE → ACCEPTED → (FILLED | CANCELED | REJECTED); terminal states
//! are sticky, the sole exception being the hub-forced ACCEPTED → REJECTED
//! override.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::settlement::BlockchainOrder;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle status of a sub-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubOrderStatus {
    /// Persisted locally, venue placement still in flight. Never shown to
    /// the hub; reported as ACCEPTED.
    Prepare,
    /// Resting on the venue book with a venue-assigned order ID.
    Accepted,
    /// Filled in full venue-side.
    Filled,
    /// Canceled venue-side.
    Canceled,
    /// Rejected by the venue on submit, or force-rejected by the hub.
    Rejected,
}

impl SubOrderStatus {
    /// Terminal states never regress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

impl std::fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Prepare => "PREPARE",
            Self::Accepted => "ACCEPTED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// A venue-bound child order created by the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOrder {
    /// Hub-assigned numeric identifier, unique across the broker.
    pub id: u64,
    /// Trading symbol in `BASE-QUOTE` form (e.g. "BTC-USDT").
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Order amount in base currency.
    pub amount: Decimal,
    /// Venue identifier.
    pub exchange: String,
    /// Insert time, milliseconds since epoch. Doubles as the signed-order
    /// nonce, so signing stays a pure function of persisted state.
    pub timestamp: u64,
    /// Current lifecycle status.
    pub status: SubOrderStatus,
    /// Filled amount; equals `amount` iff status is FILLED.
    pub filled_amount: Decimal,
    /// Venue-assigned order ID, set when the placement is accepted.
    pub exchange_order_id: Option<String>,
    /// Whether the hub has durably acknowledged the latest terminal status.
    pub sent_to_aggregator: bool,
}

impl SubOrder {
    /// Base and quote currency split from the `BASE-QUOTE` symbol.
    pub fn currencies(&self) -> Option<(&str, &str)> {
        self.symbol.split_once('-')
    }
}

/// Venue-terminal state of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Filled,
    Canceled,
}

/// The venue-terminal record of a sub-order's fill or cancellation.
///
/// At most one trade exists per sub-order, keyed on
/// `(exchange, exchange_order_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Venue the trade happened on.
    pub exchange: String,
    /// Venue-assigned order ID.
    pub exchange_order_id: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed amount; 0 for a cancellation without fills.
    pub amount: Decimal,
    /// FILLED or CANCELED.
    pub status: TradeStatus,
}

/// Inbound request to create a sub-order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubOrder {
    pub id: u64,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub exchange: String,
}

/// Hub acknowledgement of a previously reported status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAck {
    pub id: u64,
    pub status: SubOrderStatus,
}

/// Sub-order status report sent to the hub and the operator UI.
///
/// `status` is `None` for an id the broker has never persisted (the hub
/// may poll ahead of a restart-recovered broker). `blockchain_order` is
/// present iff a trade exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOrderReport {
    pub id: u64,
    pub status: Option<SubOrderStatus>,
    pub filled_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain_order: Option<BlockchainOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!SubOrderStatus::Prepare.is_terminal());
        assert!(!SubOrderStatus::Accepted.is_terminal());
        assert!(SubOrderStatus::Filled.is_terminal());
        assert!(SubOrderStatus::Canceled.is_terminal());
        assert!(SubOrderStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_status_wire_form() {
        let json = serde_json::to_string(&SubOrderStatus::Accepted).unwrap();
        assert_eq!(json, "\"ACCEPTED\"");
        let side = serde_json::to_string(&Side::Buy).unwrap();
        assert_eq!(side, "\"buy\"");
    }

    #[test]
    fn test_symbol_split() {
        let sub = SubOrder {
            id: 1,
            symbol: "BTC-USDT".to_string(),
            side: Side::Buy,
            price: Decimal::ONE,
            amount: Decimal::ONE,
            exchange: "binance".to_string(),
            timestamp: 0,
            status: SubOrderStatus::Prepare,
            filled_amount: Decimal::ZERO,
            exchange_order_id: None,
            sent_to_aggregator: false,
        };
        assert_eq!(sub.currencies(), Some(("BTC", "USDT")));
    }
}
