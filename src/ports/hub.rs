//! Hub Gateway Port - Aggregator Transport Interface
//!
//! The broker and the hub transport hold mutual references: the transport
//! dispatches inbound messages into `HubInbound` (implemented by the
//! broker), and the broker pushes outbound messages through `HubOutbound`
//! (implemented by the transport). The broker is constructed first, the
//! handler set attached, and only then is the transport started.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order::{CreateSubOrder, StatusAck, SubOrderReport};

/// Connection handshake: the broker address, the current time in
/// milliseconds, and a personal-message signature of its decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubAuth {
    pub address: String,
    pub time: u64,
    pub signature: String,
}

/// Operator metadata announced to the hub after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerRegistration {
    /// Broker wallet address.
    pub address: String,
    /// Human-readable broker name.
    pub name: String,
    /// Software version string.
    pub version: String,
    /// Venues this broker can route to.
    pub exchanges: Vec<String>,
}

/// Handlers the transport invokes on message receipt.
#[async_trait]
pub trait HubInbound: Send + Sync + 'static {
    /// Create and place a sub-order; idempotent on replay.
    async fn on_create_sub_order(&self, request: CreateSubOrder)
        -> anyhow::Result<SubOrderReport>;

    /// Request cancellation of a sub-order. `None` means the terminal
    /// status will arrive asynchronously through polling.
    async fn on_cancel_sub_order(&self, id: u64) -> anyhow::Result<Option<SubOrderReport>>;

    /// Report the current status of a sub-order.
    async fn on_check_sub_order(&self, id: u64) -> anyhow::Result<SubOrderReport>;

    /// The hub acknowledges a previously reported status.
    async fn on_sub_order_status_accepted(&self, ack: StatusAck) -> anyhow::Result<()>;

    /// The transport has been reestablished after a drop.
    async fn on_reconnect(&self) -> anyhow::Result<()>;
}

/// Outbound sends toward the hub.
#[async_trait]
pub trait HubOutbound: Send + Sync + 'static {
    /// Authenticate the connection.
    async fn connect(&self, auth: HubAuth) -> anyhow::Result<()>;

    /// Announce broker metadata.
    async fn register(&self, registration: &BrokerRegistration) -> anyhow::Result<()>;

    /// Push a sub-order status report.
    async fn send_sub_order_status(&self, report: &SubOrderReport) -> anyhow::Result<()>;

    /// Push the serialized balance map.
    async fn send_balances(&self, payload: &str) -> anyhow::Result<()>;

    /// The last balance payload successfully sent, used to suppress
    /// duplicate sends.
    async fn last_balances_json(&self) -> Option<String>;
}
