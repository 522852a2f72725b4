//! Core broker domain types.
//!
//! Defines the business entities the lifecycle engine and the reconciler
//! operate on: sub-orders, trades, withdrawals, on-chain transactions,
//! liabilities, and the signed blockchain order. These types are the
//! inner ring of the hexagonal architecture.

pub mod order;
pub mod settlement;
pub mod token;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
