//! Broker error types.
//!
//! Typed failure conditions the engine and the liability planner branch on.
//! Handlers wrap these in `anyhow::Error` at async boundaries and recover
//! concrete variants through `downcast_ref` where the reaction differs.

use thiserror::Error;

/// Failures with a defined reaction in the broker state machine.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The hub referenced a sub-order this broker has never persisted.
    #[error("sub-order {0} not found")]
    NotFound(u64),

    /// The venue rejected an order placement. The sub-order is terminal
    /// REJECTED and is never retried.
    #[error("venue rejected sub-order: {0}")]
    Submit(String),

    /// The network gas price exceeds the broadcast cap; the write is
    /// aborted before signing and the calling loop retries on its next tick.
    #[error("gas price {0} gwei exceeds the {1} gwei cap")]
    GasPriceTooHigh(u64, u64),

    /// A symbol that is not present in the token registry.
    #[error("asset {0} is not in the token registry")]
    UnknownAsset(String),

    /// The blockchain gateway returned no usable nonce for the broker wallet.
    #[error("gateway returned no nonce for {0}")]
    NonceUnavailable(String),

    /// The hub dispatched a sub-order for a venue this broker does not run.
    #[error("exchange {0} is not configured")]
    UnknownVenue(String),

    /// A decimal value does not fit the integer base-unit encoding.
    #[error("amount {0} is not representable in base units")]
    AmountOverflow(rust_decimal::Decimal),
}
