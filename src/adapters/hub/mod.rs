//! Aggregator hub transport.

pub mod ws;

pub use ws::HubWsTransport;
