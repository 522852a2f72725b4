//! Adapters - concrete implementations of the port traits.
//!
//! Persistence (journaled file store), blockchain gateway + signer,
//! venue REST adapters, the hub WebSocket transport, and the operator
//! REST surface.

pub mod chain;
pub mod exchange;
pub mod hub;
pub mod persistence;
pub mod rest;
