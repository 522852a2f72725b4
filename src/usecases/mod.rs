//! Use cases - the broker's lifecycle engine, reconciliation loops,
//! liability planning, and supervisor wiring.

pub mod engine;
pub mod liability;
pub mod reconciler;
pub mod supervisor;
