//! lk-reconcile
//!
//! Physical count reconciliation.
//! - Overage appends an `INVENTORY_ADJUSTMENT` lot at the last known price
//! - Shortage drains lots FIFO with reason `inventory_adjustment`
//! - Advisory warnings with configurable thresholds; never blocks
//!
//! Deterministic, pure logic. No IO. No clock: the count date is supplied.

mod engine;
mod types;

pub use engine::reconcile;
pub use types::*;
