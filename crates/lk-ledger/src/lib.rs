//! lk-ledger
//!
//! Item ledgers and the FIFO cost-layer model.
//! - Lots kept in `(received_date, seq)` order, drained from the head
//! - Fixed-point money (1e-6) and quantity (1e-3)
//! - Weighted-average valuation and the system report
//! - Pure deterministic logic (no IO, no clock, no locking)

mod fifo;
mod ordering;
mod types;

pub mod fixedpoint;
pub mod ledger;
pub mod valuation;

pub use fifo::consume;
pub use fixedpoint::{Micros, Qty, MICROS_SCALE, QTY_SCALE};
pub use ledger::{IntegrityViolation, LedgerError};
pub use ordering::{insertion_index, is_fifo_ordered, sort_lots_canonical};
pub use types::{
    ConsumeOutcome, ConsumeReason, ConsumedPortion, CountRecord, HistoryKind, ItemLedger, Lot,
    NewLot, PriceHistoryEntry, INVENTORY_ADJUSTMENT_REF, PHYSICAL_COUNT_REF,
};
pub use valuation::{system_report, valuation, ItemLotCount, ItemValuation, SystemReport};
