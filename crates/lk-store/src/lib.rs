//! lk-store
//!
//! The Lot Store: owns every item ledger and its append-only price history.
//! - Boundary validation of inbound orders, counts and reference prices
//! - Per-item locking; readers get snapshots
//! - Atomic, checksummed JSON artifacts; corrupt files are quarantined on load
//! - A failed persist degrades the store without losing in-memory state

pub mod ingest;
pub mod persist;
mod store;

pub use ingest::{
    validate_count, validate_order_lines, validate_reference_prices, validate_source_ref,
    CountInput, IngestError, OrderLine, ReferencePriceInput, ValidatedLine, MAX_LINE_UNITS,
};
pub use persist::{ArtifactLoad, Envelope, FORMAT_VERSION, HISTORY_FILE, LEDGERS_FILE};
pub use store::{
    ArtifactStatus, LineOutcome, LoadReport, LotStore, PersistReport, StoreOptions, StoreStatus,
};
