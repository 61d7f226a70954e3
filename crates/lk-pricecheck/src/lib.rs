//! lk-pricecheck
//!
//! Cross-validation of recorded lot prices against external purchase records.
//! - Primary pairing on `(item_code, source_ref)`, fallback on nearest date
//! - Banded severity; under 1% counts as a match
//! - Reference CSV import and discrepancy CSV export
//!
//! Pure logic over ledger snapshots apart from the CSV helpers.

mod csv_io;
mod engine;
mod types;

pub use csv_io::{
    parse_reference_csv, parse_reference_csv_file, write_discrepancies_csv, ReferenceCsvError,
};
pub use engine::{percent_variance, validate_prices};
pub use types::*;
