//! Inbound record types and boundary validation.
//!
//! Callers hand over plain decimals. Everything is checked and converted to
//! fixed point here; the engines never see a malformed record. A batch is
//! validated in full before any of it is applied.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lk_ledger::{Micros, Qty};
use lk_pricecheck::ReferencePrice;
use lk_reconcile::CountSubmission;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Record rejected at the ingestion boundary. Nothing was applied.
///
/// `index` is the 0-based position of the offending record in its batch.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    EmptySourceRef,
    EmptyItemCode { index: usize },
    ZeroQuantity { index: usize },
    /// NaN, infinite, or beyond [`MAX_LINE_UNITS`].
    InvalidQuantity { index: usize, raw: f64 },
    InvalidPrice { index: usize, raw: f64 },
    NegativePrice { index: usize, raw: f64 },
    /// `INVENTORY_ADJUSTMENT` is reserved for count overages.
    ReservedSourceRef,
    /// Passed boundary checks but the ledger refused it.
    Ledger {
        index: usize,
        error: lk_ledger::LedgerError,
    },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySourceRef => write!(f, "source_ref must not be empty"),
            Self::EmptyItemCode { index } => write!(f, "record {index}: item_code must not be empty"),
            Self::ZeroQuantity { index } => write!(f, "record {index}: quantity must not be zero"),
            Self::InvalidQuantity { index, raw } => {
                write!(f, "record {index}: quantity {raw} is not a representable number")
            }
            Self::InvalidPrice { index, raw } => {
                write!(f, "record {index}: unit_price {raw} is not a representable number")
            }
            Self::NegativePrice { index, raw } => {
                write!(f, "record {index}: unit_price must be >= 0, got {raw}")
            }
            Self::ReservedSourceRef => write!(
                f,
                "source_ref {} is reserved",
                lk_ledger::INVENTORY_ADJUSTMENT_REF
            ),
            Self::Ledger { index, error } => write!(f, "record {index}: {error}"),
        }
    }
}

impl std::error::Error for IngestError {}

// ---------------------------------------------------------------------------
// Order lines
// ---------------------------------------------------------------------------

/// One line of a purchase document. Negative `quantity` is a correction
/// (credit memo / return) and withdraws stock FIFO instead of adding a lot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    pub quantity: f64,
    pub unit_price: f64,
}

/// An order line after boundary checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedLine {
    pub item_code: String,
    pub description: String,
    pub unit: String,
    /// Signed; never zero.
    pub quantity: Qty,
    pub unit_price: Micros,
}

fn check_item_code(index: usize, code: &str) -> Result<String, IngestError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(IngestError::EmptyItemCode { index });
    }
    Ok(code.to_string())
}

/// Largest quantity accepted on one line or count, in units. Leaves the
/// ledger total room for millions of maximal receipts.
pub const MAX_LINE_UNITS: f64 = 1e9;

fn check_qty(index: usize, raw: f64) -> Result<Qty, IngestError> {
    if raw.abs() > MAX_LINE_UNITS {
        return Err(IngestError::InvalidQuantity { index, raw });
    }
    Qty::from_units(raw).ok_or(IngestError::InvalidQuantity { index, raw })
}

fn check_price(index: usize, raw: f64) -> Result<Micros, IngestError> {
    Micros::from_dollars(raw).ok_or(IngestError::InvalidPrice { index, raw })
}

pub fn validate_source_ref(source_ref: &str) -> Result<String, IngestError> {
    let s = source_ref.trim();
    if s.is_empty() {
        return Err(IngestError::EmptySourceRef);
    }
    if s == lk_ledger::INVENTORY_ADJUSTMENT_REF {
        return Err(IngestError::ReservedSourceRef);
    }
    Ok(s.to_string())
}

/// Validate a whole batch. First failure wins; nothing partial is returned.
pub fn validate_order_lines(lines: &[OrderLine]) -> Result<Vec<ValidatedLine>, IngestError> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let item_code = check_item_code(index, &line.item_code)?;
            let quantity = check_qty(index, line.quantity)?;
            if quantity == Qty::ZERO {
                return Err(IngestError::ZeroQuantity { index });
            }
            let unit_price = check_price(index, line.unit_price)?;
            if unit_price.is_negative() {
                return Err(IngestError::NegativePrice {
                    index,
                    raw: line.unit_price,
                });
            }
            Ok(ValidatedLine {
                item_code,
                description: line.description.trim().to_string(),
                unit: line.unit.trim().to_string(),
                quantity,
                unit_price,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountInput {
    pub item_code: String,
    pub counted_qty: f64,
    pub count_date: NaiveDate,
    #[serde(default)]
    pub prior_order_date_hint: Option<NaiveDate>,
}

/// Negative counts pass through; the reconciliation engine clamps them.
pub fn validate_count(input: &CountInput) -> Result<(String, CountSubmission), IngestError> {
    let item_code = check_item_code(0, &input.item_code)?;
    let counted_qty = check_qty(0, input.counted_qty)?;
    Ok((
        item_code,
        CountSubmission {
            counted_qty,
            count_date: input.count_date,
            prior_order_date_hint: input.prior_order_date_hint,
        },
    ))
}

// ---------------------------------------------------------------------------
// Reference prices
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferencePriceInput {
    pub item_code: String,
    pub source_ref: String,
    pub date: NaiveDate,
    pub unit_price: f64,
    #[serde(default)]
    pub quantity: f64,
}

/// Non-positive prices are kept: the validator reports them as unvalidated.
pub fn validate_reference_prices(
    records: &[ReferencePriceInput],
) -> Result<Vec<ReferencePrice>, IngestError> {
    records
        .iter()
        .enumerate()
        .map(|(index, r)| {
            let item_code = check_item_code(index, &r.item_code)?;
            let source_ref = r.source_ref.trim();
            if source_ref.is_empty() {
                return Err(IngestError::EmptySourceRef);
            }
            Ok(ReferencePrice {
                item_code,
                source_ref: source_ref.to_string(),
                date: r.date,
                unit_price: check_price(index, r.unit_price)?,
                quantity: check_qty(index, r.quantity)?,
            })
        })
        .collect()
}
