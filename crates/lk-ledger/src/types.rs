use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fixedpoint::{Micros, Qty};

/// `source_ref` stamped on lots created by a physical count overage.
pub const INVENTORY_ADJUSTMENT_REF: &str = "INVENTORY_ADJUSTMENT";

/// `source_ref` on history entries written by a physical count.
pub const PHYSICAL_COUNT_REF: &str = "PHYSICAL_COUNT";

/// A single inbound batch of one item at a fixed unit price.
///
/// `seq` is assigned by the owning [`ItemLedger`] and is the canonical
/// secondary sort key after `received_date`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub seq: u64,
    pub received_date: NaiveDate,
    pub source_ref: String,
    pub original_qty: Qty,
    pub remaining_qty: Qty,
    pub unit_price: Micros,
}

impl Lot {
    pub fn is_exhausted(&self) -> bool {
        !self.remaining_qty.is_positive()
    }

    pub fn is_adjustment(&self) -> bool {
        self.source_ref == INVENTORY_ADJUSTMENT_REF
    }

    /// Value of what is still on hand.
    pub fn remaining_value(&self) -> Micros {
        self.unit_price.extended(self.remaining_qty)
    }
}

/// A receipt before it has been placed in a ledger (no `seq` yet).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLot {
    pub received_date: NaiveDate,
    pub source_ref: String,
    pub quantity: Qty,
    pub unit_price: Micros,
}

impl NewLot {
    pub fn new(
        received_date: NaiveDate,
        source_ref: impl Into<String>,
        quantity: Qty,
        unit_price: Micros,
    ) -> Self {
        Self {
            received_date,
            source_ref: source_ref.into(),
            quantity,
            unit_price,
        }
    }
}

/// Per-item FIFO queue of lots.
///
/// Invariants (checked by [`ItemLedger::verify_integrity`]):
/// - `total_quantity == Σ lot.remaining_qty`
/// - every lot has `0 < remaining_qty <= original_qty`
/// - lots are sorted by `(received_date, seq)` ascending
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLedger {
    pub item_code: String,
    pub description: String,
    pub unit: String,
    /// Head = oldest. Drained lots are removed.
    pub lots: Vec<Lot>,
    pub total_quantity: Qty,
    /// Price of the most recent real receipt (adjustment lots excluded).
    pub last_unit_price: Option<Micros>,
    pub last_order_date: Option<NaiveDate>,
    /// Next `seq` to hand out; never reused.
    pub next_seq: u64,
}

/// One slice of a lot taken by a FIFO withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedPortion {
    pub lot_date: NaiveDate,
    pub source_ref: String,
    pub unit_price: Micros,
    pub quantity_used: Qty,
    pub fully_used: bool,
}

/// Result of a FIFO withdrawal.
///
/// `consumed + shortfall == requested` for any non-negative request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeOutcome {
    pub portions: Vec<ConsumedPortion>,
    pub consumed: Qty,
    pub shortfall: Qty,
}

impl ConsumeOutcome {
    /// Nothing on hand: the whole request is a shortfall.
    pub fn unfilled(requested: Qty) -> Self {
        Self {
            portions: Vec::new(),
            consumed: Qty::ZERO,
            shortfall: requested.max(Qty::ZERO),
        }
    }

    /// Cost of goods removed, summed over portions.
    pub fn cost(&self) -> Micros {
        let total: i128 = self
            .portions
            .iter()
            .map(|p| p.unit_price.extended_i128(p.quantity_used))
            .sum();
        Micros::from_i128_clamped(total)
    }
}

/// Why a withdrawal happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeReason {
    /// Negative-quantity order line (credit memo / return).
    Correction,
    /// Physical count came in below the ledger.
    InventoryAdjustment,
    /// Ordinary usage posted by a caller.
    Usage,
}

impl ConsumeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumeReason::Correction => "correction",
            ConsumeReason::InventoryAdjustment => "inventory_adjustment",
            ConsumeReason::Usage => "usage",
        }
    }
}

// ---------------------------------------------------------------------------
// Price history (append-only audit log)
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Order,
    Removal,
    Adjustment,
    Count,
}

/// Before/after state captured when a physical count is applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    pub system_qty_before: Qty,
    pub counted_qty: Qty,
    pub diff: Qty,
    pub system_qty_after: Qty,
    pub lots_before: usize,
    pub lots_after: usize,
    pub warnings: Vec<String>,
}

/// One line of an item's price history. Never mutated once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub date: NaiveDate,
    pub source_ref: String,
    pub unit_price: Micros,
    pub quantity: Qty,
    pub kind: HistoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub portions: Vec<ConsumedPortion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<CountRecord>,
}

impl PriceHistoryEntry {
    /// Receipt of a real order line.
    pub fn order(lot: &Lot) -> Self {
        Self::receipt(lot, HistoryKind::Order)
    }

    /// Synthetic receipt created by a count overage.
    pub fn adjustment(lot: &Lot) -> Self {
        Self::receipt(lot, HistoryKind::Adjustment)
    }

    fn receipt(lot: &Lot, kind: HistoryKind) -> Self {
        Self {
            date: lot.received_date,
            source_ref: lot.source_ref.clone(),
            unit_price: lot.unit_price,
            quantity: lot.original_qty,
            kind,
            reason: None,
            portions: Vec::new(),
            count: None,
        }
    }

    /// Summary of a FIFO withdrawal. `unit_price` is the quantity-weighted
    /// cost of the removed portions (zero when nothing was on hand).
    pub fn removal(
        date: NaiveDate,
        source_ref: impl Into<String>,
        reason: ConsumeReason,
        outcome: &ConsumeOutcome,
    ) -> Self {
        let unit_price = if outcome.consumed.is_positive() {
            let cost = outcome.cost().raw() as i128;
            let per_unit =
                cost * crate::fixedpoint::QTY_SCALE as i128 / outcome.consumed.milli() as i128;
            Micros::from_i128_clamped(per_unit)
        } else {
            Micros::ZERO
        };
        Self {
            date,
            source_ref: source_ref.into(),
            unit_price,
            quantity: outcome.consumed,
            kind: HistoryKind::Removal,
            reason: Some(reason.as_str().to_string()),
            portions: outcome.portions.clone(),
            count: None,
        }
    }

    /// A physical count, with the full before/after state.
    pub fn count(date: NaiveDate, unit_price: Micros, record: CountRecord) -> Self {
        Self {
            date,
            source_ref: PHYSICAL_COUNT_REF.to_string(),
            unit_price,
            quantity: record.counted_qty,
            kind: HistoryKind::Count,
            reason: None,
            portions: Vec::new(),
            count: Some(record),
        }
    }
}
