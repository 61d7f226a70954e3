//! `ItemLedger` façade: the invariant-checking boundary over [`crate::fifo`].
//!
//! - Rejects malformed receipts before anything is mutated.
//! - Keeps `last_unit_price` / `last_order_date` in step with real receipts.
//!   Adjustment lots created by physical counts do not move them.
//! - [`ItemLedger::verify_integrity`] re-derives the totals and ordering from
//!   the lot queue; used by tests, startup load and the CLI `verify` command.

use chrono::NaiveDate;

use crate::fifo::{consume, place_lot};
use crate::fixedpoint::{Micros, Qty};
use crate::ordering::{is_fifo_ordered, sort_lots_canonical};
use crate::types::{ConsumeOutcome, ItemLedger, Lot, NewLot, INVENTORY_ADJUSTMENT_REF};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Receipt rejected at the ledger boundary. The ledger is not mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    EmptyItemCode,
    EmptySourceRef,
    /// Receipts must carry a strictly positive quantity.
    NonPositiveQty { qty: Qty },
    NegativePrice { price: Micros },
    /// A real receipt may not impersonate a count adjustment.
    ReservedSourceRef,
    /// The receipt would push `total_quantity` past the representable range.
    QuantityOverflow { total: Qty, qty: Qty },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyItemCode => write!(f, "ledger invariant: item_code must not be empty"),
            Self::EmptySourceRef => write!(f, "ledger invariant: source_ref must not be empty"),
            Self::NonPositiveQty { qty } => {
                write!(f, "ledger invariant: quantity must be > 0, got {qty}")
            }
            Self::NegativePrice { price } => {
                write!(f, "ledger invariant: unit_price must be >= 0, got {price}")
            }
            Self::ReservedSourceRef => write!(
                f,
                "ledger invariant: source_ref {INVENTORY_ADJUSTMENT_REF} is reserved"
            ),
            Self::QuantityOverflow { total, qty } => write!(
                f,
                "ledger invariant: receiving {qty} on top of {total} overflows the quantity range"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

/// First inconsistency found by [`ItemLedger::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    TotalMismatch { recorded: Qty, computed: Qty },
    /// Σ remaining does not fit in a `Qty`.
    TotalOverflow,
    LotOutOfBounds { seq: u64 },
    NotFifoOrdered,
    SeqNotBelowNext { seq: u64, next_seq: u64 },
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalMismatch { recorded, computed } => write!(
                f,
                "total_quantity {recorded} != sum of remaining {computed}"
            ),
            Self::TotalOverflow => write!(f, "sum of remaining overflows the quantity range"),
            Self::LotOutOfBounds { seq } => {
                write!(f, "lot seq={seq} has remaining outside (0, original]")
            }
            Self::NotFifoOrdered => write!(f, "lots are not in (received_date, seq) order"),
            Self::SeqNotBelowNext { seq, next_seq } => {
                write!(f, "lot seq={seq} is not below next_seq={next_seq}")
            }
        }
    }
}

impl std::error::Error for IntegrityViolation {}

// ---------------------------------------------------------------------------
// ItemLedger
// ---------------------------------------------------------------------------

impl ItemLedger {
    pub fn new(
        item_code: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            item_code: item_code.into(),
            description: description.into(),
            unit: unit.into(),
            lots: Vec::new(),
            total_quantity: Qty::ZERO,
            last_unit_price: None,
            last_order_date: None,
            next_seq: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Write surface
    // -----------------------------------------------------------------------

    /// Record a real receipt.
    ///
    /// # Errors
    /// Returns [`LedgerError`] if the receipt is malformed. The ledger is
    /// **not** mutated on error.
    pub fn receive(&mut self, new: NewLot) -> Result<Lot, LedgerError> {
        if self.item_code.trim().is_empty() {
            return Err(LedgerError::EmptyItemCode);
        }
        if new.source_ref.trim().is_empty() {
            return Err(LedgerError::EmptySourceRef);
        }
        if new.source_ref == INVENTORY_ADJUSTMENT_REF {
            return Err(LedgerError::ReservedSourceRef);
        }
        if !new.quantity.is_positive() {
            return Err(LedgerError::NonPositiveQty { qty: new.quantity });
        }
        if new.unit_price.is_negative() {
            return Err(LedgerError::NegativePrice {
                price: new.unit_price,
            });
        }
        if self.total_quantity.checked_add(new.quantity).is_none() {
            return Err(LedgerError::QuantityOverflow {
                total: self.total_quantity,
                qty: new.quantity,
            });
        }

        let date = new.received_date;
        let lot = place_lot(self, new);

        // "last" means latest-dated: a back-dated receipt does not
        // overwrite a newer price.
        let is_latest = self.last_order_date.map_or(true, |last| date >= last);
        if is_latest {
            self.last_unit_price = Some(lot.unit_price);
            self.last_order_date = Some(date);
        }
        Ok(lot)
    }

    /// Record a synthetic count-overage lot priced at the last known price
    /// (zero if the item has never been priced).
    ///
    /// Non-positive quantities, and quantities that would overflow the total,
    /// are ignored and return `None`.
    pub fn receive_adjustment(&mut self, count_date: NaiveDate, quantity: Qty) -> Option<Lot> {
        if !quantity.is_positive() {
            return None;
        }
        self.total_quantity.checked_add(quantity)?;
        let price = self.last_unit_price.unwrap_or(Micros::ZERO).max(Micros::ZERO);
        Some(place_lot(
            self,
            NewLot::new(count_date, INVENTORY_ADJUSTMENT_REF, quantity, price),
        ))
    }

    /// FIFO withdrawal. See [`crate::fifo::consume`].
    pub fn consume(&mut self, quantity: Qty) -> ConsumeOutcome {
        consume(Some(self), quantity)
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    pub fn oldest_lot(&self) -> Option<&Lot> {
        self.lots.first()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Re-derive every structural invariant from the lot queue.
    ///
    /// O(n); intended for tests, load-time checks and audit flows.
    pub fn verify_integrity(&self) -> Result<(), IntegrityViolation> {
        let computed: i128 = self
            .lots
            .iter()
            .map(|l| l.remaining_qty.milli() as i128)
            .sum();
        let computed = i64::try_from(computed)
            .map(Qty::from_milli)
            .map_err(|_| IntegrityViolation::TotalOverflow)?;
        if computed != self.total_quantity {
            return Err(IntegrityViolation::TotalMismatch {
                recorded: self.total_quantity,
                computed,
            });
        }
        for lot in &self.lots {
            if !lot.remaining_qty.is_positive() || lot.remaining_qty > lot.original_qty {
                return Err(IntegrityViolation::LotOutOfBounds { seq: lot.seq });
            }
            if lot.seq >= self.next_seq {
                return Err(IntegrityViolation::SeqNotBelowNext {
                    seq: lot.seq,
                    next_seq: self.next_seq,
                });
            }
        }
        if !is_fifo_ordered(&self.lots) {
            return Err(IntegrityViolation::NotFifoOrdered);
        }
        Ok(())
    }

    /// Rebuild derived state from the lot queue after a failed
    /// [`verify_integrity`](Self::verify_integrity).
    ///
    /// Drops drained lots, caps `remaining_qty` at `original_qty`, re-sorts,
    /// recomputes `total_quantity` and moves `next_seq` past every lot.
    /// Lots that would push the total past the quantity range are dropped
    /// from the newest end.
    pub fn repair(&mut self) {
        self.lots.retain(|l| l.remaining_qty.is_positive());
        for lot in &mut self.lots {
            if lot.remaining_qty > lot.original_qty {
                lot.remaining_qty = lot.original_qty;
            }
        }
        sort_lots_canonical(&mut self.lots);

        let mut total = Qty::ZERO;
        let mut keep = self.lots.len();
        for (i, lot) in self.lots.iter().enumerate() {
            match total.checked_add(lot.remaining_qty) {
                Some(t) => total = t,
                None => {
                    keep = i;
                    break;
                }
            }
        }
        self.lots.truncate(keep);
        self.total_quantity = total;
        if let Some(max_seq) = self.lots.iter().map(|l| l.seq).max() {
            self.next_seq = self.next_seq.max(max_seq + 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
