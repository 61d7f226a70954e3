//! FIFO lot mechanics.
//!
//! Raw placement and draining of lots. Inputs are assumed validated; the
//! invariant-checking boundary lives in [`crate::ledger`].

use crate::fixedpoint::Qty;
use crate::ordering::insertion_index;
use crate::types::{ConsumeOutcome, ConsumedPortion, ItemLedger, Lot, NewLot};

/// Place a new lot in date order and bump `total_quantity`.
///
/// Returns a copy of the placed lot (with its assigned `seq`).
pub(crate) fn place_lot(ledger: &mut ItemLedger, new: NewLot) -> Lot {
    debug_assert!(new.quantity.is_positive());
    debug_assert!(!new.unit_price.is_negative());

    let lot = Lot {
        seq: ledger.next_seq,
        received_date: new.received_date,
        source_ref: new.source_ref,
        original_qty: new.quantity,
        remaining_qty: new.quantity,
        unit_price: new.unit_price,
    };
    ledger.next_seq += 1;

    let idx = insertion_index(&ledger.lots, lot.received_date);
    ledger.lots.insert(idx, lot.clone());
    ledger.total_quantity = ledger.total_quantity.saturating_add(lot.original_qty);
    lot
}

/// Withdraw `quantity` from `ledger`, oldest lot first.
///
/// - Missing ledger: nothing consumed, `shortfall == quantity`.
/// - Non-positive `quantity`: nothing consumed, no shortfall.
/// - Drained lots are removed; a partially drained lot ends the walk.
/// - `total_quantity` drops by the consumed amount and never below zero.
pub fn consume(ledger: Option<&mut ItemLedger>, quantity: Qty) -> ConsumeOutcome {
    if !quantity.is_positive() {
        return ConsumeOutcome::default();
    }
    let Some(ledger) = ledger else {
        return ConsumeOutcome::unfilled(quantity);
    };

    let mut needed = quantity;
    let mut portions = Vec::new();

    while needed.is_positive() && !ledger.lots.is_empty() {
        let head = &mut ledger.lots[0];
        let take = head.remaining_qty.min(needed);
        head.remaining_qty -= take;
        needed -= take;

        let fully_used = head.is_exhausted();
        portions.push(ConsumedPortion {
            lot_date: head.received_date,
            source_ref: head.source_ref.clone(),
            unit_price: head.unit_price,
            quantity_used: take,
            fully_used,
        });

        if fully_used {
            // head removal keeps the rest of the queue in order
            ledger.lots.remove(0);
        } else {
            break;
        }
    }

    let consumed = quantity - needed;
    ledger.total_quantity = ledger.total_quantity.saturating_sub_floor(consumed);

    ConsumeOutcome {
        portions,
        consumed,
        shortfall: needed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixedpoint::Micros;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn ledger_with(lots: &[(u32, i64, i64)]) -> ItemLedger {
        let mut l = ItemLedger::new("FLOUR-25", "Flour 25lb", "bag");
        for (i, (day, qty, px)) in lots.iter().enumerate() {
            place_lot(
                &mut l,
                NewLot::new(d(*day), format!("INV-{i}"), Qty::units(*qty), Micros::dollars(*px)),
            );
        }
        l
    }

    #[test]
    fn missing_ledger_is_all_shortfall() {
        let out = consume(None, Qty::units(7));
        assert!(out.portions.is_empty());
        assert_eq!(out.consumed, Qty::ZERO);
        assert_eq!(out.shortfall, Qty::units(7));
    }

    #[test]
    fn non_positive_request_is_a_no_op() {
        let mut l = ledger_with(&[(1, 5, 2)]);
        let before = l.clone();
        assert_eq!(consume(Some(&mut l), Qty::ZERO), ConsumeOutcome::default());
        assert_eq!(consume(Some(&mut l), Qty::units(-3)), ConsumeOutcome::default());
        assert_eq!(l, before);
    }

    #[test]
    fn exact_drain_removes_every_lot() {
        let mut l = ledger_with(&[(1, 2, 1), (2, 3, 1)]);
        let out = consume(Some(&mut l), Qty::units(5));
        assert_eq!(out.consumed, Qty::units(5));
        assert_eq!(out.shortfall, Qty::ZERO);
        assert!(out.portions.iter().all(|p| p.fully_used));
        assert!(l.lots.is_empty());
        assert_eq!(l.total_quantity, Qty::ZERO);
    }

    #[test]
    fn partial_head_stops_walk() {
        let mut l = ledger_with(&[(1, 10, 1), (2, 10, 2)]);
        let out = consume(Some(&mut l), Qty::from_milli(2_500));
        assert_eq!(out.portions.len(), 1);
        assert!(!out.portions[0].fully_used);
        assert_eq!(l.lots.len(), 2);
        assert_eq!(l.lots[0].remaining_qty, Qty::from_milli(7_500));
        assert_eq!(l.lots[1].remaining_qty, Qty::units(10));
    }

    #[test]
    fn back_dated_lot_is_consumed_first() {
        let mut l = ledger_with(&[(5, 4, 3)]);
        place_lot(
            &mut l,
            NewLot::new(d(2), "LATE-POSTED", Qty::units(1), Micros::dollars(9)),
        );
        let out = consume(Some(&mut l), Qty::units(1));
        assert_eq!(out.portions[0].source_ref, "LATE-POSTED");
        assert_eq!(out.cost(), Micros::dollars(9));
    }
}
