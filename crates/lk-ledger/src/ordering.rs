//! Canonical lot ordering.
//!
//! Lots are kept ascending by `(received_date, seq)`. `seq` is handed out by
//! the owning ledger at insertion time, so two lots received on the same day
//! are consumed in the order they were recorded.
//!
//! In-order receipts always land at the tail. A back-dated receipt is placed
//! after every lot with `received_date <= date`, i.e. after its same-day
//! siblings and before anything newer.

use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::types::Lot;

/// Canonical comparison: `(received_date, seq)` ascending.
pub fn cmp_lots(a: &Lot, b: &Lot) -> Ordering {
    a.received_date
        .cmp(&b.received_date)
        .then_with(|| a.seq.cmp(&b.seq))
}

/// Sort `lots` into canonical FIFO order in place.
///
/// Used when rebuilding a ledger from persisted state; live mutations keep the
/// queue sorted incrementally via [`insertion_index`].
pub fn sort_lots_canonical(lots: &mut [Lot]) {
    lots.sort_by(cmp_lots);
}

/// Index at which a lot received on `date` must be inserted.
///
/// `lots` must already be in canonical order.
pub fn insertion_index(lots: &[Lot], date: NaiveDate) -> usize {
    lots.partition_point(|l| l.received_date <= date)
}

/// `true` if `lots` is in canonical order.
pub fn is_fifo_ordered(lots: &[Lot]) -> bool {
    lots.windows(2)
        .all(|w| cmp_lots(&w[0], &w[1]) == Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixedpoint::{Micros, Qty};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn lot(seq: u64, day: u32) -> Lot {
        Lot {
            seq,
            received_date: d(day),
            source_ref: format!("INV-{seq}"),
            original_qty: Qty::units(1),
            remaining_qty: Qty::units(1),
            unit_price: Micros::dollars(1),
        }
    }

    #[test]
    fn in_order_receipt_goes_to_tail() {
        let lots = vec![lot(0, 1), lot(1, 2), lot(2, 2)];
        assert_eq!(insertion_index(&lots, d(2)), 3);
        assert_eq!(insertion_index(&lots, d(9)), 3);
    }

    #[test]
    fn back_dated_receipt_goes_after_same_day_siblings() {
        let lots = vec![lot(0, 1), lot(1, 5), lot(2, 5), lot(3, 9)];
        assert_eq!(insertion_index(&lots, d(5)), 3);
        assert_eq!(insertion_index(&lots, d(4)), 1);
        assert_eq!(insertion_index(&lots, d(1)), 1);
    }

    #[test]
    fn sort_breaks_date_ties_by_seq() {
        let mut lots = vec![lot(3, 2), lot(1, 2), lot(0, 7), lot(2, 1)];
        sort_lots_canonical(&mut lots);
        let seqs: Vec<u64> = lots.iter().map(|l| l.seq).collect();
        assert_eq!(seqs, vec![2, 1, 3, 0]);
        assert!(is_fifo_ordered(&lots));
    }

    #[test]
    fn detects_out_of_order_queue() {
        let lots = vec![lot(0, 3), lot(1, 2)];
        assert!(!is_fifo_ordered(&lots));
        // duplicate key is not strictly ordered either
        let lots = vec![lot(0, 3), lot(0, 3)];
        assert!(!is_fifo_ordered(&lots));
    }
}
