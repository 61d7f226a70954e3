use chrono::NaiveDate;
use lk_ledger::{ItemLedger, Micros, NewLot, Qty};
use lk_reconcile::{reconcile, CountSubmission, ReconcileAction, ReconcileThresholds};
use proptest::prelude::*;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
}

fn build(lots: &[(u32, i64)]) -> Option<ItemLedger> {
    if lots.is_empty() {
        return None;
    }
    let mut l = ItemLedger::new("X", "x", "ea");
    for (i, (day, milli)) in lots.iter().enumerate() {
        l.receive(NewLot::new(
            d(*day),
            format!("INV-{i}"),
            Qty::from_milli(*milli),
            Micros::dollars(3),
        ))
        .unwrap();
    }
    Some(l)
}

proptest! {
    #[test]
    fn count_lands_exactly_and_is_idempotent(
        lots in proptest::collection::vec((1u32..20, 1i64..20_000), 0..8),
        counted in -5_000i64..150_000,
    ) {
        let mut slot = build(&lots);
        let sub = CountSubmission {
            counted_qty: Qty::from_milli(counted),
            count_date: d(25),
            prior_order_date_hint: None,
        };
        let t = ReconcileThresholds::default();

        let first = reconcile("X", &mut slot, &sub, &t);
        let expected = Qty::from_milli(counted.max(0));
        prop_assert_eq!(first.system_qty_after, expected);
        if let Some(l) = slot.as_ref() {
            prop_assert!(l.verify_integrity().is_ok());
        }

        let snapshot = slot.clone();
        let second = reconcile("X", &mut slot, &sub, &t);
        prop_assert_eq!(second.action, ReconcileAction::NoChange);
        prop_assert_eq!(slot, snapshot);
    }
}
