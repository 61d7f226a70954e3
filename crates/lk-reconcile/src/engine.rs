use lk_ledger::{ItemLedger, Qty};

use crate::{CountSubmission, ReconcileAction, ReconcileReport, ReconcileThresholds, ReconcileWarning};

const RECOMMEND_OVERAGE: &str =
    "Count exceeds the ledger: look for deliveries that were never entered";
const RECOMMEND_SHORTAGE: &str =
    "Count is below the ledger: review waste and usage that were not recorded";
const RECOMMEND_MATCH: &str = "Count matches the ledger";

fn recommendation(diff: Qty) -> &'static str {
    if diff.is_positive() {
        RECOMMEND_OVERAGE
    } else if diff.is_negative() {
        RECOMMEND_SHORTAGE
    } else {
        RECOMMEND_MATCH
    }
}

/// Advisory checks against the pre-count state.
fn evaluate_warnings(
    ledger: Option<&ItemLedger>,
    system_qty: Qty,
    counted: Qty,
    diff: Qty,
    submission: &CountSubmission,
    thresholds: &ReconcileThresholds,
) -> Vec<ReconcileWarning> {
    let mut warnings = Vec::new();
    let system = system_qty.as_units_f64();

    // With nothing on the books, any movement is a large variance.
    let large = if system_qty.is_positive() {
        diff.abs().as_units_f64() > thresholds.large_variance_ratio * system
    } else {
        diff != Qty::ZERO
    };
    if large {
        warnings.push(ReconcileWarning::LargeVariance { diff, system_qty });
    }

    let last_order_date = ledger.and_then(|l| l.last_order_date);
    if let Some(hint) = submission.prior_order_date_hint {
        if last_order_date.map_or(true, |last| hint > last) {
            warnings.push(ReconcileWarning::UnrecordedOrders {
                hint,
                last_order_date,
            });
        }
    }

    if counted.as_units_f64() > thresholds.far_exceeds_multiplier * system {
        warnings.push(ReconcileWarning::CountFarExceedsSystem {
            counted_qty: counted,
            system_qty,
        });
    }

    if let Some(oldest) = ledger.and_then(|l| l.oldest_lot()) {
        let age_days = (submission.count_date - oldest.received_date).num_days();
        if age_days > thresholds.spoilage_days {
            warnings.push(ReconcileWarning::PossibleSpoilage {
                oldest_lot_date: oldest.received_date,
                age_days,
            });
        }
    }

    warnings.sort();
    warnings
}

/// Apply a physical count to an item's ledger.
///
/// - `diff > 0`: append an `INVENTORY_ADJUSTMENT` lot dated `count_date` at
///   the last known price. A missing ledger is created for it.
/// - `diff < 0`: FIFO-consume `|diff|`.
/// - `diff == 0`: no mutation.
///
/// Warnings are advisory and evaluated against the pre-count state.
/// Never fails; a negative count is clamped to zero.
pub fn reconcile(
    item_code: &str,
    slot: &mut Option<ItemLedger>,
    submission: &CountSubmission,
    thresholds: &ReconcileThresholds,
) -> ReconcileReport {
    let count_clamped = submission.counted_qty.is_negative();
    let counted = submission.counted_qty.max(Qty::ZERO);

    let system_qty_before = slot.as_ref().map_or(Qty::ZERO, |l| l.total_quantity);
    let lots_before = slot.as_ref().map_or(0, |l| l.lot_count());
    let diff = counted - system_qty_before;

    let warnings = evaluate_warnings(
        slot.as_ref(),
        system_qty_before,
        counted,
        diff,
        submission,
        thresholds,
    );

    let mut adjustment_lot = None;
    let mut consumed = None;

    let action = if diff.is_positive() {
        let ledger = slot.get_or_insert_with(|| ItemLedger::new(item_code, "", ""));
        match ledger.receive_adjustment(submission.count_date, diff) {
            Some(lot) => {
                let action = ReconcileAction::AdjustmentLotAdded {
                    quantity: lot.original_qty,
                    unit_price: lot.unit_price,
                };
                adjustment_lot = Some(lot);
                action
            }
            None => ReconcileAction::NoChange,
        }
    } else if diff.is_negative() {
        let outcome = lk_ledger::consume(slot.as_mut(), diff.abs());
        let action = ReconcileAction::ShortageConsumed {
            consumed: outcome.consumed,
            shortfall: outcome.shortfall,
        };
        consumed = Some(outcome);
        action
    } else {
        ReconcileAction::NoChange
    };

    ReconcileReport {
        item_code: item_code.to_string(),
        count_date: submission.count_date,
        system_qty_before,
        counted_qty: counted,
        count_clamped,
        diff,
        system_qty_after: slot.as_ref().map_or(Qty::ZERO, |l| l.total_quantity),
        lots_before,
        lots_after: slot.as_ref().map_or(0, |l| l.lot_count()),
        action,
        warnings,
        recommendation: recommendation(diff).to_string(),
        adjustment_lot,
        consumed,
        ledger: slot.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lk_ledger::{Micros, NewLot};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn count(qty: i64, date: NaiveDate) -> CountSubmission {
        CountSubmission {
            counted_qty: Qty::units(qty),
            count_date: date,
            prior_order_date_hint: None,
        }
    }

    fn stocked(qty: i64, date: NaiveDate) -> Option<ItemLedger> {
        let mut l = ItemLedger::new("RICE-50", "Rice 50lb", "bag");
        l.receive(NewLot::new(date, "INV-9", Qty::units(qty), Micros::dollars(40)))
            .unwrap();
        Some(l)
    }

    #[test]
    fn negative_count_clamps_to_zero_and_drains() {
        let mut slot = stocked(4, d(5, 1));
        let r = reconcile("RICE-50", &mut slot, &count(-3, d(5, 2)), &Default::default());
        assert!(r.count_clamped);
        assert_eq!(r.counted_qty, Qty::ZERO);
        assert_eq!(r.diff, Qty::units(-4));
        assert_eq!(r.system_qty_after, Qty::ZERO);
        assert_eq!(r.recommendation, RECOMMEND_SHORTAGE);
    }

    #[test]
    fn missing_ledger_zero_count_stays_missing() {
        let mut slot = None;
        let r = reconcile("NEW", &mut slot, &count(0, d(5, 2)), &Default::default());
        assert_eq!(r.action, ReconcileAction::NoChange);
        assert!(slot.is_none());
        assert!(r.ledger.is_none());
        assert!(r.is_clean());
    }

    #[test]
    fn missing_ledger_positive_count_creates_unpriced_lot() {
        let mut slot = None;
        let r = reconcile("NEW", &mut slot, &count(6, d(5, 2)), &Default::default());
        assert_eq!(
            r.action,
            ReconcileAction::AdjustmentLotAdded {
                quantity: Qty::units(6),
                unit_price: Micros::ZERO
            }
        );
        let l = slot.unwrap();
        assert_eq!(l.item_code, "NEW");
        assert_eq!(l.total_quantity, Qty::units(6));
        let codes: Vec<&str> = r.warnings.iter().map(|w| w.code()).collect();
        assert_eq!(codes, vec!["large_variance", "count_far_exceeds_system"]);
    }

    #[test]
    fn unrecorded_orders_hint() {
        let mut slot = stocked(10, d(5, 1));
        let mut sub = count(10, d(5, 3));
        sub.prior_order_date_hint = Some(d(5, 2));
        let r = reconcile("RICE-50", &mut slot, &sub, &Default::default());
        assert_eq!(
            r.warnings,
            vec![ReconcileWarning::UnrecordedOrders {
                hint: d(5, 2),
                last_order_date: Some(d(5, 1))
            }]
        );

        // hint on or before the last order is fine
        sub.prior_order_date_hint = Some(d(5, 1));
        let r = reconcile("RICE-50", &mut slot, &sub, &Default::default());
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn spoilage_uses_count_date_and_threshold() {
        let mut slot = stocked(10, d(1, 1));
        let r = reconcile("RICE-50", &mut slot, &count(10, d(1, 31)), &Default::default());
        assert!(r.warnings.is_empty(), "30 days is not older than 30");

        let r = reconcile("RICE-50", &mut slot, &count(10, d(2, 1)), &Default::default());
        assert_eq!(
            r.warnings,
            vec![ReconcileWarning::PossibleSpoilage {
                oldest_lot_date: d(1, 1),
                age_days: 31
            }]
        );

        let tight = ReconcileThresholds {
            spoilage_days: 5,
            ..Default::default()
        };
        let r = reconcile("RICE-50", &mut slot, &count(10, d(1, 7)), &tight);
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn small_shortage_is_quiet() {
        let mut slot = stocked(10, d(3, 1));
        let r = reconcile("RICE-50", &mut slot, &count(8, d(3, 2)), &Default::default());
        assert!(r.warnings.is_empty());
        assert_eq!(
            r.action,
            ReconcileAction::ShortageConsumed {
                consumed: Qty::units(2),
                shortfall: Qty::ZERO
            }
        );
        let rec = r.count_record();
        assert_eq!(rec.system_qty_before, Qty::units(10));
        assert_eq!(rec.system_qty_after, Qty::units(8));
    }
}
