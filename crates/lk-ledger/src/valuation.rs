use serde::{Deserialize, Serialize};

use crate::fixedpoint::{Micros, Qty, QTY_SCALE};
use crate::types::ItemLedger;

/// Per-item valuation (micros / milli-units).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValuation {
    pub item_code: String,
    pub description: String,
    pub unit: String,
    pub remaining_qty: Qty,
    pub lot_count: usize,
    /// Quantity-weighted mean over remaining lots; `last_unit_price` (or zero)
    /// when nothing remains.
    pub weighted_avg_cost: Micros,
    pub total_value: Micros,
}

/// Row of the "most complex items" table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLotCount {
    pub item_code: String,
    pub description: String,
    pub lot_count: usize,
    pub remaining_qty: Qty,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemReport {
    pub distinct_items: usize,
    pub total_value: Micros,
    /// Items with more than one remaining lot.
    pub complex_fifo_items: usize,
    /// Top-N by lot count descending, ties by item code ascending.
    pub top_by_lot_count: Vec<ItemLotCount>,
}

/// total = Σ remaining * unit_price
/// avg   = total / remaining
pub fn valuation(ledger: &ItemLedger) -> ItemValuation {
    let mut total: i128 = 0;
    let mut qty: i128 = 0;
    for lot in &ledger.lots {
        total += lot.unit_price.extended_i128(lot.remaining_qty);
        qty += lot.remaining_qty.milli() as i128;
    }

    let weighted_avg_cost = if qty > 0 {
        // round half away from zero, like Micros::extended_i128
        let num = total * QTY_SCALE as i128;
        Micros::from_i128_clamped((num + qty / 2) / qty)
    } else {
        ledger.last_unit_price.unwrap_or(Micros::ZERO)
    };

    ItemValuation {
        item_code: ledger.item_code.clone(),
        description: ledger.description.clone(),
        unit: ledger.unit.clone(),
        remaining_qty: ledger.total_quantity,
        lot_count: ledger.lots.len(),
        weighted_avg_cost,
        total_value: Micros::from_i128_clamped(total),
    }
}

/// Aggregate report across ledgers.
///
/// Deterministic for any iteration order of `ledgers`.
pub fn system_report<'a, I>(ledgers: I, top_n: usize) -> SystemReport
where
    I: IntoIterator<Item = &'a ItemLedger>,
{
    let mut distinct_items = 0usize;
    let mut total: i128 = 0;
    let mut complex_fifo_items = 0usize;
    let mut rows: Vec<ItemLotCount> = Vec::new();

    for ledger in ledgers {
        distinct_items += 1;
        total += ledger
            .lots
            .iter()
            .map(|l| l.unit_price.extended_i128(l.remaining_qty))
            .sum::<i128>();
        if ledger.lots.len() > 1 {
            complex_fifo_items += 1;
        }
        rows.push(ItemLotCount {
            item_code: ledger.item_code.clone(),
            description: ledger.description.clone(),
            lot_count: ledger.lots.len(),
            remaining_qty: ledger.total_quantity,
        });
    }

    rows.sort_by(|a, b| {
        b.lot_count
            .cmp(&a.lot_count)
            .then_with(|| a.item_code.cmp(&b.item_code))
    });
    rows.truncate(top_n);

    SystemReport {
        distinct_items,
        total_value: Micros::from_i128_clamped(total),
        complex_fifo_items,
        top_by_lot_count: rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewLot;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn item(code: &str, lots: &[(i64, i64)]) -> ItemLedger {
        let mut l = ItemLedger::new(code, code.to_lowercase(), "ea");
        for (i, (qty, px)) in lots.iter().enumerate() {
            l.receive(NewLot::new(
                d(i as u32 + 1),
                format!("{code}-{i}"),
                Qty::units(*qty),
                Micros::dollars(*px),
            ))
            .unwrap();
        }
        l
    }

    #[test]
    fn weighted_average_over_remaining_lots() {
        // 2 @ 10 + 6 @ 2 = 32 over 8 units = 4.00
        let v = valuation(&item("A", &[(2, 10), (6, 2)]));
        assert_eq!(v.total_value, Micros::dollars(32));
        assert_eq!(v.weighted_avg_cost, Micros::dollars(4));
        assert_eq!(v.remaining_qty, Qty::units(8));
        assert_eq!(v.lot_count, 2);
    }

    #[test]
    fn empty_item_falls_back_to_last_price() {
        let mut l = item("A", &[(3, 7)]);
        l.consume(Qty::units(3));
        let v = valuation(&l);
        assert_eq!(v.total_value, Micros::ZERO);
        assert_eq!(v.weighted_avg_cost, Micros::dollars(7));

        let never = ItemLedger::new("B", "b", "ea");
        assert_eq!(valuation(&never).weighted_avg_cost, Micros::ZERO);
    }

    #[test]
    fn report_counts_and_top_n_tie_break() {
        let ledgers = vec![
            item("ZED", &[(1, 1), (1, 1)]),
            item("ALPHA", &[(1, 1), (1, 1)]),
            item("MID", &[(1, 5)]),
            item("MANY", &[(1, 1), (1, 1), (1, 1)]),
        ];
        let r = system_report(&ledgers, 3);
        assert_eq!(r.distinct_items, 4);
        assert_eq!(r.complex_fifo_items, 3);
        assert_eq!(r.total_value, Micros::dollars(12));
        let codes: Vec<&str> = r
            .top_by_lot_count
            .iter()
            .map(|row| row.item_code.as_str())
            .collect();
        assert_eq!(codes, vec!["MANY", "ALPHA", "ZED"]);
    }

    #[test]
    fn report_on_nothing() {
        let r = system_report(std::iter::empty(), 5);
        assert_eq!(r.distinct_items, 0);
        assert_eq!(r.total_value, Micros::ZERO);
        assert!(r.top_by_lot_count.is_empty());
    }
}
