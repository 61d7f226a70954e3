use chrono::{NaiveDate, TimeZone, Utc};
use lk_ledger::{ItemLedger, Micros, NewLot, Qty};
use lk_pricecheck::{
    parse_reference_csv, validate_prices, write_discrepancies_csv, MatchKind, Severity,
};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn brisket() -> ItemLedger {
    let mut l = ItemLedger::new("BEEF-BRSK", "Brisket choice", "lb");
    l.receive(NewLot::new(
        d(2),
        "INV-1",
        Qty::units(30),
        Micros::from_dollars(57.38).unwrap(),
    ))
    .unwrap();
    l.receive(NewLot::new(d(9), "INV-2", Qty::units(30), Micros::dollars(60)))
        .unwrap();
    l
}

const REFERENCES: &str = "\
item_code,source_ref,date,unit_price,quantity
BEEF-BRSK,INV-1,2024-03-02,57.38,30
BEEF-BRSK,INV-2,2024-03-09,57.38,30
";

#[test]
fn scenario_exact_match_and_medium_variance() {
    // GIVEN: lots at 57.38 and 60.00, both referenced at 57.38
    let ledger = brisket();
    let refs = parse_reference_csv(REFERENCES.as_bytes()).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

    // WHEN
    let report = validate_prices([&ledger], &refs, now);

    // THEN: first lot matches; second is ~4.57% -> medium
    assert_eq!(report.generated_at, now);
    assert_eq!(report.summary.items_checked, 1);
    assert_eq!(report.summary.lots_checked, 2);
    assert_eq!(report.summary.matches, 1);
    assert_eq!(report.summary.discrepancies, 1);
    assert_eq!(report.summary.unvalidated, 0);

    let rec = &report.discrepancies[0];
    assert_eq!(rec.lot_source_ref, "INV-2");
    assert_eq!(rec.match_kind, MatchKind::SourceRef);
    assert!((rec.percent_variance - 4.566).abs() < 0.01, "{}", rec.percent_variance);
    assert_eq!(rec.severity, Severity::Medium);
    assert_eq!(rec.absolute_diff, Micros::new(2_620_000));
    assert_eq!(report.summary.severity_counts.medium, 1);
    assert!(report.summary.recurring_items.is_empty());

    let mut out = Vec::new();
    write_discrepancies_csv(&mut out, &report.discrepancies).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
}

#[test]
fn scenario_reference_without_source_ref_falls_back_to_nearest_date() {
    let ledger = brisket();
    let refs = parse_reference_csv(
        "item_code,source_ref,date,unit_price,quantity\nBEEF-BRSK,PO-77,2024-03-10,50.00,10\n"
            .as_bytes(),
    )
    .unwrap();
    let report = validate_prices([&ledger], &refs, Utc::now());

    assert_eq!(report.summary.discrepancies, 2);
    assert!(report
        .discrepancies
        .iter()
        .all(|r| r.match_kind == MatchKind::NearestDate && r.severity == Severity::Critical));
    // 60 vs 50 = 20%, 57.38 vs 50 = 14.76%
    assert_eq!(report.discrepancies[0].lot_source_ref, "INV-2");
    assert_eq!(report.summary.recurring_items, vec!["BEEF-BRSK".to_string()]);
}
