use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use lk_ledger::{ItemLedger, Lot, Micros};

use crate::types::{
    DiscrepancyRecord, MatchKind, PriceValidationReport, ReferencePrice, Severity,
    SeverityCounts, UnvalidatedLot, UnvalidatedReason, ValidationSummary,
};

enum Pairing<'a> {
    Matched(&'a ReferencePrice, MatchKind),
    Unvalidated(UnvalidatedReason),
}

/// Pick the reference for one lot.
///
/// `candidates` are the item's references in submission order, so
/// "first wins" ties fall out of `find` / `min_by_key`.
fn pair_lot<'a>(lot: &Lot, candidates: &[&'a ReferencePrice]) -> Pairing<'a> {
    if lot.is_adjustment() {
        return Pairing::Unvalidated(UnvalidatedReason::AdjustmentLot);
    }
    if candidates.is_empty() {
        return Pairing::Unvalidated(UnvalidatedReason::NoReference);
    }

    let usable: Vec<&'a ReferencePrice> = candidates
        .iter()
        .copied()
        .filter(|r| r.unit_price.raw() > 0)
        .collect();
    if usable.is_empty() {
        return Pairing::Unvalidated(UnvalidatedReason::NonPositiveReference);
    }

    if let Some(r) = usable.iter().copied().find(|r| r.source_ref == lot.source_ref) {
        return Pairing::Matched(r, MatchKind::SourceRef);
    }

    match usable
        .iter()
        .copied()
        .min_by_key(|r| (r.date - lot.received_date).num_days().abs())
    {
        Some(r) => Pairing::Matched(r, MatchKind::NearestDate),
        None => Pairing::Unvalidated(UnvalidatedReason::NoReference),
    }
}

/// `|lot - ref| / ref * 100`. `reference` must be positive.
pub fn percent_variance(lot_price: Micros, reference: Micros) -> f64 {
    let diff = (lot_price.raw() as i128 - reference.raw() as i128).abs();
    (diff * 100) as f64 / reference.raw() as f64
}

/// Cross-check every remaining lot against external purchase records.
///
/// Works from snapshots; the result is ephemeral and recomputed per run.
pub fn validate_prices<'a, I>(
    ledgers: I,
    references: &[ReferencePrice],
    now: DateTime<Utc>,
) -> PriceValidationReport
where
    I: IntoIterator<Item = &'a ItemLedger>,
{
    let mut by_item: BTreeMap<&str, Vec<&ReferencePrice>> = BTreeMap::new();
    for r in references {
        by_item.entry(r.item_code.as_str()).or_default().push(r);
    }

    let mut summary = ValidationSummary::default();
    let mut discrepancies: Vec<DiscrepancyRecord> = Vec::new();
    let mut unvalidated: Vec<UnvalidatedLot> = Vec::new();
    let mut per_item: BTreeMap<String, usize> = BTreeMap::new();

    for ledger in ledgers {
        if ledger.lots.is_empty() {
            continue;
        }
        summary.items_checked += 1;
        let candidates = by_item
            .get(ledger.item_code.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for lot in &ledger.lots {
            summary.lots_checked += 1;
            let (reference, match_kind) = match pair_lot(lot, candidates) {
                Pairing::Matched(r, k) => (r, k),
                Pairing::Unvalidated(reason) => {
                    summary.unvalidated += 1;
                    unvalidated.push(UnvalidatedLot {
                        item_code: ledger.item_code.clone(),
                        lot_date: lot.received_date,
                        lot_source_ref: lot.source_ref.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let pct = percent_variance(lot.unit_price, reference.unit_price);
            let Some(severity) = Severity::from_percent(pct) else {
                summary.matches += 1;
                continue;
            };

            summary.discrepancies += 1;
            summary.severity_counts.bump(severity);
            *per_item.entry(ledger.item_code.clone()).or_default() += 1;
            discrepancies.push(DiscrepancyRecord {
                item_code: ledger.item_code.clone(),
                description: ledger.description.clone(),
                lot_price: lot.unit_price,
                reference_price: reference.unit_price,
                absolute_diff: (lot.unit_price.saturating_sub(reference.unit_price)).abs(),
                percent_variance: pct,
                severity,
                lot_date: lot.received_date,
                lot_source_ref: lot.source_ref.clone(),
                reference_source_ref: reference.source_ref.clone(),
                reference_date: reference.date,
                match_kind,
            });
        }
    }

    // percent desc; item code / lot ref keep equal variances stable
    discrepancies.sort_by(|a, b| {
        b.percent_variance
            .total_cmp(&a.percent_variance)
            .then_with(|| a.item_code.cmp(&b.item_code))
            .then_with(|| a.lot_date.cmp(&b.lot_date))
            .then_with(|| a.lot_source_ref.cmp(&b.lot_source_ref))
    });

    if !discrepancies.is_empty() {
        let total: f64 = discrepancies.iter().map(|d| d.percent_variance).sum();
        summary.average_variance_pct = total / discrepancies.len() as f64;
    }
    summary.recurring_items = per_item
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(code, _)| code)
        .collect();

    PriceValidationReport {
        report_id: Uuid::new_v4(),
        generated_at: now,
        summary,
        discrepancies,
        unvalidated,
    }
}

impl PriceValidationReport {
    pub fn count_at(&self, severity: Severity) -> usize {
        let SeverityCounts {
            medium,
            high,
            critical,
        } = &self.summary.severity_counts;
        match severity {
            Severity::Medium => *medium,
            Severity::High => *high,
            Severity::Critical => *critical,
        }
    }
}
