use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lk_ledger::{Micros, Qty};

/// External purchase record used to cross-check lot prices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePrice {
    pub item_code: String,
    pub source_ref: String,
    pub date: NaiveDate,
    pub unit_price: Micros,
    pub quantity: Qty,
}

/// Banded classification of percent variance.
///
/// Below 1% is treated as a match and never reported.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const MEDIUM_FROM_PCT: f64 = 1.0;
    pub const HIGH_FROM_PCT: f64 = 5.0;
    pub const CRITICAL_FROM_PCT: f64 = 10.0;

    /// `None` for variance under 1% (and for NaN).
    pub fn from_percent(pct: f64) -> Option<Severity> {
        if pct >= Self::CRITICAL_FROM_PCT {
            Some(Severity::Critical)
        } else if pct >= Self::HIGH_FROM_PCT {
            Some(Severity::High)
        } else if pct >= Self::MEDIUM_FROM_PCT {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// How the reference record was paired with the lot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Same item and same `source_ref`.
    SourceRef,
    /// Same item, closest date.
    NearestDate,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::SourceRef => "source_ref",
            MatchKind::NearestDate => "nearest_date",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub item_code: String,
    pub description: String,
    pub lot_price: Micros,
    pub reference_price: Micros,
    pub absolute_diff: Micros,
    pub percent_variance: f64,
    pub severity: Severity,
    pub lot_date: NaiveDate,
    pub lot_source_ref: String,
    pub reference_source_ref: String,
    pub reference_date: NaiveDate,
    pub match_kind: MatchKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnvalidatedReason {
    /// Synthetic count-overage lot; there is no purchase to compare with.
    AdjustmentLot,
    /// No reference record for the item.
    NoReference,
    /// References exist for the item but none has a positive price.
    NonPositiveReference,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnvalidatedLot {
    pub item_code: String,
    pub lot_date: NaiveDate,
    pub lot_source_ref: String,
    pub reason: UnvalidatedReason,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn bump(&mut self, s: Severity) {
        match s {
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}

/// `lots_checked == matches + discrepancies + unvalidated`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Items with at least one remaining lot.
    pub items_checked: usize,
    pub lots_checked: usize,
    /// Lots paired with a reference within 1%.
    pub matches: usize,
    pub discrepancies: usize,
    pub unvalidated: usize,
    /// Mean percent variance over discrepancies (0 when there are none).
    pub average_variance_pct: f64,
    pub severity_counts: SeverityCounts,
    /// Items with more than one discrepancy, ascending.
    pub recurring_items: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceValidationReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub summary: ValidationSummary,
    /// Sorted by `percent_variance` descending. Never truncated.
    pub discrepancies: Vec<DiscrepancyRecord>,
    pub unvalidated: Vec<UnvalidatedLot>,
}
