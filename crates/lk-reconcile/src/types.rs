use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lk_ledger::{ConsumeOutcome, CountRecord, ItemLedger, Lot, Micros, Qty};

/// A physical count for one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSubmission {
    /// Negative counts are clamped to zero by the engine.
    pub counted_qty: Qty,
    pub count_date: NaiveDate,
    /// Date of the most recent order the counter believes was received.
    #[serde(default)]
    pub prior_order_date_hint: Option<NaiveDate>,
}

/// Advisory thresholds. Empirical; operators tune them through config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileThresholds {
    /// `|diff| > ratio * system_qty` raises [`ReconcileWarning::LargeVariance`].
    pub large_variance_ratio: f64,
    /// `counted > multiplier * system_qty` raises [`ReconcileWarning::CountFarExceedsSystem`].
    pub far_exceeds_multiplier: f64,
    /// Oldest remaining lot older than this many days raises
    /// [`ReconcileWarning::PossibleSpoilage`].
    pub spoilage_days: i64,
}

impl Default for ReconcileThresholds {
    fn default() -> Self {
        Self {
            large_variance_ratio: 0.5,
            far_exceeds_multiplier: 2.0,
            spoilage_days: 30,
        }
    }
}

/// Advisory findings. Never block the count from being applied.
///
/// Stable ordering enforced by the engine (declaration order).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileWarning {
    LargeVariance {
        diff: Qty,
        system_qty: Qty,
    },
    UnrecordedOrders {
        hint: NaiveDate,
        last_order_date: Option<NaiveDate>,
    },
    CountFarExceedsSystem {
        counted_qty: Qty,
        system_qty: Qty,
    },
    PossibleSpoilage {
        oldest_lot_date: NaiveDate,
        age_days: i64,
    },
}

impl ReconcileWarning {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LargeVariance { .. } => "large_variance",
            Self::UnrecordedOrders { .. } => "unrecorded_orders",
            Self::CountFarExceedsSystem { .. } => "count_far_exceeds_system",
            Self::PossibleSpoilage { .. } => "possible_spoilage",
        }
    }
}

impl std::fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LargeVariance { diff, system_qty } => {
                write!(f, "large variance: diff {diff} against system {system_qty}")
            }
            Self::UnrecordedOrders {
                hint,
                last_order_date: Some(last),
            } => write!(
                f,
                "possible unrecorded orders: counter reports {hint}, last recorded {last}"
            ),
            Self::UnrecordedOrders {
                hint,
                last_order_date: None,
            } => write!(
                f,
                "possible unrecorded orders: counter reports {hint}, none recorded"
            ),
            Self::CountFarExceedsSystem {
                counted_qty,
                system_qty,
            } => write!(f, "count {counted_qty} far exceeds system {system_qty}"),
            Self::PossibleSpoilage {
                oldest_lot_date,
                age_days,
            } => write!(
                f,
                "possible spoilage: oldest lot from {oldest_lot_date} is {age_days} days old"
            ),
        }
    }
}

/// What the engine did to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileAction {
    NoChange,
    AdjustmentLotAdded { quantity: Qty, unit_price: Micros },
    ShortageConsumed { consumed: Qty, shortfall: Qty },
}

/// Full result of one reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub item_code: String,
    pub count_date: NaiveDate,
    pub system_qty_before: Qty,
    /// After clamping.
    pub counted_qty: Qty,
    /// `true` if the submitted count was negative and clamped to zero.
    pub count_clamped: bool,
    pub diff: Qty,
    pub system_qty_after: Qty,
    pub lots_before: usize,
    pub lots_after: usize,
    pub action: ReconcileAction,
    pub warnings: Vec<ReconcileWarning>,
    pub recommendation: String,
    /// Lot appended for an overage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_lot: Option<Lot>,
    /// Withdrawal applied for a shortage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed: Option<ConsumeOutcome>,
    /// Post-reconcile snapshot (`None` if the item has no ledger).
    pub ledger: Option<ItemLedger>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.action == ReconcileAction::NoChange && self.warnings.is_empty()
    }

    /// History record for the price-history log.
    pub fn count_record(&self) -> CountRecord {
        CountRecord {
            system_qty_before: self.system_qty_before,
            counted_qty: self.counted_qty,
            diff: self.diff,
            system_qty_after: self.system_qty_after,
            lots_before: self.lots_before,
            lots_after: self.lots_after,
            warnings: self.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}
