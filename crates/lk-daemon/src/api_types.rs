//! Request and response types for all lk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lk_ledger::{ItemLedger, PriceHistoryEntry};
use lk_store::{LineOutcome, OrderLine, PersistReport, ReferencePriceInput};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Errors (400 / 404 / 500)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /v1/orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_date: NaiveDate,
    pub source_ref: String,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub source_ref: String,
    pub applied: Vec<LineOutcome>,
}

// ---------------------------------------------------------------------------
// POST /v1/reference-prices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePricesRequest {
    pub records: Vec<ReferencePriceInput>,
}

// ---------------------------------------------------------------------------
// Ledger reads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgersResponse {
    pub ledgers: Vec<ItemLedger>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Last N entries; all when absent.
    pub last: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub item_code: String,
    pub entries: Vec<PriceHistoryEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportQuery {
    /// Size of the most-lots list; config default when absent.
    pub top: Option<usize>,
}

// ---------------------------------------------------------------------------
// POST /v1/persist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistResponse {
    pub persisted: PersistReport,
}
