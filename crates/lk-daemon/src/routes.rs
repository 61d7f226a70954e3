//! Axum router and all HTTP handlers for lk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Store calls are short and lock per item, so handlers
//! call them inline; only persistence is moved to the blocking pool.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use lk_pricecheck::PriceValidationReport;
use lk_store::{CountInput, LineOutcome};

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, HistoryQuery, HistoryResponse, LedgersResponse,
        OrderRequest, OrderResponse, PersistResponse, ReferencePricesRequest, ReportQuery,
    },
    state::{self, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/orders", post(post_orders))
        .route("/v1/counts", post(post_counts))
        .route("/v1/reference-prices", post(post_reference_prices))
        .route("/v1/validate", post(post_validate))
        .route("/v1/ledgers", get(list_ledgers))
        .route("/v1/ledgers/:item_code", get(get_ledger))
        .route("/v1/ledgers/:item_code/valuation", get(get_valuation))
        .route("/v1/ledgers/:item_code/history", get(get_history))
        .route("/v1/report", get(get_report))
        .route("/v1/discrepancies", get(get_discrepancies))
        .route("/v1/persist", post(post_persist))
        .with_state(state)
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn bad_body(rejection: JsonRejection) -> Response {
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

fn not_found(item_code: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("no ledger for item_code {item_code}"),
    )
}

fn publish_report(st: &AppState, report: &PriceValidationReport) {
    st.publish(BusMsg::PricesValidated {
        report_id: report.report_id,
        discrepancies: report.summary.discrepancies,
        critical: report.summary.severity_counts.critical,
    });
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.status_snapshot();
    st.publish(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/orders
// ---------------------------------------------------------------------------

pub(crate) async fn post_orders(
    State(st): State<Arc<AppState>>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rej) => return bad_body(rej),
    };

    let applied = match st
        .store
        .ingest_order_lines(req.order_date, &req.source_ref, &req.lines)
    {
        Ok(a) => a,
        Err(e) => {
            warn!(source_ref = %req.source_ref, error = %e, "orders rejected");
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    for outcome in &applied {
        match outcome {
            LineOutcome::Received { item_code, lot } => st.publish(BusMsg::LotReceived {
                item_code: item_code.clone(),
                source_ref: lot.source_ref.clone(),
                quantity: lot.original_qty,
                unit_price: lot.unit_price,
            }),
            LineOutcome::Corrected { item_code, outcome } => st.publish(BusMsg::StockCorrected {
                item_code: item_code.clone(),
                consumed: outcome.consumed,
                shortfall: outcome.shortfall,
            }),
        }
    }
    state::persist_after_mutation(&st).await;

    (
        StatusCode::OK,
        Json(OrderResponse {
            source_ref: req.source_ref.trim().to_string(),
            applied,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/counts
// ---------------------------------------------------------------------------

pub(crate) async fn post_counts(
    State(st): State<Arc<AppState>>,
    body: Result<Json<CountInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rej) => return bad_body(rej),
    };

    match st.store.submit_count(&input) {
        Ok(report) => {
            st.publish(BusMsg::CountApplied {
                item_code: report.item_code.clone(),
                diff: report.diff,
                system_qty_after: report.system_qty_after,
                warnings: report.warnings.iter().map(|w| w.code().to_string()).collect(),
            });
            state::persist_after_mutation(&st).await;
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/reference-prices  /v1/validate
// ---------------------------------------------------------------------------

pub(crate) async fn post_reference_prices(
    State(st): State<Arc<AppState>>,
    body: Result<Json<ReferencePricesRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rej) => return bad_body(rej),
    };

    match st.store.submit_reference_prices(&req.records, Utc::now()) {
        Ok(report) => {
            publish_report(&st, &report);
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

pub(crate) async fn post_validate(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let report = st.store.validate_prices(Utc::now());
    publish_report(&st, &report);
    (StatusCode::OK, Json(report))
}

pub(crate) async fn get_discrepancies(State(st): State<Arc<AppState>>) -> Response {
    match st.store.latest_discrepancy_report() {
        Some(r) => (StatusCode::OK, Json(r)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no price validation has run yet"),
    }
}

// ---------------------------------------------------------------------------
// Ledger reads
// ---------------------------------------------------------------------------

pub(crate) async fn list_ledgers(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let ledgers = st.store.get_all_ledgers().into_values().collect();
    (StatusCode::OK, Json(LedgersResponse { ledgers }))
}

pub(crate) async fn get_ledger(
    State(st): State<Arc<AppState>>,
    Path(item_code): Path<String>,
) -> Response {
    match st.store.get_ledger(&item_code) {
        Some(l) => (StatusCode::OK, Json(l)).into_response(),
        None => not_found(&item_code),
    }
}

pub(crate) async fn get_valuation(
    State(st): State<Arc<AppState>>,
    Path(item_code): Path<String>,
) -> Response {
    match st.store.valuation(&item_code) {
        Some(v) => (StatusCode::OK, Json(v)).into_response(),
        None => not_found(&item_code),
    }
}

pub(crate) async fn get_history(
    State(st): State<Arc<AppState>>,
    Path(item_code): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let entries = st.store.history(&item_code, q.last);
    (StatusCode::OK, Json(HistoryResponse { item_code, entries }))
}

pub(crate) async fn get_report(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> impl IntoResponse {
    let top = q.top.unwrap_or(st.config.pricecheck.top_n);
    (StatusCode::OK, Json(st.store.system_report(top)))
}

// ---------------------------------------------------------------------------
// POST /v1/persist
// ---------------------------------------------------------------------------

pub(crate) async fn post_persist(State(st): State<Arc<AppState>>) -> Response {
    let store = Arc::clone(&st.store);
    let result = match tokio::task::spawn_blocking(move || store.persist()).await {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    match result {
        Ok(persisted) => {
            info!(items = persisted.items, "persist/manual");
            st.publish(BusMsg::Persisted {
                items: persisted.items,
                history_entries: persisted.history_entries,
            });
            (StatusCode::OK, Json(PersistResponse { persisted })).into_response()
        }
        Err(e) => {
            st.publish(BusMsg::LogLine {
                level: "ERROR".to_string(),
                msg: format!("persist failed; store degraded: {e:#}"),
            });
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
