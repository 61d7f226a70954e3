//! In-process scenario tests for lk-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no socket is bound.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use lk_daemon::{routes, state};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state() -> Arc<state::AppState> {
    Arc::new(state::AppState::in_memory())
}

async fn call(
    st: &Arc<state::AppState>,
    req: Request<axum::body::Body>,
) -> (StatusCode, bytes::Bytes) {
    let router = routes::build_router(Arc::clone(st));
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

async fn get(st: &Arc<state::AppState>, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(st, req).await;
    (status, parse_json(body))
}

async fn post(st: &Arc<state::AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let (status, body) = call(st, req).await;
    (status, parse_json(body))
}

fn parse_json(b: bytes::Bytes) -> Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn brisket_order() -> Value {
    json!({
        "order_date": "2024-02-01",
        "source_ref": "INV-7",
        "lines": [
            {"item_code": "BRISKET", "description": "Brisket choice", "unit": "lb",
             "quantity": 30.0, "unit_price": 60.0}
        ]
    })
}

// ---------------------------------------------------------------------------
// Health / status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let st = make_state();
    let (status, json) = get(&st, "/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "lk-daemon");
}

#[tokio::test]
async fn status_reports_empty_in_memory_store() {
    let st = make_state();
    let (status, json) = get(&st, "/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["store"]["items"], 0);
    assert_eq!(json["store"]["degraded"], false);
    assert_eq!(json["in_memory_only"], true);
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_creates_ledger_and_emits_event() {
    let st = make_state();
    let mut rx = st.bus.subscribe();

    let (status, json) = post(&st, "/v1/orders", brisket_order()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["applied"][0]["kind"], "received");

    let (status, ledger) = get(&st, "/v1/ledgers/BRISKET").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["lots"].as_array().unwrap().len(), 1);
    assert_eq!(ledger["unit"], "lb");

    let msg = rx.try_recv().expect("lot_received event");
    assert_eq!(msg.event_name(), "lot_received");
}

#[tokio::test]
async fn invalid_order_is_400_and_applies_nothing() {
    let st = make_state();
    let body = json!({
        "order_date": "2024-02-01",
        "source_ref": "INV-8",
        "lines": [
            {"item_code": "A", "quantity": 1.0, "unit_price": 1.0},
            {"item_code": "B", "quantity": 0.0, "unit_price": 1.0}
        ]
    });
    let (status, json) = post(&st, "/v1/orders", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("record 1"));

    let (_, list) = get(&st, "/v1/ledgers").await;
    assert!(list["ledgers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_400_with_error_field() {
    let st = make_state();
    let (status, json) = post(&st, "/v1/orders", json!({"source_ref": "X"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn unknown_ledger_is_404() {
    let st = make_state();
    let (status, json) = get(&st, "/v1/ledgers/NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("NOPE"));

    let (status, _) = get(&st, "/v1/ledgers/NOPE/valuation").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn count_overage_adds_adjustment_lot_with_warning() {
    let st = make_state();
    post(&st, "/v1/orders", brisket_order()).await;

    let (status, report) = post(
        &st,
        "/v1/counts",
        json!({"item_code": "BRISKET", "counted_qty": 50.0, "count_date": "2024-02-03"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["warnings"][0]["kind"], "large_variance");

    let (_, ledger) = get(&st, "/v1/ledgers/BRISKET").await;
    let lots = ledger["lots"].as_array().unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[1]["source_ref"], "INVENTORY_ADJUSTMENT");

    let (_, hist) = get(&st, "/v1/ledgers/BRISKET/history?last=2").await;
    let entries = hist["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "adjustment");
    assert_eq!(entries[1]["kind"], "count");
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discrepancies_404_until_validation_runs() {
    let st = make_state();
    let (status, _) = get(&st, "/v1/discrepancies").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    post(&st, "/v1/orders", brisket_order()).await;
    let (status, report) = post(
        &st,
        "/v1/reference-prices",
        json!({"records": [
            {"item_code": "BRISKET", "source_ref": "INV-7", "date": "2024-02-01",
             "unit_price": 57.38, "quantity": 30.0}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["discrepancies"][0]["severity"], "medium");

    let (status, latest) = get(&st, "/v1/discrepancies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["report_id"], report["report_id"]);

    let (status, rerun) = post(&st, "/v1/validate", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rerun["summary"]["discrepancies"], 1);
}

// ---------------------------------------------------------------------------
// Report / persist
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_honours_top_query() {
    let st = make_state();
    for (i, code) in ["A", "B", "C"].iter().enumerate() {
        for n in 0..=i {
            post(
                &st,
                "/v1/orders",
                json!({
                    "order_date": "2024-03-01",
                    "source_ref": format!("INV-{code}-{n}"),
                    "lines": [{"item_code": code, "quantity": 1.0, "unit_price": 2.0}]
                }),
            )
            .await;
        }
    }
    let (status, report) = get(&st, "/v1/report?top=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["distinct_items"], 3);
    let top = report["top_by_lot_count"].as_array().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["item_code"], "C");
}

#[tokio::test]
async fn persist_without_data_dir_is_500() {
    let st = make_state();
    let (status, json) = post(&st, "/v1/persist", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("data_dir"));
}

#[tokio::test]
async fn persist_with_data_dir_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = lk_store::LotStore::new(lk_store::StoreOptions {
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    });
    let st = Arc::new(state::AppState::new(
        Arc::new(store),
        lk_config::LedgerConfig::default(),
    ));
    post(&st, "/v1/orders", brisket_order()).await;

    let (status, json) = post(&st, "/v1/persist", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["persisted"]["items"], 1);
    assert!(dir.path().join(lk_store::LEDGERS_FILE).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn persist_after_mutation_writes_before_the_reply() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = lk_config::LedgerConfig::default();
    config.store.data_dir = Some(dir.path().to_path_buf());
    config.store.persist_after_mutation = true;
    let store = lk_store::LotStore::new(lk_store::StoreOptions {
        data_dir: config.store.data_dir.clone(),
        ..Default::default()
    });
    let st = Arc::new(state::AppState::new(Arc::new(store), config));

    let (status, _) = post(&st, "/v1/orders", brisket_order()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(dir.path().join(lk_store::LEDGERS_FILE).exists());
    assert!(!st.store.status().dirty);

    let (status, _) = post(
        &st,
        "/v1/counts",
        json!({"item_code": "BRISKET", "counted_qty": 25.0, "count_date": "2024-02-03"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!st.store.status().dirty);
}
