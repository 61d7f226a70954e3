//! Shared runtime state for lk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The lot store does its
//! own locking; this module only adds the event bus and build metadata.

use std::sync::Arc;
use std::time::Duration;

use lk_config::LedgerConfig;
use lk_ledger::{Micros, Qty};
use lk_store::{LotStore, StoreOptions, StoreStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    Status(StatusSnapshot),
    LogLine {
        level: String,
        msg: String,
    },
    LotReceived {
        item_code: String,
        source_ref: String,
        quantity: Qty,
        unit_price: Micros,
    },
    StockCorrected {
        item_code: String,
        consumed: Qty,
        shortfall: Qty,
    },
    CountApplied {
        item_code: String,
        diff: Qty,
        system_qty_after: Qty,
        warnings: Vec<String>,
    },
    PricesValidated {
        report_id: Uuid,
        discrepancies: usize,
        critical: usize,
    },
    Persisted {
        items: usize,
        history_entries: usize,
    },
}

impl BusMsg {
    /// SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Status(_) => "status",
            BusMsg::LogLine { .. } => "log",
            BusMsg::LotReceived { .. } => "lot_received",
            BusMsg::StockCorrected { .. } => "stock_corrected",
            BusMsg::CountApplied { .. } => "count_applied",
            BusMsg::PricesValidated { .. } => "prices_validated",
            BusMsg::Persisted { .. } => "persisted",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo / StatusSnapshot
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Returned by GET /v1/status and carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub store: StoreStatus,
    pub persist_interval_secs: u64,
    pub in_memory_only: bool,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub store: Arc<LotStore>,
    pub config: LedgerConfig,
}

impl AppState {
    pub fn new(store: Arc<LotStore>, config: LedgerConfig) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "lk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            store,
            config,
        }
    }

    /// Fresh in-memory store with default config. Used by tests.
    pub fn in_memory() -> Self {
        let config = LedgerConfig::default();
        let store = LotStore::new(StoreOptions {
            data_dir: None,
            thresholds: config.reconcile.clone(),
            persist_after_mutation: false,
        });
        Self::new(Arc::new(store), config)
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            store: self.store.status(),
            persist_interval_secs: self.config.store.persist_interval_secs,
            in_memory_only: self.store.options().data_dir.is_none(),
        }
    }

    /// Send on the bus; no subscribers is not an error.
    pub fn publish(&self, msg: BusMsg) {
        let _ = self.bus.send(msg);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Run one persist of `state.store` off the async runtime and report it on
/// the bus. Skipped when nothing changed since the last success.
pub async fn persist_tick(state: &AppState) {
    let store = Arc::clone(&state.store);
    let joined = tokio::task::spawn_blocking(move || store.persist_if_dirty()).await;
    match joined {
        Ok(Ok(Some(report))) => state.publish(BusMsg::Persisted {
            items: report.items,
            history_entries: report.history_entries,
        }),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => state.publish(BusMsg::LogLine {
            level: "ERROR".to_string(),
            msg: format!("persist failed; store degraded: {e:#}"),
        }),
        Err(e) => error!(error = %e, "persist task panicked"),
    }
}

/// Persist after a mutating request when `store.persist_after_mutation` is
/// set. The write runs on the blocking pool; the handler awaits it so the
/// reply follows the write.
pub async fn persist_after_mutation(state: &AppState) {
    if state.config.store.persist_after_mutation && state.store.options().data_dir.is_some() {
        persist_tick(state).await;
    }
}

/// Spawn the periodic persist loop. The first tick fires after `interval`.
pub fn spawn_persist_loop(state: Arc<AppState>, interval: Duration) {
    info!(every_secs = interval.as_secs(), "persist loop started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // interval() fires immediately; skip that one
        ticker.tick().await;
        loop {
            ticker.tick().await;
            persist_tick(&state).await;
        }
    });
}
