//! The Lot Store: sole owner of every item ledger and its price history.
//!
//! Locking: an outer `RwLock` over the item map is held only long enough to
//! look up or insert a slot. Each slot has its own `Mutex` guarding the
//! item's ledger and history, so mutations on different items run
//! concurrently. Readers get clones taken under the slot lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use lk_ledger::{
    ConsumeOutcome, ConsumeReason, IntegrityViolation, ItemLedger, ItemValuation, LedgerError,
    Lot, Micros, NewLot, PriceHistoryEntry, Qty, SystemReport, PHYSICAL_COUNT_REF,
};
use lk_pricecheck::{PriceValidationReport, ReferencePrice};
use lk_reconcile::{CountSubmission, ReconcileReport, ReconcileThresholds};

use crate::ingest::{
    validate_count, validate_order_lines, validate_reference_prices, validate_source_ref,
    CountInput, IngestError, OrderLine, ReferencePriceInput, ValidatedLine,
};
use crate::persist::{read_artifact, write_artifact, ArtifactLoad, HISTORY_FILE, LEDGERS_FILE};

// ---------------------------------------------------------------------------
// Options / outcomes
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// `None` keeps the store purely in memory; `persist()` then fails.
    pub data_dir: Option<PathBuf>,
    pub thresholds: ReconcileThresholds,
    /// Persist after every successful mutation, on the calling thread.
    /// Blocking; async hosts leave this off and persist from a blocking pool.
    pub persist_after_mutation: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            thresholds: ReconcileThresholds::default(),
            persist_after_mutation: false,
        }
    }
}

/// Result of applying one order line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineOutcome {
    Received { item_code: String, lot: Lot },
    /// Negative line: stock withdrawn FIFO with reason `correction`.
    Corrected {
        item_code: String,
        outcome: ConsumeOutcome,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistReport {
    pub items: usize,
    pub history_entries: usize,
    pub written_at: DateTime<Utc>,
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Loaded { items: usize, written_at: DateTime<Utc> },
    Missing,
    /// Started empty; the bad file was moved aside to `quarantined`.
    Corrupt {
        reason: String,
        quarantined: Option<PathBuf>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub ledgers: ArtifactStatus,
    pub history: ArtifactStatus,
    /// Items whose ledger failed the integrity check and was repaired.
    pub repaired: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub items: usize,
    pub lots: usize,
    pub reference_prices: usize,
    /// Last persist attempt failed; in-memory state is still authoritative.
    pub degraded: bool,
    /// Mutations not yet written to disk.
    pub dirty: bool,
    pub last_persist_at: Option<DateTime<Utc>>,
    pub last_persist_error: Option<String>,
}

// ---------------------------------------------------------------------------
// LotStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ItemState {
    ledger: Option<ItemLedger>,
    history: Vec<PriceHistoryEntry>,
}

type Slot = Arc<Mutex<ItemState>>;

#[derive(Default)]
struct PersistMeta {
    last_persist_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct LotStore {
    items: RwLock<BTreeMap<String, Slot>>,
    references: Mutex<Vec<ReferencePrice>>,
    latest_report: Mutex<Option<PriceValidationReport>>,
    opts: StoreOptions,
    degraded: AtomicBool,
    generation: AtomicU64,
    persisted_generation: AtomicU64,
    persist_meta: Mutex<PersistMeta>,
    /// Serialises concurrent `persist()` calls so temp files never interleave.
    persist_gate: Mutex<()>,
}

impl LotStore {
    /// Empty store; nothing is read from disk.
    pub fn new(opts: StoreOptions) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            references: Mutex::new(Vec::new()),
            latest_report: Mutex::new(None),
            opts,
            degraded: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            persisted_generation: AtomicU64::new(0),
            persist_meta: Mutex::new(PersistMeta::default()),
            persist_gate: Mutex::new(()),
        }
    }

    /// Store seeded from `opts.data_dir` (if set). Each artifact loads
    /// independently; a missing or corrupt one starts empty.
    pub fn open(opts: StoreOptions) -> (Self, LoadReport) {
        let store = Self::new(opts);
        let report = match store.opts.data_dir.clone() {
            Some(dir) => store.load_from(&dir),
            None => LoadReport {
                ledgers: ArtifactStatus::Missing,
                history: ArtifactStatus::Missing,
                repaired: Vec::new(),
            },
        };
        (store, report)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    // -----------------------------------------------------------------------
    // Slot access
    // -----------------------------------------------------------------------

    fn slot(&self, item_code: &str) -> Option<Slot> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items.get(item_code).cloned()
    }

    fn slot_or_create(&self, item_code: &str) -> Slot {
        if let Some(slot) = self.slot(item_code) {
            return slot;
        }
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items
            .entry(item_code.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ItemState::default())))
            .clone()
    }

    fn all_slots(&self) -> Vec<(String, Slot)> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    fn after_mutation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.opts.persist_after_mutation && self.opts.data_dir.is_some() {
            // failure is logged and flips `degraded`
            let _ = self.persist();
        }
    }

    // -----------------------------------------------------------------------
    // Write surface
    // -----------------------------------------------------------------------

    /// Apply one validated order line.
    ///
    /// Positive quantity appends a lot (creating the ledger if absent) and an
    /// `order` history entry. Negative quantity is a correction: it withdraws
    /// `|quantity|` FIFO and appends a `removal` entry.
    pub fn add_lot(
        &self,
        order_date: NaiveDate,
        source_ref: &str,
        line: &ValidatedLine,
    ) -> Result<LineOutcome, LedgerError> {
        if line.quantity.is_negative() {
            let outcome = self.consume(
                &line.item_code,
                line.quantity.abs(),
                ConsumeReason::Correction,
                order_date,
                source_ref,
            );
            return Ok(LineOutcome::Corrected {
                item_code: line.item_code.clone(),
                outcome,
            });
        }

        let new = NewLot::new(order_date, source_ref, line.quantity, line.unit_price);
        let slot = self.slot_or_create(&line.item_code);
        let lot = {
            let mut st = lock(&slot);
            let lot = match st.ledger.as_mut() {
                Some(ledger) => {
                    if ledger.description.is_empty() {
                        ledger.description = line.description.clone();
                    }
                    if ledger.unit.is_empty() {
                        ledger.unit = line.unit.clone();
                    }
                    ledger.receive(new)?
                }
                None => {
                    let mut ledger =
                        ItemLedger::new(&line.item_code, &line.description, &line.unit);
                    let lot = ledger.receive(new)?;
                    st.ledger = Some(ledger);
                    lot
                }
            };
            st.history.push(PriceHistoryEntry::order(&lot));
            lot
        };

        debug!(
            item_code = %line.item_code,
            source_ref,
            qty = %lot.original_qty,
            unit_price = %lot.unit_price,
            "lot received"
        );
        self.after_mutation();
        Ok(LineOutcome::Received {
            item_code: line.item_code.clone(),
            lot,
        })
    }

    /// FIFO withdrawal with an audit entry. A missing item reports the whole
    /// request as shortfall and records nothing.
    pub fn consume(
        &self,
        item_code: &str,
        quantity: Qty,
        reason: ConsumeReason,
        date: NaiveDate,
        source_ref: &str,
    ) -> ConsumeOutcome {
        let Some(slot) = self.slot(item_code) else {
            warn!(item_code, qty = %quantity, reason = reason.as_str(), "consume on unknown item");
            return lk_ledger::consume(None, quantity);
        };

        let outcome = {
            let mut st = lock(&slot);
            let outcome = lk_ledger::consume(st.ledger.as_mut(), quantity);
            if quantity.is_positive() {
                st.history
                    .push(PriceHistoryEntry::removal(date, source_ref, reason, &outcome));
            }
            outcome
        };

        if outcome.shortfall.is_positive() {
            warn!(
                item_code,
                requested = %quantity,
                shortfall = %outcome.shortfall,
                reason = reason.as_str(),
                "consume short"
            );
        }
        self.after_mutation();
        outcome
    }

    /// Validate and apply a purchase document. The batch is checked in full
    /// first; on any invalid line nothing is applied.
    pub fn ingest_order_lines(
        &self,
        order_date: NaiveDate,
        source_ref: &str,
        lines: &[OrderLine],
    ) -> Result<Vec<LineOutcome>, IngestError> {
        let source_ref = validate_source_ref(source_ref)?;
        let validated = validate_order_lines(lines)?;
        self.check_headroom(&validated)?;

        let mut out = Vec::with_capacity(validated.len());
        for (index, line) in validated.iter().enumerate() {
            let applied = self
                .add_lot(order_date, &source_ref, line)
                .map_err(|error| IngestError::Ledger { index, error })?;
            out.push(applied);
        }
        info!(
            source_ref = %source_ref,
            %order_date,
            lines = out.len(),
            "order ingested"
        );
        Ok(out)
    }

    /// Refuse a batch whose receipts would overflow an item's total, before
    /// any line is applied.
    fn check_headroom(&self, lines: &[ValidatedLine]) -> Result<(), IngestError> {
        let mut running: BTreeMap<&str, i128> = BTreeMap::new();
        for (index, line) in lines.iter().enumerate() {
            if !line.quantity.is_positive() {
                continue;
            }
            let total = running.entry(line.item_code.as_str()).or_insert_with(|| {
                self.slot(&line.item_code)
                    .and_then(|slot| {
                        let st = lock(&slot);
                        st.ledger.as_ref().map(|l| l.total_quantity)
                    })
                    .map_or(0, |q| q.milli() as i128)
            });
            let current = Qty::from_milli(i64::try_from(*total).unwrap_or(i64::MAX));
            *total += line.quantity.milli() as i128;
            if *total > i64::MAX as i128 {
                return Err(IngestError::Ledger {
                    index,
                    error: LedgerError::QuantityOverflow {
                        total: current,
                        qty: line.quantity,
                    },
                });
            }
        }
        Ok(())
    }

    /// Apply a physical count under the item's lock and record it.
    pub fn reconcile(&self, item_code: &str, submission: &CountSubmission) -> ReconcileReport {
        let slot = self.slot_or_create(item_code);
        let report = {
            let mut st = lock(&slot);
            let report = lk_reconcile::reconcile(
                item_code,
                &mut st.ledger,
                submission,
                &self.opts.thresholds,
            );
            if let Some(lot) = &report.adjustment_lot {
                st.history.push(PriceHistoryEntry::adjustment(lot));
            }
            if let Some(outcome) = &report.consumed {
                st.history.push(PriceHistoryEntry::removal(
                    submission.count_date,
                    PHYSICAL_COUNT_REF,
                    ConsumeReason::InventoryAdjustment,
                    outcome,
                ));
            }
            let price = st
                .ledger
                .as_ref()
                .and_then(|l| l.last_unit_price)
                .unwrap_or(Micros::ZERO);
            st.history.push(PriceHistoryEntry::count(
                submission.count_date,
                price,
                report.count_record(),
            ));
            report
        };

        let warnings: Vec<&str> = report.warnings.iter().map(|w| w.code()).collect();
        info!(
            item_code,
            system = %report.system_qty_before,
            counted = %report.counted_qty,
            diff = %report.diff,
            ?warnings,
            "count reconciled"
        );
        self.after_mutation();
        report
    }

    pub fn submit_count(&self, input: &CountInput) -> Result<ReconcileReport, IngestError> {
        let (item_code, submission) = validate_count(input)?;
        Ok(self.reconcile(&item_code, &submission))
    }

    /// Store reference records, then run price validation over the current
    /// ledgers. A record replaces any held record with the same
    /// `(item_code, source_ref)`.
    pub fn submit_reference_prices(
        &self,
        records: &[ReferencePriceInput],
        now: DateTime<Utc>,
    ) -> Result<PriceValidationReport, IngestError> {
        let validated = validate_reference_prices(records)?;
        self.add_reference_prices(validated);
        Ok(self.validate_prices(now))
    }

    /// Already-typed variant used by the CSV import path.
    ///
    /// Upsert keyed on `(item_code, source_ref)`: a replaced record keeps its
    /// position, so nearest-date ties still go to the earliest submitted key.
    pub fn add_reference_prices(&self, records: Vec<ReferencePrice>) {
        let mut held = lock(&self.references);
        let (mut added, mut replaced) = (0usize, 0usize);
        for record in records {
            match held
                .iter_mut()
                .find(|r| r.item_code == record.item_code && r.source_ref == record.source_ref)
            {
                Some(existing) => {
                    *existing = record;
                    replaced += 1;
                }
                None => {
                    held.push(record);
                    added += 1;
                }
            }
        }
        info!(added, replaced, held = held.len(), "reference prices stored");
    }

    /// Run price validation over snapshots and keep the result as the latest
    /// report.
    pub fn validate_prices(&self, now: DateTime<Utc>) -> PriceValidationReport {
        let ledgers = self.get_all_ledgers();
        let references = lock(&self.references).clone();
        let report = lk_pricecheck::validate_prices(ledgers.values(), &references, now);
        info!(
            report_id = %report.report_id,
            lots = report.summary.lots_checked,
            discrepancies = report.summary.discrepancies,
            unvalidated = report.summary.unvalidated,
            critical = report.summary.severity_counts.critical,
            "price validation complete"
        );
        *lock(&self.latest_report) = Some(report.clone());
        report
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn get_ledger(&self, item_code: &str) -> Option<ItemLedger> {
        let slot = self.slot(item_code)?;
        let st = lock(&slot);
        st.ledger.clone()
    }

    /// Snapshot of every ledger, keyed by item code.
    pub fn get_all_ledgers(&self) -> BTreeMap<String, ItemLedger> {
        self.all_slots()
            .into_iter()
            .filter_map(|(code, slot)| lock(&slot).ledger.clone().map(|l| (code, l)))
            .collect()
    }

    pub fn valuation(&self, item_code: &str) -> Option<ItemValuation> {
        self.get_ledger(item_code)
            .map(|l| lk_ledger::valuation(&l))
    }

    pub fn system_report(&self, top_n: usize) -> SystemReport {
        let ledgers = self.get_all_ledgers();
        lk_ledger::system_report(ledgers.values(), top_n)
    }

    /// Last `last_n` history entries (all if `None`), oldest first.
    pub fn history(&self, item_code: &str, last_n: Option<usize>) -> Vec<PriceHistoryEntry> {
        let Some(slot) = self.slot(item_code) else {
            return Vec::new();
        };
        let st = lock(&slot);
        let n = last_n.unwrap_or(st.history.len()).min(st.history.len());
        st.history[st.history.len() - n..].to_vec()
    }

    pub fn latest_discrepancy_report(&self) -> Option<PriceValidationReport> {
        lock(&self.latest_report).clone()
    }

    pub fn reference_prices(&self) -> Vec<ReferencePrice> {
        lock(&self.references).clone()
    }

    /// Integrity check over every ledger; empty when all pass.
    pub fn verify_all(&self) -> Vec<(String, IntegrityViolation)> {
        self.get_all_ledgers()
            .into_iter()
            .filter_map(|(code, l)| l.verify_integrity().err().map(|v| (code, v)))
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StoreStatus {
        let ledgers = self.get_all_ledgers();
        let meta = lock(&self.persist_meta);
        StoreStatus {
            items: ledgers.len(),
            lots: ledgers.values().map(|l| l.lot_count()).sum(),
            reference_prices: lock(&self.references).len(),
            degraded: self.is_degraded(),
            dirty: self.is_dirty(),
            last_persist_at: meta.last_persist_at,
            last_persist_error: meta.last_error.clone(),
        }
    }

    fn is_dirty(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.persisted_generation.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn snapshot_for_persist(
        &self,
    ) -> (
        BTreeMap<String, ItemLedger>,
        BTreeMap<String, Vec<PriceHistoryEntry>>,
    ) {
        let mut ledgers = BTreeMap::new();
        let mut history = BTreeMap::new();
        for (code, slot) in self.all_slots() {
            // clone under the lock, serialise after it is released
            let st = lock(&slot);
            if let Some(l) = &st.ledger {
                ledgers.insert(code.clone(), l.clone());
            }
            if !st.history.is_empty() {
                history.insert(code, st.history.clone());
            }
        }
        (ledgers, history)
    }

    /// Write both artifacts atomically. On failure the error is logged, the
    /// store is marked degraded, and the in-memory state is unchanged.
    pub fn persist(&self) -> Result<PersistReport> {
        let _gate = lock(&self.persist_gate);
        let dir = self
            .opts
            .data_dir
            .clone()
            .context("persist: no data_dir configured")?;

        let generation = self.generation.load(Ordering::SeqCst);
        let (ledgers, history) = self.snapshot_for_persist();
        let now = Utc::now();

        let written = write_artifact(&dir.join(LEDGERS_FILE), &ledgers, now)
            .context("persist ledgers")
            .and_then(|_| {
                write_artifact(&dir.join(HISTORY_FILE), &history, now)
                    .context("persist price history")
            });

        let mut meta = lock(&self.persist_meta);
        match written {
            Ok(()) => {
                self.persisted_generation.store(generation, Ordering::SeqCst);
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("persist recovered; leaving degraded mode");
                }
                meta.last_persist_at = Some(now);
                meta.last_error = None;
                let report = PersistReport {
                    items: ledgers.len(),
                    history_entries: history.values().map(Vec::len).sum(),
                    written_at: now,
                    data_dir: dir,
                };
                debug!(items = report.items, entries = report.history_entries, "persisted");
                Ok(report)
            }
            Err(e) => {
                self.degraded.store(true, Ordering::SeqCst);
                meta.last_error = Some(format!("{e:#}"));
                error!(error = %format!("{e:#}"), dir = %dir.display(), "persist failed; degraded");
                Err(e)
            }
        }
    }

    /// Persist only if something changed since the last successful write.
    pub fn persist_if_dirty(&self) -> Result<Option<PersistReport>> {
        if !self.is_dirty() && !self.is_degraded() {
            return Ok(None);
        }
        self.persist().map(Some)
    }

    fn load_from(&self, dir: &Path) -> LoadReport {
        let mut repaired = Vec::new();

        let ledgers_path = dir.join(LEDGERS_FILE);
        let ledgers_status = match read_artifact::<BTreeMap<String, ItemLedger>>(&ledgers_path) {
            ArtifactLoad::Loaded {
                payload,
                written_at,
            } => {
                let n = payload.len();
                for (code, mut ledger) in payload {
                    if let Err(v) = ledger.verify_integrity() {
                        warn!(item_code = %code, violation = %v, "ledger failed integrity check; repairing");
                        ledger.repair();
                        repaired.push(code.clone());
                    }
                    lock(&self.slot_or_create(&code)).ledger = Some(ledger);
                }
                info!(items = n, %written_at, "ledgers loaded");
                ArtifactStatus::Loaded {
                    items: n,
                    written_at,
                }
            }
            ArtifactLoad::Missing => {
                info!(path = %ledgers_path.display(), "no ledgers artifact; starting empty");
                ArtifactStatus::Missing
            }
            ArtifactLoad::Corrupt(reason) => corrupt_status(&ledgers_path, reason),
        };

        let history_path = dir.join(HISTORY_FILE);
        let history_status =
            match read_artifact::<BTreeMap<String, Vec<PriceHistoryEntry>>>(&history_path) {
                ArtifactLoad::Loaded {
                    payload,
                    written_at,
                } => {
                    let n = payload.len();
                    for (code, entries) in payload {
                        lock(&self.slot_or_create(&code)).history = entries;
                    }
                    info!(items = n, %written_at, "price history loaded");
                    ArtifactStatus::Loaded {
                        items: n,
                        written_at,
                    }
                }
                ArtifactLoad::Missing => {
                    info!(path = %history_path.display(), "no price history artifact; starting empty");
                    ArtifactStatus::Missing
                }
                ArtifactLoad::Corrupt(reason) => corrupt_status(&history_path, reason),
            };

        if !repaired.is_empty() {
            // repaired state differs from disk
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        LoadReport {
            ledgers: ledgers_status,
            history: history_status,
            repaired,
        }
    }
}

/// Log, move the bad file aside so the next persist does not destroy it,
/// and report the artifact as started-empty.
fn corrupt_status(path: &Path, reason: String) -> ArtifactStatus {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{stamp}"));
    let target = path.with_file_name(name);
    let quarantined = match std::fs::rename(path, &target) {
        Ok(()) => Some(target),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not quarantine corrupt artifact");
            None
        }
    };
    warn!(path = %path.display(), %reason, "corrupt artifact; starting empty");
    ArtifactStatus::Corrupt {
        reason,
        quarantined,
    }
}
