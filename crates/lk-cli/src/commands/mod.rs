//! Command handler modules for lk-cli.
//!
//! Shared context (config, store opening, output) lives here.
//! Command-specific logic lives in the submodules.

pub mod ledger;
pub mod prices;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lk_config::{ConfigConsumer, LedgerConfig, UnusedKeyPolicy};
use lk_store::{ArtifactStatus, LotStore, StoreOptions};
use serde::Serialize;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Ctx
// ---------------------------------------------------------------------------

pub struct Ctx {
    pub config: LedgerConfig,
    pub config_hash: String,
}

impl Ctx {
    /// Precedence for the data dir: `--data-dir`, then `LK_DATA_DIR`, then
    /// `store.data_dir` from the config layers.
    pub fn load(paths: &[PathBuf], data_dir: Option<PathBuf>, strict: bool) -> Result<Self> {
        let loaded = lk_config::load_layered_yaml(paths).context("load config")?;
        let policy = if strict {
            UnusedKeyPolicy::Fail
        } else {
            UnusedKeyPolicy::Warn
        };
        let unused = lk_config::report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, policy)?;
        if !unused.is_clean() {
            warn!(keys = ?unused.unused_leaf_pointers, "config keys not read by the CLI");
        }

        let mut config = loaded.ledger_config()?;
        config.apply_env_overrides()?;
        if let Some(dir) = data_dir {
            config.store.data_dir = Some(dir);
        }
        Ok(Self {
            config,
            config_hash: loaded.config_hash,
        })
    }

    pub fn data_dir(&self) -> Result<&Path> {
        self.config
            .store
            .data_dir
            .as_deref()
            .context("no data dir: pass --data-dir, set LK_DATA_DIR, or set store.data_dir")
    }

    /// Open the store from the data dir. Corrupt artifacts are quarantined
    /// by the store and reported here.
    pub fn open_store(&self) -> Result<LotStore> {
        let dir = self.data_dir()?.to_path_buf();
        let (store, load) = LotStore::open(StoreOptions {
            data_dir: Some(dir.clone()),
            thresholds: self.config.reconcile.clone(),
            persist_after_mutation: false,
        });
        for (name, status) in [("ledgers", &load.ledgers), ("history", &load.history)] {
            if let ArtifactStatus::Corrupt {
                reason,
                quarantined,
            } = status
            {
                warn!(artifact = name, %reason, quarantined = ?quarantined, "artifact corrupt; started empty");
            }
        }
        for code in &load.repaired {
            warn!(item_code = %code, "ledger repaired on load");
        }
        info!(dir = %dir.display(), config_hash = %self.config_hash, "store opened");
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Persist after a mutating command. Failure is an error for the CLI: the
/// process is about to exit and would otherwise lose the change.
pub fn persist(store: &LotStore) -> Result<()> {
    let report = store.persist().context("persist store")?;
    println!(
        "persisted=true items={} history_entries={}",
        report.items, report.history_entries
    );
    Ok(())
}

pub fn print_json<T: Serialize>(v: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    println!("{s}");
    Ok(())
}
