use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lk_reconcile::ReconcileThresholds;

pub const ENV_DAEMON_ADDR: &str = "LK_DAEMON_ADDR";
pub const ENV_DATA_DIR: &str = "LK_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Artifact directory. Unset keeps the store in memory only.
    pub data_dir: Option<PathBuf>,
    /// Period of the background persist loop; 0 disables it.
    pub persist_interval_secs: u64,
    pub persist_after_mutation: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            persist_interval_secs: 30,
            persist_after_mutation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricecheckSection {
    /// Size of the "most lots" list in the system report.
    pub top_n: usize,
}

impl Default for PricecheckSection {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub addr: SocketAddr,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8899)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub store: StoreSection,
    pub reconcile: ReconcileThresholds,
    pub pricecheck: PricecheckSection,
    pub daemon: DaemonSection,
}

impl LedgerConfig {
    /// Apply `LK_DAEMON_ADDR` / `LK_DATA_DIR` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|k| std::env::var(k).ok())
    }

    /// Same as [`Self::apply_env_overrides`] with an injectable lookup.
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DAEMON_ADDR).filter(|s| !s.trim().is_empty()) {
            self.daemon.addr = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DAEMON_ADDR}={raw} is not a socket address"))?;
        }
        if let Some(raw) = lookup(ENV_DATA_DIR).filter(|s| !s.trim().is_empty()) {
            self.store.data_dir = Some(PathBuf::from(raw.trim()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = LedgerConfig::default();
        assert_eq!(c.reconcile.spoilage_days, 30);
        assert_eq!(c.pricecheck.top_n, 10);
        assert_eq!(c.daemon.addr.to_string(), "127.0.0.1:8899");
        assert!(c.store.data_dir.is_none());
    }

    #[test]
    fn overrides_apply_and_bad_addr_fails() {
        let mut c = LedgerConfig::default();
        c.apply_overrides(|k| match k {
            ENV_DAEMON_ADDR => Some("0.0.0.0:9000".into()),
            ENV_DATA_DIR => Some("/var/lib/lk".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(c.daemon.addr.port(), 9000);
        assert_eq!(c.store.data_dir, Some(PathBuf::from("/var/lib/lk")));

        let err = c
            .apply_overrides(|k| (k == ENV_DAEMON_ADDR).then(|| "nope".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_DAEMON_ADDR));
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut c = LedgerConfig::default();
        c.apply_overrides(|_| Some("  ".into())).unwrap();
        assert_eq!(c, LedgerConfig::default());
    }
}
