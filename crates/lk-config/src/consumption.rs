/// Which binary is reading the config. Each reads a different subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigConsumer {
    Daemon,
    Cli,
}

impl ConfigConsumer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigConsumer::Daemon => "DAEMON",
            ConfigConsumer::Cli => "CLI",
        }
    }
}

/// JSON-pointer prefixes actually read by each consumer. A leaf under any
/// prefix counts as consumed. Keep this in step with `LedgerConfig`.
pub fn consumed_pointers(consumer: ConfigConsumer) -> &'static [&'static str] {
    match consumer {
        ConfigConsumer::Daemon => DAEMON,
        ConfigConsumer::Cli => CLI,
    }
}

static DAEMON: &[&str] = &[
    "/store/data_dir",
    "/store/persist_interval_secs",
    "/store/persist_after_mutation",
    "/reconcile/large_variance_ratio",
    "/reconcile/far_exceeds_multiplier",
    "/reconcile/spoilage_days",
    "/pricecheck/top_n",
    "/daemon/addr",
];

// the CLI runs one command and persists once at the end
static CLI: &[&str] = &[
    "/store/data_dir",
    "/reconcile/large_variance_ratio",
    "/reconcile/far_exceeds_multiplier",
    "/reconcile/spoilage_days",
    "/pricecheck/top_n",
];
