use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ledger, prices, Ctx};

#[derive(Parser)]
#[command(name = "lk")]
#[command(about = "FIFO lot ledger CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (repeatable)
    #[arg(long = "config", global = true)]
    config_paths: Vec<PathBuf>,

    /// Artifact directory; overrides store.data_dir and LK_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Fail instead of warn on config keys the CLI never reads
    #[arg(long, global = true, default_value_t = false)]
    strict_config: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local ...)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Apply a purchase document (CSV or JSON lines). Negative lines are corrections.
    Ingest {
        #[arg(long)]
        order_date: chrono::NaiveDate,

        #[arg(long)]
        source_ref: String,

        /// CSV with item_code,description,unit,quantity,unit_price; `.json` for an array
        #[arg(long)]
        file: PathBuf,
    },

    /// Reconcile a physical count against the ledger
    Count {
        #[arg(long)]
        item: String,

        #[arg(long)]
        qty: f64,

        #[arg(long)]
        date: chrono::NaiveDate,

        /// Date of an order believed received but never ingested
        #[arg(long)]
        prior_order_date: Option<chrono::NaiveDate>,
    },

    /// Validate lot prices against reference purchase records
    Validate {
        /// Reference CSV: item_code,source_ref,date,unit_price,quantity
        #[arg(long)]
        refs: PathBuf,

        /// Write discrepancies to this CSV
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Print one ledger with its valuation, or every ledger
    Show {
        item: Option<String>,
    },

    /// Print the price history of an item
    History {
        item: String,

        /// Last N entries only
        #[arg(long)]
        last: Option<usize>,
    },

    /// System-wide valuation report
    Report {
        /// Size of the most-lots list (config default when absent)
        #[arg(long)]
        top: Option<usize>,
    },

    /// Check every ledger's invariants; non-zero exit on any violation
    Verify,
}

fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    let ctx = || Ctx::load(&cli.config_paths, cli.data_dir.clone(), cli.strict_config);

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = lk_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }
        Commands::Ingest {
            order_date,
            source_ref,
            file,
        } => ledger::ingest(&ctx()?, order_date, &source_ref, &file),
        Commands::Count {
            item,
            qty,
            date,
            prior_order_date,
        } => ledger::count(&ctx()?, &item, qty, date, prior_order_date),
        Commands::Validate { refs, export } => prices::validate(&ctx()?, &refs, export.as_deref()),
        Commands::Show { item } => ledger::show(&ctx()?, item.as_deref()),
        Commands::History { item, last } => ledger::history(&ctx()?, &item, last),
        Commands::Report { top } => ledger::report(&ctx()?, top),
        Commands::Verify => ledger::verify(&ctx()?),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
