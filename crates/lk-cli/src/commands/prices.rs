use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use lk_pricecheck::{parse_reference_csv_file, write_discrepancies_csv, Severity};

use super::Ctx;

/// Reference records come from the CSV on each run; they are not persisted.
pub fn validate(ctx: &Ctx, refs: &Path, export: Option<&Path>) -> Result<()> {
    let references = parse_reference_csv_file(refs)
        .with_context(|| format!("reference csv {}", refs.display()))?;
    let store = ctx.open_store()?;
    store.add_reference_prices(references);
    let report = store.validate_prices(Utc::now());

    let s = &report.summary;
    println!("report_id={}", report.report_id);
    println!(
        "items_checked={} lots_checked={} matches={} discrepancies={} unvalidated={}",
        s.items_checked, s.lots_checked, s.matches, s.discrepancies, s.unvalidated
    );
    println!(
        "critical={} high={} medium={} average_variance_pct={:.2}",
        report.count_at(Severity::Critical),
        report.count_at(Severity::High),
        report.count_at(Severity::Medium),
        s.average_variance_pct
    );
    if !s.recurring_items.is_empty() {
        println!("recurring_items={}", s.recurring_items.join(","));
    }
    for d in &report.discrepancies {
        println!(
            "discrepancy item_code={} severity={} pct={:.2} lot_price={} reference_price={} lot_date={}",
            d.item_code,
            d.severity.as_str(),
            d.percent_variance,
            d.lot_price,
            d.reference_price,
            d.lot_date
        );
    }

    if let Some(path) = export {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        write_discrepancies_csv(BufWriter::new(file), &report.discrepancies)
            .with_context(|| format!("write {}", path.display()))?;
        println!("exported={}", path.display());
    }
    Ok(())
}
