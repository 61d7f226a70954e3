use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use lk_store::{CountInput, LineOutcome, OrderLine};

use super::{persist, print_json, Ctx};

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

fn read_order_lines(path: &Path) -> Result<Vec<OrderLine>> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        return serde_json::from_slice(&bytes)
            .with_context(|| format!("{} must be a JSON array of order lines", path.display()));
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<OrderLine>().enumerate() {
        // header is row 1
        out.push(rec.with_context(|| format!("{} row {}", path.display(), i + 2))?);
    }
    Ok(out)
}

pub fn ingest(ctx: &Ctx, order_date: NaiveDate, source_ref: &str, file: &Path) -> Result<()> {
    let lines = read_order_lines(file)?;
    let store = ctx.open_store()?;

    let applied = store.ingest_order_lines(order_date, source_ref, &lines)?;
    for outcome in &applied {
        match outcome {
            LineOutcome::Received { item_code, lot } => println!(
                "received item_code={} qty={} unit_price={} seq={}",
                item_code, lot.original_qty, lot.unit_price, lot.seq
            ),
            LineOutcome::Corrected { item_code, outcome } => println!(
                "corrected item_code={} consumed={} shortfall={}",
                item_code, outcome.consumed, outcome.shortfall
            ),
        }
    }
    println!("applied={} source_ref={}", applied.len(), source_ref.trim());
    persist(&store)
}

// ---------------------------------------------------------------------------
// count
// ---------------------------------------------------------------------------

pub fn count(
    ctx: &Ctx,
    item: &str,
    qty: f64,
    date: NaiveDate,
    prior_order_date: Option<NaiveDate>,
) -> Result<()> {
    let store = ctx.open_store()?;
    let report = store.submit_count(&CountInput {
        item_code: item.to_string(),
        counted_qty: qty,
        count_date: date,
        prior_order_date_hint: prior_order_date,
    })?;

    println!(
        "item_code={} system_before={} counted={} diff={} system_after={}",
        report.item_code,
        report.system_qty_before,
        report.counted_qty,
        report.diff,
        report.system_qty_after
    );
    for w in &report.warnings {
        println!("warning={} {}", w.code(), w);
    }
    println!("recommendation={}", report.recommendation);
    persist(&store)
}

// ---------------------------------------------------------------------------
// reads
// ---------------------------------------------------------------------------

pub fn show(ctx: &Ctx, item: Option<&str>) -> Result<()> {
    let store = ctx.open_store()?;
    match item {
        Some(code) => {
            let ledger = store
                .get_ledger(code)
                .with_context(|| format!("no ledger for item_code {code}"))?;
            print_json(&ledger)?;
            print_json(&lk_ledger::valuation(&ledger))
        }
        None => {
            for (code, ledger) in store.get_all_ledgers() {
                let v = lk_ledger::valuation(&ledger);
                println!(
                    "item_code={} qty={} lots={} avg_cost={} value={}",
                    code, v.remaining_qty, v.lot_count, v.weighted_avg_cost, v.total_value
                );
            }
            Ok(())
        }
    }
}

pub fn history(ctx: &Ctx, item: &str, last: Option<usize>) -> Result<()> {
    let store = ctx.open_store()?;
    print_json(&store.history(item, last))
}

pub fn report(ctx: &Ctx, top: Option<usize>) -> Result<()> {
    let store = ctx.open_store()?;
    let top = top.unwrap_or(ctx.config.pricecheck.top_n);
    print_json(&store.system_report(top))
}

pub fn verify(ctx: &Ctx) -> Result<()> {
    let store = ctx.open_store()?;
    let checked = store.get_all_ledgers().len();
    let violations = store.verify_all();
    for (code, v) in &violations {
        println!("violation item_code={code} {v}");
    }
    println!("checked={} violations={}", checked, violations.len());
    if !violations.is_empty() {
        bail!("{} ledger(s) failed integrity checks", violations.len());
    }
    Ok(())
}
