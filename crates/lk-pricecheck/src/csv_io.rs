//! Reference-price import and discrepancy export.
//!
//! ## Reference CSV columns (header required, order-independent)
//!
//! | Column       | Example      | Notes                       |
//! |--------------|--------------|-----------------------------|
//! | `item_code`  | `BEEF-BRSK`  | non-empty                   |
//! | `source_ref` | `INV-20931`  | non-empty                   |
//! | `date`       | `2024-03-02` | ISO-8601 calendar date      |
//! | `unit_price` | `57.38`      | decimal dollars, finite     |
//! | `quantity`   | `30`         | decimal units, finite       |
//!
//! The whole file is rejected on the first bad row.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lk_ledger::{Micros, Qty};

use crate::types::{DiscrepancyRecord, ReferencePrice};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ReferenceCsvError {
    Io(String),
    /// Structural CSV problem (bad quoting, missing column, wrong arity).
    Csv { row: usize, message: String },
    /// A field decoded but failed validation.
    InvalidField {
        row: usize,
        field: &'static str,
        raw: String,
    },
}

impl fmt::Display for ReferenceCsvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceCsvError::Io(msg) => write!(f, "csv io error: {msg}"),
            ReferenceCsvError::Csv { row, message } => write!(f, "csv row {row}: {message}"),
            ReferenceCsvError::InvalidField { row, field, raw } => {
                write!(f, "csv row {row}: invalid '{field}' value '{raw}'")
            }
        }
    }
}

impl std::error::Error for ReferenceCsvError {}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    item_code: String,
    source_ref: String,
    date: String,
    unit_price: String,
    quantity: String,
}

fn convert_row(row: usize, r: ReferenceRow) -> Result<ReferencePrice, ReferenceCsvError> {
    let item_code = r.item_code.trim().to_string();
    if item_code.is_empty() {
        return Err(ReferenceCsvError::InvalidField {
            row,
            field: "item_code",
            raw: r.item_code,
        });
    }
    let source_ref = r.source_ref.trim().to_string();
    if source_ref.is_empty() {
        return Err(ReferenceCsvError::InvalidField {
            row,
            field: "source_ref",
            raw: r.source_ref,
        });
    }
    let date = NaiveDate::parse_from_str(r.date.trim(), "%Y-%m-%d").map_err(|_| {
        ReferenceCsvError::InvalidField {
            row,
            field: "date",
            raw: r.date.clone(),
        }
    })?;
    let unit_price = r
        .unit_price
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(Micros::from_dollars)
        .ok_or_else(|| ReferenceCsvError::InvalidField {
            row,
            field: "unit_price",
            raw: r.unit_price.clone(),
        })?;
    let quantity = r
        .quantity
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(Qty::from_units)
        .ok_or_else(|| ReferenceCsvError::InvalidField {
            row,
            field: "quantity",
            raw: r.quantity.clone(),
        })?;

    Ok(ReferencePrice {
        item_code,
        source_ref,
        date,
        unit_price,
        quantity,
    })
}

/// Parse reference records from any reader. Row numbers in errors are
/// 1-based with the header as row 1.
///
/// Non-positive prices are accepted here; the engine reports such lots as
/// unvalidated.
pub fn parse_reference_csv<R: Read>(reader: R) -> Result<Vec<ReferencePrice>, ReferenceCsvError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<ReferenceRow>().enumerate() {
        let row = i + 2;
        let raw = rec.map_err(|e| ReferenceCsvError::Csv {
            row,
            message: e.to_string(),
        })?;
        out.push(convert_row(row, raw)?);
    }
    Ok(out)
}

pub fn parse_reference_csv_file(path: &Path) -> Result<Vec<ReferencePrice>, ReferenceCsvError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ReferenceCsvError::Io(format!("open '{}': {e}", path.display())))?;
    parse_reference_csv(file)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DiscrepancyRow<'a> {
    item_code: &'a str,
    description: &'a str,
    severity: &'static str,
    percent_variance: String,
    lot_price: String,
    reference_price: String,
    absolute_diff: String,
    lot_date: NaiveDate,
    lot_source_ref: &'a str,
    reference_source_ref: &'a str,
    reference_date: NaiveDate,
    match_kind: &'static str,
}

/// Write discrepancies in the order given (the report order).
pub fn write_discrepancies_csv<W: Write>(
    writer: W,
    records: &[DiscrepancyRecord],
) -> Result<(), ReferenceCsvError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (i, d) in records.iter().enumerate() {
        wtr.serialize(DiscrepancyRow {
            item_code: &d.item_code,
            description: &d.description,
            severity: d.severity.as_str(),
            percent_variance: format!("{:.2}", d.percent_variance),
            lot_price: d.lot_price.to_string(),
            reference_price: d.reference_price.to_string(),
            absolute_diff: d.absolute_diff.to_string(),
            lot_date: d.lot_date,
            lot_source_ref: &d.lot_source_ref,
            reference_source_ref: &d.reference_source_ref,
            reference_date: d.reference_date,
            match_kind: d.match_kind.as_str(),
        })
        .map_err(|e| ReferenceCsvError::Csv {
            row: i + 2,
            message: e.to_string(),
        })?;
    }
    wtr.flush()
        .map_err(|e| ReferenceCsvError::Io(format!("flush: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchKind, Severity};

    const GOOD: &str = "\
item_code,source_ref,date,unit_price,quantity
BEEF-BRSK,INV-1,2024-03-02,57.38,30
 LIME-CS , INV-2 ,2024-03-04,5.88,3
";

    #[test]
    fn parses_and_trims() {
        let refs = parse_reference_csv(GOOD.as_bytes()).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].unit_price, Micros::new(57_380_000));
        assert_eq!(refs[0].quantity, Qty::units(30));
        assert_eq!(refs[1].item_code, "LIME-CS");
        assert_eq!(refs[1].source_ref, "INV-2");
    }

    #[test]
    fn column_order_does_not_matter() {
        let src = "date,quantity,unit_price,source_ref,item_code\n2024-01-01,1,2.5,R1,X\n";
        let refs = parse_reference_csv(src.as_bytes()).unwrap();
        assert_eq!(refs[0].unit_price, Micros::new(2_500_000));
    }

    #[test]
    fn bad_date_reports_row() {
        let src = "item_code,source_ref,date,unit_price,quantity\nX,R1,2024-01-01,1,1\nX,R2,01/02/2024,1,1\n";
        match parse_reference_csv(src.as_bytes()) {
            Err(ReferenceCsvError::InvalidField { row, field, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(field, "date");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_finite_price_rejected() {
        let src = "item_code,source_ref,date,unit_price,quantity\nX,R1,2024-01-01,NaN,1\n";
        assert!(matches!(
            parse_reference_csv(src.as_bytes()),
            Err(ReferenceCsvError::InvalidField {
                field: "unit_price",
                ..
            })
        ));
    }

    #[test]
    fn missing_column_is_structural() {
        let src = "item_code,source_ref,date,unit_price\nX,R1,2024-01-01,1\n";
        assert!(matches!(
            parse_reference_csv(src.as_bytes()),
            Err(ReferenceCsvError::Csv { row: 2, .. })
        ));
    }

    #[test]
    fn export_has_header_and_rows() {
        let rec = DiscrepancyRecord {
            item_code: "BEEF-BRSK".into(),
            description: "Brisket".into(),
            lot_price: Micros::dollars(60),
            reference_price: Micros::new(57_380_000),
            absolute_diff: Micros::new(2_620_000),
            percent_variance: 4.566,
            severity: Severity::Medium,
            lot_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            lot_source_ref: "INV-1".into(),
            reference_source_ref: "INV-1".into(),
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            match_kind: MatchKind::SourceRef,
        };
        let mut buf = Vec::new();
        write_discrepancies_csv(&mut buf, &[rec]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("item_code,description,severity"));
        assert_eq!(
            lines.next().unwrap(),
            "BEEF-BRSK,Brisket,medium,4.57,60.000000,57.380000,2.620000,2024-03-02,INV-1,INV-1,2024-03-02,source_ref"
        );
    }
}
