use super::{DerivedRecord, Record};
use std::collections::BTreeMap;
use tracing::{info, warn};

const INVOICE_NUMBER_WIDTH: usize = 12;
const YEAR_WIDTH: usize = 4;

/// Compute invoice number, rebate flag and subtotal for every record, in order.
pub fn derive_columns(records: Vec<Record>, year: i32) -> Vec<DerivedRecord> {
    let derived: Vec<DerivedRecord> = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| derive_one(record, year, index))
        .collect();

    let anomalous = derived.iter().filter(|d| d.anomalous).count();
    info!(records = derived.len(), anomalous, year, "Derived invoice columns");
    derived
}

fn derive_one(record: Record, year: i32, index: usize) -> DerivedRecord {
    let invoice_number = invoice_number(year, index);
    let rebate_deposit = rebate_deposit(&record);
    let (subtotal, anomalous) = match subtotal(&record) {
        Some(v) => (v, false),
        None => {
            warn!(
                invoice = %invoice_number,
                name = %record.name,
                "No flat rate, hourly charge or deposit; subtotal defaults to 0"
            );
            (0.0, true)
        }
    };

    DerivedRecord {
        record,
        invoice_number,
        year,
        rebate_deposit,
        subtotal,
        anomalous,
    }
}

/// `YYYY` followed by the zero-padded row index, 12 digits in total.
pub fn invoice_number(year: i32, index: usize) -> String {
    format!(
        "{year:0yw$}{index:0iw$}",
        yw = YEAR_WIDTH,
        iw = INVOICE_NUMBER_WIDTH - YEAR_WIDTH
    )
}

fn rebate_deposit(record: &Record) -> bool {
    record.deposit.is_some() && (record.flat_rate.is_some() || record.has_hourly_charge())
}

/// Flat rate, else hourly rate * hours, else the deposit (a cancellation).
/// `None` when the row carries no charge at all.
fn subtotal(record: &Record) -> Option<f64> {
    record
        .flat_rate
        .or_else(|| record.hourly_total())
        .or(record.deposit)
}

/// Names that appear on more than one record, sorted. Blank names are ignored.
pub fn find_duplicate_names(records: &[DerivedRecord]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for d in records {
        let name = d.record.name.as_str();
        if !name.is_empty() {
            *counts.entry(name).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}
