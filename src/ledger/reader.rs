use super::Record;
use crate::error::LoadError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

/// Columns the ledger header must contain, after normalisation.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "booking_date",
    "appointment_date",
    "name",
    "email",
    "phone",
    "description",
    "deposit",
    "flat_rate",
    "hourly_rate",
    "hours",
];

// Optional "$", digits (commas only between groups of three), optional decimals.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?\s*((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d*)?|\.\d+)$").unwrap()
});

/// The rows that could be read, in file order.
#[derive(Debug, Default)]
pub struct Ledger {
    pub records: Vec<Record>,
    /// Rows dropped because the CSV reader could not decode them.
    pub skipped: usize,
}

/// A ledger row exactly as the CSV reader hands it over.
#[derive(Debug, Deserialize)]
struct RawRow {
    booking_date: Option<String>,
    appointment_date: Option<String>,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    description: Option<String>,
    deposit: Option<String>,
    flat_rate: Option<String>,
    hourly_rate: Option<String>,
    hours: Option<String>,
}

impl RawRow {
    fn into_record(self, row: usize) -> Record {
        Record {
            booking_date: non_blank(self.booking_date),
            appointment_date: non_blank(self.appointment_date),
            name: non_blank(self.name).unwrap_or_default(),
            email: non_blank(self.email).unwrap_or_default(),
            phone: non_blank(self.phone).unwrap_or_default(),
            description: non_blank(self.description),
            deposit: parse_amount(row, "deposit", self.deposit.as_deref()),
            flat_rate: parse_amount(row, "flat_rate", self.flat_rate.as_deref()),
            hourly_rate: parse_amount(row, "hourly_rate", self.hourly_rate.as_deref()),
            hours: parse_amount(row, "hours", self.hours.as_deref()),
        }
    }
}

/// Read the ledger CSV at `path`.
///
/// Headers are matched case-insensitively, with spaces and dashes treated as
/// underscores, so `Flat Rate` satisfies `flat_rate`. Extra columns are ignored.
/// Short rows read their missing trailing cells as blank.
pub fn load(path: impl AsRef<Path>) -> Result<Ledger, LoadError> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let headers: csv::StringRecord = rdr
        .headers()
        .map_err(|source| LoadError::Header {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(normalize_header)
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&col| !headers.iter().any(|h| h == col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        });
    }
    rdr.set_headers(headers);

    let mut ledger = Ledger::default();
    for (idx, row) in rdr.deserialize::<RawRow>().enumerate() {
        let row_no = idx + 1;
        match row {
            Ok(raw) => ledger.records.push(raw.into_record(row_no)),
            Err(e) => {
                warn!(row = row_no, error = %e, "Skipping unreadable ledger row");
                ledger.skipped += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        rows = ledger.records.len(),
        skipped = ledger.skipped,
        "Ledger loaded"
    );
    Ok(ledger)
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace([' ', '-'], "_")
}

fn non_blank(cell: Option<String>) -> Option<String> {
    cell.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Coerce a money/quantity cell. Anything that is not a plain non-negative
/// number is treated as blank.
fn parse_amount(row: usize, column: &str, cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }

    let parsed = AMOUNT_RE
        .captures(cell)
        .and_then(|c| c[1].replace(',', "").parse::<f64>().ok())
        .filter(|v| v.is_finite());

    if parsed.is_none() {
        warn!(row, column, value = cell, "Unreadable amount, treating as blank");
    }
    parsed
}
