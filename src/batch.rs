// src/batch.rs

use crate::config::Config;
use crate::error::BatchError;
use crate::invoice::{InvoiceWriter, PdfInvoiceWriter};
use crate::ledger::{self, DerivedRecord};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What happened to one batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub records: usize,
    pub rendered: usize,
    /// Ledger rows the CSV reader could not decode.
    pub skipped_rows: usize,
    /// Sum of every record's subtotal, including records whose file failed to write.
    pub grand_total: f64,
    /// Invoice numbers of records with no recognized charge.
    pub anomalous: Vec<String>,
    pub failed: Vec<FailedInvoice>,
    pub duplicate_names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FailedInvoice {
    pub invoice_number: String,
    pub error: String,
}

/// Write one invoice per record, in order. A failure on one record is logged
/// and recorded; the rest of the batch still runs.
pub fn run(records: &[DerivedRecord], writer: &impl InvoiceWriter) -> BatchSummary {
    let mut summary = BatchSummary {
        records: records.len(),
        ..Default::default()
    };

    for entry in records {
        let span = tracing::info_span!("invoice", number = %entry.invoice_number);
        let _guard = span.enter();

        summary.grand_total += entry.subtotal;
        if entry.anomalous {
            summary.anomalous.push(entry.invoice_number.clone());
        }

        let (filled, total) = entry.record.coverage();
        debug!(filled, total, name = %entry.record.name, "Field coverage");

        match writer.write_invoice(entry) {
            Ok(path) => {
                summary.rendered += 1;
                info!(
                    path = %path.display(),
                    subtotal = entry.subtotal,
                    rebate = entry.rebate_deposit,
                    "Invoice written"
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to write invoice");
                summary.failed.push(FailedInvoice {
                    invoice_number: entry.invoice_number.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary
}

/// Load the ledger, derive its columns and write every invoice.
///
/// Returns the derived records together with the batch summary. Once the
/// ledger and template are loaded the batch always completes; a summary file
/// that cannot be written is only logged.
pub fn process(cfg: &Config) -> Result<(Vec<DerivedRecord>, BatchSummary), BatchError> {
    info!(input = %cfg.input.display(), "Processing ledger");
    let ledger = ledger::load(&cfg.input)?;
    let records = ledger::derive_columns(ledger.records, cfg.year());

    let duplicate_names = ledger::find_duplicate_names(&records);
    if !duplicate_names.is_empty() {
        warn!(names = ?duplicate_names, "Names appear on more than one booking");
    }

    let writer = PdfInvoiceWriter::new(&cfg.template, cfg.layout.clone(), &cfg.output_dir)
        .map_err(|source| BatchError::Template {
            path: cfg.template.clone(),
            source,
        })?;

    info!(records = records.len(), output_dir = %cfg.output_dir.display(), "Creating PDFs");
    let mut summary = run(&records, &writer);
    summary.skipped_rows = ledger.skipped;
    summary.duplicate_names = duplicate_names;

    if cfg.write_summary {
        match write_summary(&cfg.output_dir, &summary) {
            Ok(path) => info!(path = %path.display(), "Batch summary written"),
            Err(e) => error!(error = %e, "Failed to write batch summary"),
        }
    }

    info!(
        records = summary.records,
        rendered = summary.rendered,
        failed = summary.failed.len(),
        anomalous = summary.anomalous.len(),
        skipped_rows = summary.skipped_rows,
        grand_total = summary.grand_total,
        "Batch complete"
    );
    Ok((records, summary))
}

fn write_summary(output_dir: &Path, summary: &BatchSummary) -> Result<PathBuf, BatchError> {
    let path = output_dir.join("summary.json");
    fs::create_dir_all(output_dir)
        .and_then(|()| serde_json::to_string_pretty(summary).map_err(std::io::Error::from))
        .and_then(|json| fs::write(&path, json))
        .map_err(|source| BatchError::Summary {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}
