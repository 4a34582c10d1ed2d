use std::path::PathBuf;
use thiserror::Error;

/// The ledger could not be read at all. Fatal for the batch.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to open ledger {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("Failed to read ledger header in {path}: {source}")]
    Header { path: PathBuf, source: csv::Error },

    #[error("Ledger {path} is missing required columns: {}", .missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },
}

/// A single invoice could not be produced. Only that record is affected.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("PDF error: {0}")]
    Render(#[from] lopdf::Error),

    #[error("Failed to serialize PDF: {0}")]
    Serialize(#[from] std::io::Error),

    #[error("Template has no pages")]
    EmptyTemplate,

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid year {0} in config: expected four digits")]
    InvalidYear(i32),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to load template {path}: {source}")]
    Template {
        path: PathBuf,
        source: InvoiceError,
    },

    #[error("Failed to write batch summary {path}: {source}")]
    Summary {
        path: PathBuf,
        source: std::io::Error,
    },
}
