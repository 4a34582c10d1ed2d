use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use tracing::info;

use crate::error::ConfigError;

const VALID_YEARS: std::ops::RangeInclusive<i32> = 1000..=9999;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub template: PathBuf,
    /// Year used for invoice numbers and printed dates. Defaults to the current year.
    pub year: Option<i32>,
    pub write_summary: bool,
    pub layout: Layout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data.csv"),
            output_dir: PathBuf::from("output"),
            template: PathBuf::from("invoice.pdf"),
            year: None,
            write_summary: true,
            layout: Layout::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

const fn pt(x: f32, y: f32) -> Point {
    Point { x, y }
}

/// Where each piece of text lands on the base template, in PDF points.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Name of one of the standard 14 PDF fonts.
    pub font: String,
    pub font_size: f32,
    pub invoice_number: Point,
    pub booking_date: Point,
    pub name: Point,
    pub email: Point,
    pub phone: Point,
    pub appointment_date: Point,
    pub line_total: Point,
    pub adjustment: Point,
    pub grand_total: Point,
    pub columns: LineColumns,
    pub first_line_y: f32,
    pub line_spacing: f32,
    /// Rate printed next to hourly charges.
    pub hourly_display_rate: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            font: "Helvetica".to_string(),
            font_size: 8.0,
            invoice_number: pt(165.0, 610.0),
            booking_date: pt(165.0, 585.0),
            name: pt(395.0, 610.0),
            email: pt(395.0, 585.0),
            phone: pt(400.0, 560.0),
            appointment_date: pt(160.0, 250.0),
            line_total: pt(430.0, 250.0),
            adjustment: pt(430.0, 225.0),
            grand_total: pt(430.0, 200.0),
            columns: LineColumns::default(),
            first_line_y: 500.0,
            line_spacing: 15.0,
            hourly_display_rate: 180.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LineColumns {
    pub description: f32,
    pub date: f32,
    pub rate: f32,
    pub amount: f32,
}

impl Default for LineColumns {
    fn default() -> Self {
        Self {
            description: 80.0,
            date: 300.0,
            rate: 420.0,
            amount: 470.0,
        }
    }
}

impl LineColumns {
    pub fn xs(&self) -> [f32; 4] {
        [self.description, self.date, self.rate, self.amount]
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Invoice numbers embed the year as exactly four digits.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.year {
            Some(year) if !VALID_YEARS.contains(&year) => Err(ConfigError::InvalidYear(year)),
            _ => Ok(()),
        }
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let cfg = Self::load(path)?;
        info!(path = %path.display(), "Config loaded");
        Ok(cfg)
    }

    pub fn year(&self) -> i32 {
        self.year
            .unwrap_or_else(|| time::OffsetDateTime::now_utc().year())
    }
}
