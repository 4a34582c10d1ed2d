// src/ledger/mod.rs

mod derive;
mod reader;

pub use derive::{derive_columns, find_duplicate_names};
pub use reader::load;

/// One booking row from the ledger. Blank cells are `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub booking_date: Option<String>,
    pub appointment_date: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub description: Option<String>,
    pub deposit: Option<f64>,
    pub flat_rate: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub hours: Option<f64>,
}

impl Record {
    /// How many optional fields are filled in (out of the optional ones).
    pub fn coverage(&self) -> (usize, usize) {
        let total = 7;
        let filled = [
            self.booking_date.is_some(),
            self.appointment_date.is_some(),
            self.description.is_some(),
            self.deposit.is_some(),
            self.flat_rate.is_some(),
            self.hourly_rate.is_some(),
            self.hours.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }

    pub fn has_hourly_charge(&self) -> bool {
        self.hourly_rate.is_some() && self.hours.is_some()
    }

    /// `hourly_rate * hours`, when both are known.
    pub fn hourly_total(&self) -> Option<f64> {
        Some(self.hourly_rate? * self.hours?)
    }
}

/// A record plus the columns computed for it at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub record: Record,
    pub invoice_number: String,
    /// Year appended to printed dates; also the invoice number prefix.
    pub year: i32,
    /// The deposit is credited back because a flat or hourly charge covers the full amount.
    pub rebate_deposit: bool,
    pub subtotal: f64,
    /// No flat, hourly or deposit amount was found; the subtotal is a placeholder zero.
    pub anomalous: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_counts_optional_fields() {
        let record = Record {
            name: "Ada".into(),
            booking_date: Some("Mar 3".into()),
            deposit: Some(0.0),
            hours: Some(2.0),
            ..Default::default()
        };
        assert_eq!(record.coverage(), (3, 7));
        assert_eq!(Record::default().coverage(), (0, 7));
    }

    #[test]
    fn test_hourly_total_needs_both_fields() {
        let mut record = Record {
            hours: Some(3.0),
            ..Default::default()
        };
        assert_eq!(record.hourly_total(), None);
        assert!(!record.has_hourly_charge());

        record.hourly_rate = Some(180.0);
        assert_eq!(record.hourly_total(), Some(540.0));
        assert!(record.has_hourly_charge());
    }
}
