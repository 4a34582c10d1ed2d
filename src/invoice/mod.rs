// src/invoice/mod.rs

mod overlay;

pub use overlay::PdfInvoiceWriter;
#[cfg(test)]
pub(crate) use overlay::sample_template;

use crate::error::InvoiceError;
use crate::ledger::DerivedRecord;
use std::path::PathBuf;

/// Anything that can turn one derived ledger row into a persisted invoice.
pub trait InvoiceWriter {
    /// Produce the invoice for `entry` and return where it was written.
    fn write_invoice(&self, entry: &DerivedRecord) -> Result<PathBuf, InvoiceError>;
}

/// Columns of a ledger row that can be printed on an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    InvoiceNumber,
    BookingDate,
    AppointmentDate,
    Name,
    Email,
    Phone,
    Description,
    Deposit,
    FlatRate,
    Hours,
    Subtotal,
}

enum Value<'a> {
    Text(Option<&'a str>),
    Number(Option<f64>),
}

/// One itemized row: what, when, at what rate, for how much.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub description: String,
    pub date: String,
    pub rate: String,
    pub amount: String,
}

impl LineItem {
    pub fn columns(&self) -> [&str; 4] {
        [
            self.description.as_str(),
            self.date.as_str(),
            self.rate.as_str(),
            self.amount.as_str(),
        ]
    }
}

pub fn currency(value: f64) -> String {
    format!("${value:.2}")
}

impl DerivedRecord {
    fn value(&self, field: Field) -> Value<'_> {
        let r = &self.record;
        match field {
            Field::InvoiceNumber => Value::Text(Some(self.invoice_number.as_str())),
            Field::BookingDate => Value::Text(r.booking_date.as_deref()),
            Field::AppointmentDate => Value::Text(r.appointment_date.as_deref()),
            Field::Name => Value::Text(Some(r.name.as_str())),
            Field::Email => Value::Text(Some(r.email.as_str())),
            Field::Phone => Value::Text(Some(r.phone.as_str())),
            Field::Description => Value::Text(r.description.as_deref()),
            Field::Deposit => Value::Number(r.deposit),
            Field::FlatRate => Value::Number(r.flat_rate),
            Field::Hours => Value::Number(r.hours),
            Field::Subtotal => Value::Number(Some(self.subtotal)),
        }
    }

    /// Printable form of `field`. Missing values print as nothing, never `0`.
    ///
    /// `as_currency` only affects numeric fields.
    pub fn display(&self, field: Field, as_currency: bool) -> String {
        match self.value(field) {
            Value::Text(text) => text.unwrap_or_default().to_string(),
            Value::Number(Some(v)) if as_currency => currency(v),
            Value::Number(Some(v)) => v.to_string(),
            Value::Number(None) => String::new(),
        }
    }

    /// "rose tattoo", or just "tattoo" when there is no description.
    pub fn describe_service(&self) -> String {
        let desc = self.display(Field::Description, false);
        if desc.is_empty() {
            "tattoo".to_string()
        } else {
            format!("{desc} tattoo")
        }
    }

    /// A date column with the year appended, or empty when the date is missing.
    pub fn dated(&self, field: Field) -> String {
        let date = self.display(field, false);
        if date.is_empty() {
            date
        } else {
            format!("{date} {}", self.year)
        }
    }

    /// Appointment date when known, otherwise the booking date.
    pub fn effective_date(&self) -> String {
        let appointment = self.dated(Field::AppointmentDate);
        if appointment.is_empty() {
            self.dated(Field::BookingDate)
        } else {
            appointment
        }
    }
}

/// Itemized lines for one invoice, in print order: deposit, deposit credit,
/// flat charge, hourly charge. Each is only present when it applies.
pub fn build_line_items(entry: &DerivedRecord, hourly_display_rate: f64) -> Vec<LineItem> {
    let r = &entry.record;
    let service = entry.describe_service();
    let mut items = Vec::with_capacity(4);

    if r.deposit.is_some() {
        items.push(LineItem {
            description: format!("Deposit for {service}."),
            date: entry.dated(Field::BookingDate),
            rate: String::new(),
            amount: entry.display(Field::Deposit, true),
        });
    }

    if entry.rebate_deposit {
        items.push(LineItem {
            description: format!("Deposit credit for {service}."),
            date: entry.effective_date(),
            rate: String::new(),
            amount: format!("-{}", entry.display(Field::Deposit, true)),
        });
    }

    if r.flat_rate.is_some() {
        items.push(LineItem {
            description: format!("Flat charge for {service}."),
            date: entry.effective_date(),
            rate: String::new(),
            amount: entry.display(Field::FlatRate, true),
        });
    }

    if r.hours.is_some() && r.flat_rate.is_none() {
        items.push(LineItem {
            description: format!(
                "Hourly charge for {service} @{} hours.",
                entry.display(Field::Hours, false)
            ),
            date: entry.effective_date(),
            rate: currency(hourly_display_rate),
            amount: r.hourly_total().map(currency).unwrap_or_default(),
        });
    }

    items
}
