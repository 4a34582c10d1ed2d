// src/invoice/overlay.rs

use super::{Field, InvoiceWriter, build_line_items};
use crate::config::{Layout, Point};
use crate::error::InvoiceError;
use crate::ledger::DerivedRecord;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resource name the overlay font is registered under on the template page.
const FONT_KEY: &str = "FInvoice";

/// Printed in the adjustment slot of the totals block.
const ADJUSTMENT: &str = "$0.00";

/// Guard against `Parent` cycles in a malformed page tree.
const MAX_TREE_DEPTH: usize = 32;

/// One string drawn at an absolute position on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

impl Placement {
    fn at(point: Point, text: String) -> Self {
        Self {
            x: point.x,
            y: point.y,
            text,
        }
    }
}

/// Overlays invoice text onto page 1 of a base template and saves one PDF per record.
pub struct PdfInvoiceWriter {
    template: Document,
    layout: Layout,
    output_dir: PathBuf,
}

impl PdfInvoiceWriter {
    /// Parse the template at `template_path`. The file is only read here.
    pub fn new(
        template_path: impl AsRef<Path>,
        layout: Layout,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, InvoiceError> {
        let template = Document::load(template_path.as_ref())?;
        Self::from_template(template, layout, output_dir)
    }

    pub fn from_template(
        template: Document,
        layout: Layout,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, InvoiceError> {
        let pages = template.get_pages().len();
        if pages == 0 {
            return Err(InvoiceError::EmptyTemplate);
        }
        info!(pages, font = %layout.font, "Invoice template ready");
        Ok(Self {
            template,
            layout,
            output_dir: output_dir.into(),
        })
    }

    pub fn output_path(&self, entry: &DerivedRecord) -> PathBuf {
        self.output_dir
            .join(format!("INVOICE_{}.pdf", entry.invoice_number))
    }

    /// Every string printed for `entry`: the header block, then the line items.
    pub fn placements(&self, entry: &DerivedRecord) -> Vec<Placement> {
        let l = &self.layout;
        let subtotal = entry.display(Field::Subtotal, true);

        let mut out = vec![
            Placement::at(l.invoice_number, entry.display(Field::InvoiceNumber, false)),
            Placement::at(l.booking_date, entry.dated(Field::BookingDate)),
            Placement::at(l.name, entry.display(Field::Name, false)),
            Placement::at(l.email, entry.display(Field::Email, false)),
            Placement::at(l.phone, entry.display(Field::Phone, false)),
            Placement::at(l.appointment_date, entry.effective_date()),
            Placement::at(l.line_total, subtotal.clone()),
            Placement::at(l.adjustment, ADJUSTMENT.to_string()),
            Placement::at(l.grand_total, subtotal),
        ];

        let xs = l.columns.xs();
        let mut y = l.first_line_y;
        for item in build_line_items(entry, l.hourly_display_rate) {
            for (x, text) in xs.iter().zip(item.columns()) {
                out.push(Placement {
                    x: *x,
                    y,
                    text: text.to_string(),
                });
            }
            y -= l.line_spacing;
        }

        out
    }

    /// Build the invoice for `entry` in memory and return the PDF bytes.
    pub fn render(&self, entry: &DerivedRecord) -> Result<Vec<u8>, InvoiceError> {
        let mut doc = self.template.clone();
        let pages = doc.get_pages();
        let extra: Vec<u32> = pages.keys().copied().filter(|&n| n > 1).collect();
        let page_id = *pages.values().next().ok_or(InvoiceError::EmptyTemplate)?;
        if !extra.is_empty() {
            doc.delete_pages(&extra);
        }

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(self.layout.font.as_bytes().to_vec()),
            "Encoding" => "WinAnsiEncoding",
        });
        register_font(&mut doc, page_id, font_id)?;

        let placements = self.placements(entry);
        let overlay = overlay_content(&placements, self.layout.font_size).encode()?;
        append_content(&mut doc, page_id, overlay)?;

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        debug!(
            invoice = %entry.invoice_number,
            placements = placements.len(),
            bytes = bytes.len(),
            "Rendered invoice"
        );
        Ok(bytes)
    }
}

impl InvoiceWriter for PdfInvoiceWriter {
    fn write_invoice(&self, entry: &DerivedRecord) -> Result<PathBuf, InvoiceError> {
        let bytes = self.render(entry)?;
        let path = self.output_path(entry);

        fs::create_dir_all(&self.output_dir)
            .and_then(|()| fs::write(&path, &bytes))
            .map_err(|source| InvoiceError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }
}

/// Text operators for the overlay. Opens with `Q` to close the `q` that
/// [`append_content`] puts in front of the template's own content.
fn overlay_content(placements: &[Placement], font_size: f32) -> Content {
    let mut operations = vec![
        Operation::new("Q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(FONT_KEY.as_bytes().to_vec()), font_size.into()],
        ),
        Operation::new("g", vec![0.into()]),
    ];

    for p in placements.iter().filter(|p| !p.text.is_empty()) {
        operations.push(Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                p.x.into(),
                p.y.into(),
            ],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(&p.text))],
        ));
    }

    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

/// Characters WinAnsiEncoding places at 0x80..=0x9F. `None` slots are unassigned.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Encode for the standard 14 fonts. Anything WinAnsi cannot show becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match u32::from(c) {
        code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|&high| high == Some(c))
            .map_or(b'?', |i| 0x80 + i as u8),
    }
}

/// Wrap the page's existing content in `q` and append the overlay stream after it.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: Vec<u8>,
) -> Result<(), InvoiceError> {
    let existing: Vec<Object> = match doc.get_object(page_id)?.as_dict()?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(streams) => streams.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(streams)) => streams.clone(),
        _ => Vec::new(),
    };

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(overlay_id));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", contents);
    Ok(())
}

/// Add `font_id` to the page's font resources under [`FONT_KEY`].
fn register_font(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Result<(), InvoiceError> {
    let resources_id = own_resources(doc, page_id)?;
    let fonts = resources_mut(doc, page_id, resources_id)?
        .get(b"Font")
        .ok()
        .cloned();

    match fonts {
        Some(Object::Reference(fonts_id)) => {
            doc.get_object_mut(fonts_id)?
                .as_dict_mut()?
                .set(FONT_KEY, font_id);
        }
        Some(Object::Dictionary(mut fonts)) => {
            fonts.set(FONT_KEY, font_id);
            resources_mut(doc, page_id, resources_id)?.set("Font", fonts);
        }
        _ => {
            let fonts = dictionary! { FONT_KEY => font_id };
            resources_mut(doc, page_id, resources_id)?.set("Font", fonts);
        }
    }
    Ok(())
}

/// Make sure the page carries its own `Resources` entry, copying inherited
/// resources down if needed. Returns the object id when the entry is a reference.
fn own_resources(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<Option<ObjectId>, InvoiceError> {
    match doc.get_object(page_id)?.as_dict()?.get(b"Resources") {
        Ok(Object::Reference(id)) => return Ok(Some(*id)),
        Ok(Object::Dictionary(_)) => return Ok(None),
        _ => {}
    }

    let inherited = inherited_resources(doc, page_id)?;
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", inherited);
    Ok(None)
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, InvoiceError> {
    let mut node = doc.get_object(page_id)?.as_dict()?;
    for _ in 0..MAX_TREE_DEPTH {
        let Ok(parent_id) = node.get(b"Parent").and_then(Object::as_reference) else {
            break;
        };
        node = doc.get_object(parent_id)?.as_dict()?;
        match node.get(b"Resources") {
            Ok(Object::Reference(id)) => return Ok(doc.get_object(*id)?.as_dict()?.clone()),
            Ok(Object::Dictionary(resources)) => return Ok(resources.clone()),
            _ => {}
        }
    }
    Ok(Dictionary::new())
}

fn resources_mut(
    doc: &mut Document,
    page_id: ObjectId,
    resources_id: Option<ObjectId>,
) -> Result<&mut Dictionary, InvoiceError> {
    let resources = match resources_id {
        Some(id) => doc.get_object_mut(id)?,
        None => doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?,
    };
    Ok(resources.as_dict_mut()?)
}

#[cfg(test)]
/// A one-page letter-size document with a line of template text and
/// resources inherited from the page tree.
pub(crate) fn sample_template() -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal("INVOICE")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Record, derive_columns};

    fn writer(output_dir: impl Into<PathBuf>) -> PdfInvoiceWriter {
        PdfInvoiceWriter::from_template(sample_template(), Layout::default(), output_dir).unwrap()
    }

    fn sample_entry() -> DerivedRecord {
        let record = Record {
            booking_date: Some("Mar 1".into()),
            appointment_date: Some("Mar 14".into()),
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "555-0101".into(),
            description: Some("rose".into()),
            deposit: Some(50.0),
            flat_rate: Some(200.0),
            ..Default::default()
        };
        derive_columns(vec![record], 2022).remove(0)
    }

    /// Strings shown with `Tj` on the single page of `pdf`.
    fn shown_text(pdf: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(pdf).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands.first())
            .filter_map(|o| o.as_str().ok())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    #[test]
    fn test_header_placements() {
        let w = writer("out");
        let placements = w.placements(&sample_entry());
        let at = |x: f32, y: f32| {
            placements
                .iter()
                .find(|p| p.x == x && p.y == y)
                .map(|p| p.text.as_str())
        };

        assert_eq!(at(165.0, 610.0), Some("202200000000"));
        assert_eq!(at(165.0, 585.0), Some("Mar 1 2022"));
        assert_eq!(at(395.0, 610.0), Some("Ada Lovelace"));
        assert_eq!(at(395.0, 585.0), Some("ada@example.com"));
        assert_eq!(at(400.0, 560.0), Some("555-0101"));
        assert_eq!(at(160.0, 250.0), Some("Mar 14 2022"));
        assert_eq!(at(430.0, 250.0), Some("$200.00"));
        assert_eq!(at(430.0, 225.0), Some("$0.00"));
        assert_eq!(at(430.0, 200.0), Some("$200.00"));
    }

    #[test]
    fn test_line_items_step_down_the_page() {
        let w = writer("out");
        let placements = w.placements(&sample_entry());
        let descriptions: Vec<(f32, &str)> = placements
            .iter()
            .filter(|p| p.x == 80.0)
            .map(|p| (p.y, p.text.as_str()))
            .collect();

        assert_eq!(
            descriptions,
            vec![
                (500.0, "Deposit for rose tattoo."),
                (485.0, "Deposit credit for rose tattoo."),
                (470.0, "Flat charge for rose tattoo."),
            ]
        );
        let amounts: Vec<&str> = placements
            .iter()
            .filter(|p| p.x == 470.0)
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(amounts, ["$50.00", "-$50.00", "$200.00"]);
    }

    #[test]
    fn test_render_overlays_template() {
        let w = writer("out");
        let pdf = w.render(&sample_entry()).unwrap();
        let text = shown_text(&pdf);

        assert_eq!(text.first().map(String::as_str), Some("INVOICE"));
        for expected in [
            "202200000000",
            "Ada Lovelace",
            "Deposit credit for rose tattoo.",
            "-$50.00",
            "$200.00",
        ] {
            assert!(text.iter().any(|t| t == expected), "missing {expected}: {text:?}");
        }
    }

    #[test]
    fn test_render_registers_font_with_inherited_resources() {
        let w = writer("out");
        let pdf = w.render(&sample_entry()).unwrap();

        let doc = Document::load_mem(&pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = doc
            .dereference(page.get(b"Resources").unwrap())
            .unwrap()
            .1
            .as_dict()
            .unwrap();
        let fonts = doc
            .dereference(resources.get(b"Font").unwrap())
            .unwrap()
            .1
            .as_dict()
            .unwrap();

        assert!(fonts.has(b"F1"));
        assert!(fonts.has(FONT_KEY.as_bytes()));
    }

    #[test]
    fn test_template_is_not_mutated_between_renders() {
        let w = writer("out");
        let first = shown_text(&w.render(&sample_entry()).unwrap());
        let second = shown_text(&w.render(&sample_entry()).unwrap());
        assert_eq!(first, second);
        assert_eq!(first.iter().filter(|t| *t == "INVOICE").count(), 1);
    }

    #[test]
    fn test_write_invoice_names_file_by_number() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let w = writer(&out);

        let path = w.write_invoice(&sample_entry()).unwrap();
        assert_eq!(path, out.join("INVOICE_202200000000.pdf"));
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("output");
        fs::write(&blocker, "not a directory").unwrap();

        let result = writer(&blocker).write_invoice(&sample_entry());
        assert!(matches!(result, Err(InvoiceError::Write { .. })));
    }

    #[test]
    fn test_empty_template_is_rejected() {
        let result =
            PdfInvoiceWriter::from_template(Document::with_version("1.5"), Layout::default(), "out");
        assert!(matches!(result, Err(InvoiceError::EmptyTemplate)));
    }

    #[test]
    fn test_win_ansi_replaces_wide_chars() {
        assert_eq!(win_ansi("Zoë"), b"Zo\xeb".to_vec());
        assert_eq!(win_ansi("龍"), b"?".to_vec());
    }

    #[test]
    fn test_win_ansi_maps_punctuation_block() {
        assert_eq!(
            win_ansi("O\u{2019}Brien \u{2013} \u{20AC}5 \u{201C}ok\u{201D}"),
            b"O\x92Brien \x96 \x805 \x93ok\x94".to_vec()
        );
        assert_eq!(win_ansi("\u{0092}\u{0080}\t"), b"???".to_vec());
    }

    #[test]
    fn test_render_keeps_only_first_page() {
        let mut template = sample_template();
        let pages_id = template
            .catalog()
            .unwrap()
            .get(b"Pages")
            .unwrap()
            .as_reference()
            .unwrap();
        let second = template.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        let pages = template.get_object_mut(pages_id).unwrap().as_dict_mut().unwrap();
        pages.get_mut(b"Kids").unwrap().as_array_mut().unwrap().push(second.into());
        pages.set("Count", 2);
        assert_eq!(template.get_pages().len(), 2);

        let w = PdfInvoiceWriter::from_template(template, Layout::default(), "out").unwrap();
        let text = shown_text(&w.render(&sample_entry()).unwrap());
        assert_eq!(text.first().map(String::as_str), Some("INVOICE"));
        assert!(text.iter().any(|t| t == "Ada Lovelace"));
        assert_eq!(w.template.get_pages().len(), 2);
    }
}
