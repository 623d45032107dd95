//! Turning a document into something to look at: a terminal preview, or a
//! Typst source that the `typst` compiler prints to PDF.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Datelike, Local, NaiveDate};
use comfy_table::{Attribute, Cell, CellAlignment, Table};
use serde::Serialize;
use slug::slugify;
use tera::{Context, Tera};
use tracing::{debug, info};

use crate::compute::{Totals, format_money, line_total};
use crate::error::RenderError;
use crate::media::DataUrl;
use crate::model::{DocumentType, InvoiceData};

// Embedded so a fresh install can write it out on first export
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/invoice.typ.tera");
const TEMPLATE_NAME: &str = "invoice.typ.tera";

/// Quotes `text` as a Typst string literal, so user input is never read as markup.
pub fn typst_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Serialize)]
struct PartyContext {
    name: String,
    owner_name: String,
    address: String,
    email: String,
    website: String,
    phone: String,
}

#[derive(Serialize)]
struct ItemContext {
    description: String,
    quantity: String,
    unit_price: String,
    line_total: String,
}

#[derive(Serialize)]
struct DocumentContext {
    document_type: String,
    is_invoice: bool,
    document_number: String,
    date: String,
    due_date: String,
    company: PartyContext,
    client: PartyContext,
    items: Vec<ItemContext>,
    subtotal: String,
    total: String,
    terms: String,
    notes: Option<String>,
    logo_file: Option<String>,
    signature_file: Option<String>,
}

/// Image files written next to the Typst source, by file name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmbeddedImages {
    pub logo: Option<String>,
    pub signature: Option<String>,
}

impl DocumentContext {
    fn build(doc: &InvoiceData, images: &EmbeddedImages) -> Self {
        let symbol = doc.currency_symbol.as_str();
        let totals = Totals::of(doc);
        let company = &doc.company;
        let client = &doc.client;
        Self {
            document_type: typst_str(doc.document_type.as_str()),
            is_invoice: doc.document_type == DocumentType::Invoice,
            document_number: typst_str(&doc.document_number),
            date: typst_str(&doc.date),
            due_date: typst_str(&doc.due_date),
            company: PartyContext {
                name: typst_str(&company.name),
                owner_name: typst_str(&company.owner_name),
                address: typst_str(&company.address),
                email: typst_str(&company.email),
                website: typst_str(&company.website),
                phone: typst_str(""),
            },
            client: PartyContext {
                name: typst_str(&client.name),
                owner_name: typst_str(""),
                address: typst_str(&client.address),
                email: typst_str(&client.email),
                website: typst_str(""),
                phone: typst_str(&client.phone),
            },
            items: doc
                .items
                .iter()
                .map(|item| ItemContext {
                    description: typst_str(&item.description),
                    quantity: typst_str(&item.quantity.to_string()),
                    unit_price: typst_str(&format_money(symbol, item.unit_price)),
                    line_total: typst_str(&format_money(symbol, line_total(item))),
                })
                .collect(),
            subtotal: typst_str(&format_money(symbol, totals.subtotal)),
            total: typst_str(&format_money(symbol, totals.total)),
            terms: typst_str(&doc.terms),
            notes: (!doc.notes.is_empty()).then(|| typst_str(&doc.notes)),
            logo_file: images.logo.as_deref().map(typst_str),
            signature_file: images.signature.as_deref().map(typst_str),
        }
    }
}

pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Uses the template compiled into the binary.
    pub fn builtin() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)?;
        Ok(Self { tera })
    }

    /// Loads templates from `dir`, seeding it with the built-in one first.
    pub fn from_dir(dir: &Path) -> Result<Self, RenderError> {
        fs::create_dir_all(dir)?;
        let template_path = dir.join(TEMPLATE_NAME);
        if !template_path.exists() {
            info!("Initializing default template at {}", template_path.display());
            fs::write(&template_path, DEFAULT_TEMPLATE)?;
        }
        let glob = dir.join("*.tera");
        let tera = Tera::new(&glob.to_string_lossy())?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        doc: &InvoiceData,
        images: &EmbeddedImages,
    ) -> Result<String, RenderError> {
        let context = Context::from_serialize(DocumentContext::build(doc, images))?;
        Ok(self.tera.render(TEMPLATE_NAME, &context)?)
    }
}

/// Paths produced by [`write_sources`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypstSources {
    pub typ_path: PathBuf,
    pub pdf_path: PathBuf,
}

/// `<number>_<client>` in slug form, shared by every file of one export.
pub fn file_stem(doc: &InvoiceData) -> String {
    format!("{}_{}", slugify(&doc.document_number), slugify(&doc.client.name))
}

/// Year folder for a document, from its date field when that parses.
pub fn document_year(doc: &InvoiceData) -> i32 {
    NaiveDate::parse_from_str(&doc.date, "%Y-%m-%d")
        .map(|date| date.year())
        .unwrap_or_else(|_| Local::now().year())
}

/// Writes the Typst source and any embedded images into `<output_root>/<year>/`.
pub fn write_sources(
    doc: &InvoiceData,
    renderer: &Renderer,
    output_root: &Path,
) -> Result<TypstSources, RenderError> {
    let output_dir = output_root.join(document_year(doc).to_string());
    fs::create_dir_all(&output_dir)?;
    let stem = file_stem(doc);

    let mut images = EmbeddedImages::default();
    if let Some(url) = doc.company.logo() {
        images.logo = Some(write_image(&output_dir, &stem, "logo", url)?);
    }
    if let Some(url) = doc.company.signature() {
        images.signature = Some(write_image(&output_dir, &stem, "signature", url)?);
    }

    let rendered = renderer.render(doc, &images)?;
    let typ_path = output_dir.join(format!("{}.typ", stem));
    fs::write(&typ_path, rendered)?;
    debug!(path = %typ_path.display(), "typst source written");

    Ok(TypstSources {
        pdf_path: typ_path.with_extension("pdf"),
        typ_path,
    })
}

fn write_image(dir: &Path, stem: &str, role: &str, url: &str) -> Result<String, RenderError> {
    let data = DataUrl::parse(url)?;
    let name = format!("{}-{}.{}", stem, role, data.extension());
    fs::write(dir.join(&name), &data.bytes)?;
    Ok(name)
}

/// Hands the source to `typst compile`.
pub fn compile(sources: &TypstSources) -> Result<(), RenderError> {
    if Command::new("typst").arg("--version").output().is_err() {
        return Err(RenderError::TypstMissing);
    }
    let output = Command::new("typst")
        .arg("compile")
        .arg(&sources.typ_path)
        .arg(&sources.pdf_path)
        .output()?;
    if !output.status.success() {
        return Err(RenderError::Compile(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

/// Plain-text preview for the terminal.
pub fn preview(doc: &InvoiceData) -> String {
    let symbol = doc.currency_symbol.as_str();
    let totals = Totals::of(doc);
    let company = &doc.company;
    let client = &doc.client;

    let mut parties = Table::new();
    parties.set_header(vec![Cell::new("From"), Cell::new("To")]);
    parties.add_row(vec![
        Cell::new(format!(
            "{}\n{}\n{}\n{}\n{}",
            company.name, company.owner_name, company.address, company.email, company.website
        )),
        Cell::new(format!(
            "{}\n{}\n{}\n{}",
            client.name, client.address, client.email, client.phone
        )),
    ]);

    let mut items = Table::new();
    items.set_header(vec![
        Cell::new("Description"),
        Cell::new("Qty"),
        Cell::new("Unit Price"),
        Cell::new("Total"),
    ]);
    for item in doc.items.iter() {
        items.add_row(vec![
            Cell::new(&item.description),
            Cell::new(item.quantity).set_alignment(CellAlignment::Right),
            Cell::new(format_money(symbol, item.unit_price)).set_alignment(CellAlignment::Right),
            Cell::new(format_money(symbol, line_total(item))).set_alignment(CellAlignment::Right),
        ]);
    }
    items.add_row(vec![
        Cell::new(""),
        Cell::new(""),
        Cell::new("Subtotal").add_attribute(Attribute::Bold),
        Cell::new(format_money(symbol, totals.subtotal)).set_alignment(CellAlignment::Right),
    ]);
    items.add_row(vec![
        Cell::new(""),
        Cell::new(""),
        Cell::new("Total Due").add_attribute(Attribute::Bold),
        Cell::new(format_money(symbol, totals.total))
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    ]);

    let mut out = format!(
        "{} #{}  ({} / {})\n{}\n{}\n\nTerms & Guarantee:\n{}\n",
        doc.document_type, doc.document_number, doc.date, doc.due_date, parties, items, doc.terms
    );
    out.push_str(if company.signature().is_some() {
        "\nSignature: on file\n"
    } else {
        "\nSignature: none\n"
    });
    if !doc.notes.is_empty() {
        out.push_str(&format!("\n\"{}\"\n", doc.notes));
    }
    out
}
