//! Invoice and proposal documents.
//!
//! Layout is computed as plain positioned text runs first and only then
//! drawn with printpdf, so page breaking and wrapping can be tested without
//! parsing PDF output.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};
use rust_decimal::Decimal;

use crate::config::BusinessConfig;
use crate::invoices::repo_types::{round_cents, Invoice, LineItem};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const BOTTOM: f32 = 30.0;
const ROW: f32 = 6.0;
const DESC_WIDTH_CHARS: usize = 52;

const COL_DESC: f32 = MARGIN;
const COL_QTY: f32 = 125.0;
const COL_UNIT: f32 = 145.0;
const COL_AMOUNT: f32 = 172.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
}

#[derive(Debug)]
struct Pages {
    pages: Vec<Vec<TextRun>>,
    y: f32,
}

impl Pages {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_H - MARGIN,
        }
    }

    fn put(&mut self, text: impl Into<String>, x: f32, size: f32, bold: bool) {
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.push(TextRun {
                text: text.into(),
                x,
                y,
                size,
                bold,
            });
        }
    }

    fn down(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_H - MARGIN;
    }

    fn ensure_room(&mut self, mm: f32) -> bool {
        if self.y - mm < BOTTOM {
            self.new_page();
            true
        } else {
            false
        }
    }
}

/// Greedy word wrap. Words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// `$1,234.50`
pub fn format_money(amount: Decimal) -> String {
    let rounded = round_cents(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{}", if negative { "-" } else { "" }, grouped, frac)
}

fn format_quantity(q: Decimal) -> String {
    q.normalize().to_string()
}

fn table_header(p: &mut Pages) {
    p.put("Description", COL_DESC, 10.0, true);
    p.put("Qty", COL_QTY, 10.0, true);
    p.put("Unit", COL_UNIT, 10.0, true);
    p.put("Amount", COL_AMOUNT, 10.0, true);
    p.down(ROW);
}

fn line_row(p: &mut Pages, line: &LineItem) {
    let wrapped = wrap(&line.description, DESC_WIDTH_CHARS);
    let height = ROW * wrapped.len() as f32;
    // A row that fits under a fresh header is kept on one page.
    if height <= PAGE_H - MARGIN - ROW - BOTTOM && p.ensure_room(height) {
        table_header(p);
    }
    for (i, text) in wrapped.into_iter().enumerate() {
        if p.ensure_room(ROW) {
            table_header(p);
        }
        if i == 0 {
            p.put(format_quantity(line.quantity), COL_QTY, 10.0, false);
            p.put(format_money(line.unit_price), COL_UNIT, 10.0, false);
            p.put(format_money(line.line_total()), COL_AMOUNT, 10.0, false);
        }
        p.put(text, COL_DESC, 10.0, false);
        p.down(ROW);
    }
}

/// Positions every piece of text. One inner Vec per page.
pub fn layout(
    invoice: &Invoice,
    business: &BusinessConfig,
    payment_link: Option<&str>,
) -> Vec<Vec<TextRun>> {
    let mut p = Pages::new();
    let title = if invoice.is_proposal { "PROPOSAL" } else { "INVOICE" };

    p.put(&business.name, MARGIN, 16.0, true);
    p.put(title, 150.0, 18.0, true);
    p.down(7.0);
    let mut right = vec![
        format!("No. {}", invoice.number()),
        format!(
            "Date: {:04}-{:02}-{:02}",
            invoice.created_at.year(),
            u8::from(invoice.created_at.month()),
            invoice.created_at.day()
        ),
    ]
    .into_iter();
    for addr in &business.address_lines {
        p.put(addr, MARGIN, 10.0, false);
        if let Some(r) = right.next() {
            p.put(r, 150.0, 10.0, false);
        }
        p.down(5.0);
    }
    for r in right {
        p.put(r, 150.0, 10.0, false);
        p.down(5.0);
    }
    p.down(8.0);

    p.put(if invoice.is_proposal { "Prepared For:" } else { "Bill To:" }, MARGIN, 11.0, true);
    p.down(5.5);
    if let Some(name) = &invoice.customer_name {
        p.put(name, MARGIN, 10.0, false);
        p.down(5.0);
    }
    p.put(&invoice.customer_email, MARGIN, 10.0, false);
    p.down(8.0);

    if let Some(desc) = invoice.description.as_deref().filter(|d| !d.trim().is_empty()) {
        for text in wrap(desc, 90) {
            p.ensure_room(ROW);
            p.put(text, MARGIN, 10.0, false);
            p.down(5.0);
        }
        p.down(4.0);
    }

    p.ensure_room(ROW * 2.0);
    table_header(&mut p);
    for line in &invoice.lines {
        line_row(&mut p, line);
    }

    p.down(2.0);
    p.ensure_room(ROW * 2.0);
    p.put("Total", COL_UNIT, 11.0, true);
    p.put(format_money(invoice.invoice_amount), COL_AMOUNT, 11.0, true);
    p.down(ROW * 2.0);

    p.ensure_room(ROW * 3.0);
    if invoice.is_proposal {
        p.put("This proposal is valid for 30 days from the date above.", MARGIN, 10.0, false);
        p.down(5.0);
        p.put("Reply to this email to accept or request changes.", MARGIN, 10.0, false);
    } else {
        p.put("Payment Instructions", MARGIN, 11.0, true);
        p.down(5.5);
        match payment_link {
            Some(link) => {
                p.put("Pay online by card (3.5% service fee applies):", MARGIN, 10.0, false);
                p.down(5.0);
                for chunk in wrap(link, 95) {
                    p.ensure_room(ROW);
                    p.put(chunk, MARGIN, 9.0, false);
                    p.down(4.5);
                }
            }
            None => p.put("Please contact us to arrange payment.", MARGIN, 10.0, false),
        }
    }
    p.pages
}

fn pdf_err(e: printpdf::Error) -> anyhow::Error {
    anyhow::anyhow!("pdf rendering failed: {e}")
}

pub fn render(
    invoice: &Invoice,
    business: &BusinessConfig,
    payment_link: Option<&str>,
) -> anyhow::Result<Vec<u8>> {
    let pages = layout(invoice, business, payment_link);
    let (doc, first_page, first_layer) =
        PdfDocument::new(invoice.number(), Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let regular: IndirectFontRef = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold: IndirectFontRef = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_err)?;

    for (i, runs) in pages.iter().enumerate() {
        let (page, layer) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1")
        };
        let layer = doc.get_page(page).get_layer(layer);
        for run in runs {
            let font = if run.bold { &bold } else { &regular };
            layer.use_text(run.text.clone(), run.size, Mm(run.x), Mm(run.y), font);
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}
