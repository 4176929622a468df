use anyhow::Context;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use tracing::{error, info, warn};

use super::{
    cursor,
    repo_types::{round_cents, total_of, Invoice, InvoiceFilter, InvoiceStatus, LineItem, NewInvoice},
};
use crate::{
    auth::codes::{constant_time_eq, is_valid_email, secret_code},
    email::{MailAttachment, OutgoingMail},
    error::{ApiError, ApiResult},
    payments::{BilledItem, CheckoutLine, CheckoutRequest, ProcessorInvoiceRequest},
    pdf,
    state::AppState,
};

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

pub fn to_cents(amount: Decimal) -> anyhow::Result<i64> {
    (round_cents(amount) * Decimal::ONE_HUNDRED)
        .to_i64()
        .context("amount out of range")
}

/// Whole cents per line that add up to the rounded invoice total. Each line
/// gets its floor; the cents lost to truncation go to the lines with the
/// largest remainders, earlier lines first on ties.
pub fn line_cents(lines: &[LineItem]) -> anyhow::Result<Vec<i64>> {
    let target = to_cents(total_of(lines))?;
    let exact: Vec<Decimal> = lines
        .iter()
        .map(|l| l.line_total() * Decimal::ONE_HUNDRED)
        .collect();
    let mut cents = exact
        .iter()
        .map(|e| e.floor().to_i64().context("amount out of range"))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut order: Vec<usize> = (0..exact.len()).collect();
    order.sort_by(|&a, &b| exact[b].fract().cmp(&exact[a].fract()));
    let mut missing = target - cents.iter().sum::<i64>();
    for i in order {
        if missing <= 0 {
            break;
        }
        cents[i] += 1;
        missing -= 1;
    }
    Ok(cents)
}

/// Validated customer identity plus at least one billable line.
pub struct Billing {
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub description: Option<String>,
    pub lines: Vec<LineItem>,
}

impl Billing {
    pub fn new(
        customer_email: Option<String>,
        customer_name: Option<String>,
        description: Option<String>,
        lines: Vec<LineItem>,
    ) -> ApiResult<Self> {
        let customer_email = customer_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| is_valid_email(e))
            .ok_or_else(|| ApiError::bad_request("A valid customer email is required"))?;
        if lines.is_empty() {
            return Err(ApiError::bad_request("At least one line item with a positive amount is required"));
        }
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Self {
            customer_email,
            customer_name: clean(customer_name),
            description: clean(description),
            lines,
        })
    }

    fn into_new(self, status: InvoiceStatus, is_proposal: bool) -> NewInvoice {
        NewInvoice {
            customer_email: self.customer_email,
            customer_name: self.customer_name,
            description: self.description,
            lines: self.lines,
            status,
            is_proposal,
            secret_code: secret_code(),
        }
    }
}

/// Processor-billed invoice. The record is written first so the processor
/// invoice can carry its id; if the processor rejects it the record is
/// removed again.
pub async fn create_billed_invoice(state: &AppState, billing: Billing) -> ApiResult<Invoice> {
    let items = billing
        .lines
        .iter()
        .zip(line_cents(&billing.lines)?)
        .filter(|(_, cents)| *cents > 0)
        .map(|(l, cents)| BilledItem {
            description: l.description.clone(),
            amount_cents: cents,
        })
        .collect::<Vec<_>>();

    let mut invoice = state
        .store
        .insert_invoice(billing.into_new(InvoiceStatus::Unpaid, false))
        .await?;

    let request = ProcessorInvoiceRequest {
        internal_id: invoice.id,
        customer_email: invoice.customer_email.clone(),
        customer_name: invoice.customer_name.clone(),
        items,
    };
    let registered = match state.payments.register_invoice(&request).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, invoice_id = invoice.id, "processor rejected invoice; removing record");
            if let Err(del) = state.store.delete_invoice(invoice.id).await {
                error!(error = %del, invoice_id = invoice.id, "failed to remove orphaned invoice record");
            }
            return Err(e.into());
        }
    };

    if let Err(e) = state
        .store
        .attach_processor_ids(
            invoice.id,
            &registered.processor_invoice_id,
            &registered.processor_customer_id,
        )
        .await
    {
        error!(
            error = %e,
            invoice_id = invoice.id,
            processor_invoice_id = %registered.processor_invoice_id,
            "invoice registered with processor but ids were not stored"
        );
        return Err(e.into());
    }
    invoice.processor_invoice_id = Some(registered.processor_invoice_id);
    invoice.processor_customer_id = Some(registered.processor_customer_id);

    info!(invoice_id = invoice.id, amount = %invoice.invoice_amount, "invoice created");
    Ok(invoice)
}

pub fn payment_link(state: &AppState, invoice: &Invoice) -> String {
    format!(
        "{}/api/pay?id={}&secretCode={}",
        state.config.public_base_url, invoice.id, invoice.secret_code
    )
}

/// Renders the document and mails it to the customer, Bcc the admin.
pub async fn send_document(state: &AppState, invoice: &Invoice) -> anyhow::Result<()> {
    let link = (!invoice.is_proposal).then(|| payment_link(state, invoice));
    let bytes = pdf::render(invoice, &state.config.business, link.as_deref())?;

    let (kind, filename) = if invoice.is_proposal {
        ("proposal", "proposal.pdf")
    } else {
        ("invoice", "invoice.pdf")
    };
    let greeting = invoice.customer_name.as_deref().unwrap_or("customer");
    let mut text = format!(
        "Dear {greeting},\n\nPlease find attached your {kind} {}.\n",
        invoice.number()
    );
    if let Some(link) = &link {
        text.push_str(&format!("\nYou can pay online here: {link}\n"));
    }
    text.push_str(&format!("\nBest regards,\n{}", state.config.business.name));

    state
        .mailer
        .send(OutgoingMail {
            to: invoice.customer_email.clone(),
            to_name: invoice.customer_name.clone(),
            bcc: Some(state.config.admin_email.clone()),
            reply_to: None,
            subject: format!(
                "{} for {}",
                if invoice.is_proposal { "Proposal" } else { "Invoice" },
                greeting
            ),
            text,
            attachment: Some(MailAttachment {
                filename: filename.into(),
                content_type: "application/pdf".into(),
                body: bytes,
            }),
        })
        .await
}

/// Self-hosted document path: the PDF is the bill.
pub async fn create_document(
    state: &AppState,
    billing: Billing,
    is_proposal: bool,
) -> ApiResult<Invoice> {
    let invoice = state
        .store
        .insert_invoice(billing.into_new(InvoiceStatus::Open, is_proposal))
        .await?;
    info!(invoice_id = invoice.id, is_proposal, "document record created");

    if let Err(e) = send_document(state, &invoice).await {
        error!(error = ?e, invoice_id = invoice.id, "document stored but not delivered");
        return Err(e.into());
    }
    Ok(invoice)
}

pub async fn promote(state: &AppState, id: i64) -> ApiResult<Invoice> {
    let current = state
        .store
        .get_invoice(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Proposal not found"))?;
    if !current.is_proposal || current.status != InvoiceStatus::Open {
        return Err(ApiError::Conflict("Only open proposals can be promoted".into()));
    }
    let invoice = state
        .store
        .promote_proposal(id)
        .await?
        .ok_or_else(|| ApiError::Conflict("Only open proposals can be promoted".into()))?;

    if let Err(e) = send_document(state, &invoice).await {
        error!(error = ?e, invoice_id = id, "proposal promoted but invoice not delivered");
        return Err(e.into());
    }
    info!(invoice_id = id, "proposal promoted to invoice");
    Ok(invoice)
}

/// Applies a status change with compare-and-set. Re-applying the current
/// status succeeds without writing.
pub async fn transition(state: &AppState, id: i64, to: InvoiceStatus) -> ApiResult<Invoice> {
    let mut invoice = state
        .store
        .get_invoice(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

    loop {
        if invoice.status == to {
            return Ok(invoice);
        }
        if !invoice.status.can_transition_to(to) {
            warn!(invoice_id = id, from = %invoice.status, to = %to, "illegal status transition");
            return Err(ApiError::Conflict(format!(
                "Cannot change invoice from {} to {}",
                invoice.status, to
            )));
        }
        if state.store.update_invoice_status(id, invoice.status, to).await? {
            info!(invoice_id = id, from = %invoice.status, to = %to, "invoice status changed");
            invoice.status = to;
            return Ok(invoice);
        }
        // lost a race; re-read and decide again
        invoice = state
            .store
            .get_invoice(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Invoice not found"))?;
    }
}

pub async fn void(state: &AppState, id: i64) -> ApiResult<Invoice> {
    let invoice = state
        .store
        .get_invoice(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;
    if invoice.status == InvoiceStatus::Voided {
        return Ok(invoice);
    }
    if !invoice.status.can_transition_to(InvoiceStatus::Voided) {
        return Err(ApiError::Conflict(format!(
            "Cannot void an invoice that is {}",
            invoice.status
        )));
    }
    if let Some(processor_id) = &invoice.processor_invoice_id {
        state.payments.void_invoice(processor_id).await.map_err(|e| {
            error!(error = %e, invoice_id = id, %processor_id, "processor void failed");
            ApiError::from(e)
        })?;
    }
    transition(state, id, InvoiceStatus::Voided).await
}

pub struct Page {
    pub data: Vec<Invoice>,
    pub last_key: Option<String>,
}

pub async fn list(
    state: &AppState,
    filter: &InvoiceFilter,
    limit: i64,
    last_key: Option<&str>,
) -> ApiResult<Page> {
    let before = last_key
        .filter(|k| !k.is_empty())
        .map(cursor::decode)
        .transpose()
        .map_err(|_| ApiError::bad_request("Invalid lastKey"))?;

    let mut data = state.store.list_invoices(filter, before, limit + 1).await?;
    let last_key = if data.len() as i64 > limit {
        data.truncate(limit as usize);
        data.last().map(|i| cursor::encode(i.id))
    } else {
        None
    };
    Ok(Page { data, last_key })
}

/// Looks up an invoice for an unauthenticated caller holding its access code.
pub async fn authorize_access(
    state: &AppState,
    id: Option<&str>,
    secret: Option<&str>,
) -> ApiResult<Invoice> {
    let (id, secret) = match (id, secret) {
        (Some(id), Some(secret)) if !secret.is_empty() => (id, secret),
        _ => return Err(ApiError::bad_request("ID and secret code are required")),
    };
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("Invalid invoice id"))?;
    let invoice = state
        .store
        .get_invoice(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;
    if !constant_time_eq(&invoice.secret_code, secret) {
        warn!(invoice_id = id, "access code mismatch");
        return Err(ApiError::Forbidden("Invalid secret code".into()));
    }
    Ok(invoice)
}

pub fn fee_label(basis_points: u32) -> String {
    format!(
        "Service Fee ({}%)",
        Decimal::new(basis_points as i64, 2).normalize()
    )
}

pub fn service_fee(total: Decimal, basis_points: u32) -> Decimal {
    round_cents(total * Decimal::new(basis_points as i64, 4))
}

/// Checkout lines mirror the invoice lines, plus the card service fee.
/// A line is shown as unit price times quantity only when that is exactly
/// its share of the total; otherwise it is folded into a single line.
pub fn checkout_request(
    invoice: &Invoice,
    basis_points: u32,
    success_url: String,
    cancel_url: String,
) -> anyhow::Result<CheckoutRequest> {
    let mut lines = Vec::with_capacity(invoice.lines.len() + 1);
    for (line, cents) in invoice.lines.iter().zip(line_cents(&invoice.lines)?) {
        if cents <= 0 {
            continue;
        }
        let whole = line.quantity.fract().is_zero();
        let unit_cents = to_cents(line.unit_price)?;
        let checkout_line = match (whole, line.quantity.to_u64()) {
            (true, Some(q)) if q > 0 && unit_cents.checked_mul(q as i64) == Some(cents) => {
                CheckoutLine {
                    name: line.description.clone(),
                    unit_amount_cents: unit_cents,
                    quantity: q,
                }
            }
            _ if line.quantity == Decimal::ONE => CheckoutLine {
                name: line.description.clone(),
                unit_amount_cents: cents,
                quantity: 1,
            },
            _ => CheckoutLine {
                name: format!("{} (x{})", line.description, line.quantity.normalize()),
                unit_amount_cents: cents,
                quantity: 1,
            },
        };
        lines.push(checkout_line);
    }
    let fee = service_fee(invoice.invoice_amount, basis_points);
    if fee > Decimal::ZERO {
        lines.push(CheckoutLine {
            name: fee_label(basis_points),
            unit_amount_cents: to_cents(fee)?,
            quantity: 1,
        });
    }
    Ok(CheckoutRequest {
        internal_id: invoice.id,
        lines,
        success_url,
        cancel_url,
    })
}
