use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{Invoice, InvoiceStatus, LineItem};

/// Older clients send `{description, price: {unit_amount, unit_quantity}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyPrice {
    pub unit_amount: Decimal,
    #[serde(default)]
    pub unit_quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub description: Option<String>,
    #[serde(alias = "amount")]
    pub unit_price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub price: Option<LegacyPrice>,
}

impl LineItemInput {
    /// None when the line has no description or a non-positive amount.
    pub fn into_line(self) -> Option<LineItem> {
        let description = self.description?.trim().to_string();
        if description.is_empty() {
            return None;
        }
        let (unit_price, quantity) = match (self.unit_price, self.price) {
            (Some(p), _) => (p, self.quantity.unwrap_or(Decimal::ONE)),
            (None, Some(legacy)) => (
                legacy.unit_amount,
                self.quantity
                    .or(legacy.unit_quantity)
                    .unwrap_or(Decimal::ONE),
            ),
            (None, None) => return None,
        };
        if unit_price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return None;
        }
        Some(LineItem {
            description,
            unit_price,
            quantity,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineItemInput>,
    #[serde(default)]
    pub is_proposal: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub proposals: Option<bool>,
    pub limit: Option<i64>,
    pub last_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessQuery {
    pub id: Option<String>,
    pub secret_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<Invoice>,
    pub last_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub success: bool,
    pub message: String,
    pub invoice: Invoice,
}

/// What an unauthenticated customer holding the access code may see.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicInvoice {
    pub id: i64,
    pub number: String,
    pub customer_name: Option<String>,
    pub customer_email: String,
    pub description: Option<String>,
    pub lines: Vec<LineItem>,
    pub invoice_amount: Decimal,
    pub status: InvoiceStatus,
    pub is_proposal: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Invoice> for PublicInvoice {
    fn from(inv: Invoice) -> Self {
        Self {
            number: inv.number(),
            id: inv.id,
            customer_name: inv.customer_name,
            customer_email: inv.customer_email,
            description: inv.description,
            lines: inv.lines,
            invoice_amount: inv.invoice_amount,
            status: inv.status,
            is_proposal: inv.is_proposal,
            created_at: inv.created_at,
        }
    }
}
