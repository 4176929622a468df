use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// Lifecycle of an invoice or proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "Unpaid", alias = "unpaid")]
    Unpaid,
    #[serde(rename = "paid")]
    Paid,
    #[serde(rename = "paid_online")]
    PaidOnline,
    #[serde(rename = "voided")]
    Voided,
    #[serde(rename = "payment_failed")]
    PaymentFailed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Unpaid => "Unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PaidOnline => "paid_online",
            InvoiceStatus::Voided => "voided",
            InvoiceStatus::PaymentFailed => "payment_failed",
        }
    }

    /// Whether a customer can still pay this invoice online.
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Open | InvoiceStatus::Unpaid | InvoiceStatus::PaymentFailed
        )
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match self {
            Open | Unpaid => matches!(next, Paid | PaidOnline | Voided | PaymentFailed),
            PaymentFailed => matches!(next, Paid | PaidOnline | Voided),
            Paid | PaidOnline | Voided => false,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "open" => InvoiceStatus::Open,
            "Unpaid" | "unpaid" => InvoiceStatus::Unpaid,
            "paid" => InvoiceStatus::Paid,
            "paid_online" => InvoiceStatus::PaidOnline,
            "voided" => InvoiceStatus::Voided,
            "payment_failed" => InvoiceStatus::PaymentFailed,
            other => anyhow::bail!("unknown invoice status {other:?}"),
        })
    }
}

fn one() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    #[serde(alias = "amount")]
    pub unit_price: Decimal,
    #[serde(default = "one")]
    pub quantity: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * self.quantity
    }
}

pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum of unit price times quantity over all lines, rounded to cents.
pub fn total_of(lines: &[LineItem]) -> Decimal {
    round_cents(lines.iter().map(LineItem::line_total).sum())
}

/// Invoice or proposal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub description: Option<String>,
    pub lines: Vec<LineItem>,
    pub invoice_amount: Decimal,
    pub status: InvoiceStatus,
    pub is_proposal: bool,
    pub secret_code: String,
    pub processor_invoice_id: Option<String>,
    pub processor_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Invoice {
    pub fn number(&self) -> String {
        let prefix = if self.is_proposal { "PRO" } else { "INV" };
        format!("{}-{:06}", prefix, self.id)
    }
}

/// Fields supplied when inserting; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub description: Option<String>,
    pub lines: Vec<LineItem>,
    pub status: InvoiceStatus,
    pub is_proposal: bool,
    pub secret_code: String,
}

impl NewInvoice {
    pub fn invoice_amount(&self) -> Decimal {
        total_of(&self.lines)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    /// Inclusive bounds on the UTC creation date.
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub is_proposal: Option<bool>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(status) = self.status {
            if invoice.status != status {
                return false;
            }
        }
        let day = invoice.created_at.date();
        if self.start_date.is_some_and(|start| day < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| day > end) {
            return false;
        }
        if let Some(p) = self.is_proposal {
            if invoice.is_proposal != p {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(desc: &str, price: &str, qty: &str) -> LineItem {
        LineItem {
            description: desc.into(),
            unit_price: Decimal::from_str(price).unwrap(),
            quantity: Decimal::from_str(qty).unwrap(),
        }
    }

    #[test]
    fn total_sums_price_times_quantity() {
        let lines = vec![item("Labor", "45.50", "8"), item("Drywall", "12.99", "3")];
        assert_eq!(total_of(&lines), Decimal::from_str("402.97").unwrap());
    }

    #[test]
    fn total_rounds_half_away_from_zero() {
        let lines = vec![item("Trim", "0.125", "1")];
        assert_eq!(total_of(&lines), Decimal::from_str("0.13").unwrap());
    }

    #[test]
    fn line_item_accepts_amount_alias_and_default_quantity() {
        let line: LineItem = serde_json::from_str(r#"{"description":"Labor","amount":100}"#).unwrap();
        assert_eq!(line.unit_price, Decimal::from(100));
        assert_eq!(line.quantity, Decimal::ONE);
    }

    #[test]
    fn status_serialization_matches_wire_names() {
        assert_eq!(serde_json::to_string(&InvoiceStatus::Unpaid).unwrap(), "\"Unpaid\"");
        assert_eq!(serde_json::to_string(&InvoiceStatus::PaidOnline).unwrap(), "\"paid_online\"");
        let parsed: InvoiceStatus = serde_json::from_str("\"unpaid\"").unwrap();
        assert_eq!(parsed, InvoiceStatus::Unpaid);
        assert_eq!(InvoiceStatus::from_str("voided").unwrap(), InvoiceStatus::Voided);
        assert!(InvoiceStatus::from_str("refunded").is_err());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        use InvoiceStatus::*;
        for terminal in [Paid, PaidOnline, Voided] {
            for next in [Open, Unpaid, Paid, PaidOnline, Voided, PaymentFailed] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
        assert!(Open.can_transition_to(Voided));
        assert!(Unpaid.can_transition_to(PaidOnline));
        assert!(PaymentFailed.can_transition_to(PaidOnline));
        assert!(!PaymentFailed.can_transition_to(Open));
    }

    #[test]
    fn number_is_zero_padded_with_kind_prefix() {
        let mut inv = Invoice {
            id: 42,
            customer_email: "a@b.co".into(),
            customer_name: None,
            description: None,
            lines: vec![],
            invoice_amount: Decimal::ZERO,
            status: InvoiceStatus::Open,
            is_proposal: true,
            secret_code: "x".into(),
            processor_invoice_id: None,
            processor_customer_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        assert_eq!(inv.number(), "PRO-000042");
        inv.is_proposal = false;
        assert_eq!(inv.number(), "INV-000042");
    }
}
