//! Inbound processor events, reduced to what they mean for an invoice.
//!
//! Each processor verifies its own signature scheme in
//! [`PaymentProcessor::validate_webhook`](super::PaymentProcessor::validate_webhook).

use serde::Deserialize;
use serde_json::Value;

use super::PaymentError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// What an event means for an invoice, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentSucceeded,
    PaymentFailed,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_type: String,
    pub kind: EventKind,
    pub invoice_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    #[serde(default)]
    metadata: Option<Value>,
}

/// `invoiceId` from an object's metadata, as a string or a number.
pub fn invoice_id_from_metadata(metadata: &Value) -> Option<i64> {
    match metadata.get("invoiceId")? {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Decodes an event payload whose origin has already been checked.
pub fn parse_event(payload: &str) -> Result<WebhookEvent, PaymentError> {
    let raw: RawEvent = serde_json::from_str(payload)
        .map_err(|e| PaymentError::InvalidData(format!("invalid event payload: {e}")))?;
    let kind = match raw.event_type.as_str() {
        "checkout.session.completed" | "invoice.paid" => EventKind::PaymentSucceeded,
        "checkout.session.async_payment_failed" | "invoice.payment_failed" => {
            EventKind::PaymentFailed
        }
        _ => EventKind::Ignored,
    };
    let invoice_id = raw
        .data
        .object
        .metadata
        .as_ref()
        .and_then(invoice_id_from_metadata);
    Ok(WebhookEvent {
        event_type: raw.event_type,
        kind,
        invoice_id,
    })
}
