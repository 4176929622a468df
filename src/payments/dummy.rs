//! Processor that accepts everything without calling out. For development
//! and tests.
//!
//! Webhooks are authenticated by sending the configured webhook secret
//! verbatim in the `stripe-signature` header.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    webhook::{parse_event, WebhookEvent, SIGNATURE_HEADER},
    CheckoutRequest, PaymentError, PaymentProcessor, ProcessorInvoiceRequest, RegisteredInvoice,
    Result,
};
use crate::auth::codes::constant_time_eq;

#[derive(Default)]
pub struct DummyProcessor {
    webhook_secret: String,
    registered: Mutex<Vec<ProcessorInvoiceRequest>>,
    checkouts: Mutex<Vec<CheckoutRequest>>,
    voided: Mutex<Vec<String>>,
}

impl DummyProcessor {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
            ..Default::default()
        }
    }

    /// Invoice registrations seen so far, oldest first.
    pub fn registered(&self) -> Vec<ProcessorInvoiceRequest> {
        self.registered.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Checkout requests seen so far, oldest first.
    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn voided(&self) -> Vec<String> {
        self.voided.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProcessor for DummyProcessor {
    async fn register_invoice(&self, req: &ProcessorInvoiceRequest) -> Result<RegisteredInvoice> {
        let registered = RegisteredInvoice {
            processor_invoice_id: format!("dummy_in_{}", Uuid::new_v4().simple()),
            processor_customer_id: format!("dummy_cus_{}", req.customer_email),
        };
        tracing::info!(
            invoice_id = req.internal_id,
            processor_invoice_id = %registered.processor_invoice_id,
            items = req.items.len(),
            "dummy processor registered invoice"
        );
        if let Ok(mut r) = self.registered.lock() {
            r.push(req.clone());
        }
        Ok(registered)
    }

    async fn void_invoice(&self, processor_invoice_id: &str) -> Result<()> {
        tracing::info!(%processor_invoice_id, "dummy processor voided invoice");
        if let Ok(mut v) = self.voided.lock() {
            v.push(processor_invoice_id.to_string());
        }
        Ok(())
    }

    async fn create_checkout_session(&self, req: &CheckoutRequest) -> Result<String> {
        let session_id = format!("dummy_cs_{}_{}", req.internal_id, Uuid::new_v4().simple());
        if let Ok(mut c) = self.checkouts.lock() {
            c.push(req.clone());
        }
        tracing::info!(invoice_id = req.internal_id, %session_id, total_cents = req.total_cents(), "dummy checkout session");
        let sep = if req.success_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}session_id={}", req.success_url, sep, session_id))
    }

    async fn validate_webhook(&self, headers: &HeaderMap, body: &str) -> Result<WebhookEvent> {
        let presented = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PaymentError::InvalidSignature("missing stripe-signature header".into()))?;
        if self.webhook_secret.is_empty() || !constant_time_eq(presented, &self.webhook_secret) {
            return Err(PaymentError::InvalidSignature("signature mismatch".into()));
        }
        parse_event(body)
    }
}
