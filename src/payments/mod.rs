//! Payment processor abstraction.
//!
//! Invoices billed through the processor and hosted card checkout both go
//! through [`PaymentProcessor`], as does verifying inbound webhooks.

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::config::{PaymentConfig, ProcessorConfig};
use webhook::WebhookEvent;

pub mod dummy;
pub mod handlers;
pub mod stripe;
pub mod webhook;

pub fn create_processor(config: &PaymentConfig) -> Box<dyn PaymentProcessor> {
    match &config.processor {
        ProcessorConfig::Stripe { secret_key } => Box::new(stripe::StripeProcessor::new(
            secret_key.clone(),
            config.webhook_secret.clone(),
        )),
        ProcessorConfig::Dummy => Box::new(dummy::DummyProcessor::new(&config.webhook_secret)),
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider API error: {0}")]
    ProviderApi(String),

    #[error("webhook signature rejected: {0}")]
    InvalidSignature(String),

    #[error("invalid payment data: {0}")]
    InvalidData(String),
}

/// One invoice line as the processor bills it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BilledItem {
    pub description: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct ProcessorInvoiceRequest {
    pub internal_id: i64,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub items: Vec<BilledItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredInvoice {
    pub processor_invoice_id: String,
    pub processor_customer_id: String,
}

/// One hosted-checkout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: u64,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub internal_id: i64,
    pub lines: Vec<CheckoutLine>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub fn total_cents(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.unit_amount_cents * l.quantity as i64)
            .sum()
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Finds or creates the customer, creates an invoice carrying the
    /// internal id as metadata, adds the items, finalizes and sends it.
    async fn register_invoice(&self, req: &ProcessorInvoiceRequest) -> Result<RegisteredInvoice>;

    async fn void_invoice(&self, processor_invoice_id: &str) -> Result<()>;

    /// Returns the hosted checkout URL the customer is redirected to.
    async fn create_checkout_session(&self, req: &CheckoutRequest) -> Result<String>;

    /// Checks the signature on an inbound webhook and decodes it.
    async fn validate_webhook(&self, headers: &HeaderMap, body: &str) -> Result<WebhookEvent>;
}
