//! Stripe processor on `async-stripe`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CollectionMethod, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCustomer, CreateInvoice,
    CreateInvoiceItem, Currency, Customer, CustomerId, EventObject, EventType, Invoice,
    InvoiceItem, ListCustomers, Metadata,
};

use super::{
    webhook::{invoice_id_from_metadata, EventKind, WebhookEvent, SIGNATURE_HEADER},
    CheckoutLine, CheckoutRequest, PaymentError, PaymentProcessor, ProcessorInvoiceRequest,
    RegisteredInvoice, Result,
};

const DAYS_UNTIL_DUE: u32 = 30;
const METADATA_KEY: &str = "invoiceId";

pub struct StripeProcessor {
    secret_key: String,
    webhook_secret: String,
}

fn api_err(context: &'static str) -> impl Fn(stripe::StripeError) -> PaymentError {
    move |e| {
        tracing::error!(error = ?e, "{context}");
        PaymentError::ProviderApi(e.to_string())
    }
}

/// Metadata tying a processor object back to the internal invoice.
fn invoice_metadata(internal_id: i64) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(METADATA_KEY.to_string(), internal_id.to_string());
    metadata
}

/// Ad-hoc priced line; nothing is created in the product catalogue.
fn checkout_line_item(line: &CheckoutLine) -> CreateCheckoutSessionLineItems {
    CreateCheckoutSessionLineItems {
        price_data: Some(CreateCheckoutSessionLineItemsPriceData {
            currency: Currency::USD,
            product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                name: line.name.clone(),
                ..Default::default()
            }),
            unit_amount: Some(line.unit_amount_cents),
            ..Default::default()
        }),
        quantity: Some(line.quantity),
        ..Default::default()
    }
}

fn event_kind(event_type: EventType) -> EventKind {
    match event_type {
        EventType::CheckoutSessionCompleted | EventType::InvoicePaid => EventKind::PaymentSucceeded,
        EventType::CheckoutSessionAsyncPaymentFailed | EventType::InvoicePaymentFailed => {
            EventKind::PaymentFailed
        }
        _ => EventKind::Ignored,
    }
}

impl StripeProcessor {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            secret_key,
            webhook_secret,
        }
    }

    fn client(&self) -> Client {
        Client::new(&self.secret_key)
    }

    async fn find_or_create_customer(
        &self,
        client: &Client,
        email: &str,
        name: Option<&str>,
    ) -> Result<CustomerId> {
        let mut params = ListCustomers::new();
        params.email = Some(email);
        params.limit = Some(1);
        let existing = Customer::list(client, &params)
            .await
            .map_err(api_err("failed to look up Stripe customer"))?;
        if let Some(customer) = existing.data.into_iter().next() {
            return Ok(customer.id);
        }

        let created = Customer::create(
            client,
            CreateCustomer {
                email: Some(email),
                name,
                ..Default::default()
            },
        )
        .await
        .map_err(api_err("failed to create Stripe customer"))?;
        tracing::info!(customer_id = %created.id, "created Stripe customer");
        Ok(created.id)
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    #[tracing::instrument(skip_all, fields(invoice_id = req.internal_id))]
    async fn register_invoice(&self, req: &ProcessorInvoiceRequest) -> Result<RegisteredInvoice> {
        let client = self.client();
        let customer_id = self
            .find_or_create_customer(&client, &req.customer_email, req.customer_name.as_deref())
            .await?;

        let invoice = Invoice::create(
            &client,
            CreateInvoice {
                customer: Some(customer_id.clone()),
                collection_method: Some(CollectionMethod::SendInvoice),
                days_until_due: Some(DAYS_UNTIL_DUE),
                metadata: Some(invoice_metadata(req.internal_id)),
                ..Default::default()
            },
        )
        .await
        .map_err(api_err("failed to create Stripe invoice"))?;

        for item in &req.items {
            let mut params = CreateInvoiceItem::new(customer_id.clone());
            params.amount = Some(item.amount_cents);
            params.currency = Some(Currency::USD);
            params.description = Some(&item.description);
            params.invoice = Some(invoice.id.clone());
            InvoiceItem::create(&client, params)
                .await
                .map_err(api_err("failed to add Stripe invoice item"))?;
        }

        client
            .post::<Invoice>(&format!("/invoices/{}/finalize", invoice.id))
            .await
            .map_err(api_err("failed to finalize Stripe invoice"))?;
        client
            .post::<Invoice>(&format!("/invoices/{}/send", invoice.id))
            .await
            .map_err(api_err("failed to send Stripe invoice"))?;

        tracing::info!(processor_invoice_id = %invoice.id, items = req.items.len(), "registered Stripe invoice");
        Ok(RegisteredInvoice {
            processor_invoice_id: invoice.id.to_string(),
            processor_customer_id: customer_id.to_string(),
        })
    }

    async fn void_invoice(&self, processor_invoice_id: &str) -> Result<()> {
        self.client()
            .post::<Invoice>(&format!("/invoices/{processor_invoice_id}/void"))
            .await
            .map_err(api_err("failed to void Stripe invoice"))?;
        tracing::info!(%processor_invoice_id, "voided Stripe invoice");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(invoice_id = req.internal_id))]
    async fn create_checkout_session(&self, req: &CheckoutRequest) -> Result<String> {
        let client = self.client();
        let params = CreateCheckoutSession {
            success_url: Some(&req.success_url),
            cancel_url: Some(&req.cancel_url),
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(req.lines.iter().map(checkout_line_item).collect()),
            metadata: Some(invoice_metadata(req.internal_id)),
            ..Default::default()
        };
        let session = CheckoutSession::create(&client, params)
            .await
            .map_err(api_err("failed to create Stripe checkout session"))?;
        tracing::info!(session_id = %session.id, total_cents = req.total_cents(), "created checkout session");

        session.url.ok_or_else(|| {
            tracing::error!(session_id = %session.id, "checkout session has no URL");
            PaymentError::InvalidData("Checkout session missing URL".to_string())
        })
    }

    async fn validate_webhook(&self, headers: &HeaderMap, body: &str) -> Result<WebhookEvent> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| PaymentError::InvalidSignature("missing stripe-signature header".into()))?
            .to_str()
            .map_err(|_| PaymentError::InvalidSignature("unreadable stripe-signature header".into()))?;

        let event = stripe::Webhook::construct_event(body, signature, &self.webhook_secret)
            .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;

        let metadata = match &event.data.object {
            EventObject::CheckoutSession(session) => serde_json::to_value(session).ok(),
            EventObject::Invoice(invoice) => serde_json::to_value(invoice).ok(),
            _ => None,
        };
        Ok(WebhookEvent {
            event_type: format!("{:?}", event.type_),
            kind: event_kind(event.type_),
            invoice_id: metadata.as_ref().and_then(|o| invoice_id_from_metadata(&o["metadata"])),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_items_are_priced_inline_in_usd() {
        let item = checkout_line_item(&CheckoutLine {
            name: "Labor".into(),
            unit_amount_cents: 4550,
            quantity: 8,
        });
        assert_eq!(item.quantity, Some(8));
        let price = item.price_data.unwrap();
        assert_eq!(price.currency, Currency::USD);
        assert_eq!(price.unit_amount, Some(4550));
        assert_eq!(price.product_data.unwrap().name, "Labor");
    }

    #[test]
    fn metadata_carries_internal_id() {
        let metadata = invoice_metadata(42);
        assert_eq!(metadata.get("invoiceId").map(String::as_str), Some("42"));
    }

    #[test]
    fn payment_events_map_to_kinds() {
        assert_eq!(event_kind(EventType::CheckoutSessionCompleted), EventKind::PaymentSucceeded);
        assert_eq!(event_kind(EventType::InvoicePaid), EventKind::PaymentSucceeded);
        assert_eq!(event_kind(EventType::InvoicePaymentFailed), EventKind::PaymentFailed);
        assert_eq!(
            event_kind(EventType::CheckoutSessionAsyncPaymentFailed),
            EventKind::PaymentFailed
        );
        assert_eq!(event_kind(EventType::CustomerCreated), EventKind::Ignored);
    }

    #[tokio::test]
    async fn unsigned_or_forged_webhooks_are_rejected() {
        let processor = StripeProcessor::new("sk_test_fake".into(), "whsec_fake".into());
        let body = r#"{"type":"invoice.paid","data":{"object":{"metadata":{"invoiceId":"1"}}}}"#;

        let missing = processor.validate_webhook(&HeaderMap::new(), body).await;
        assert!(matches!(missing, Err(PaymentError::InvalidSignature(_))));

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "t=1700000000,v1=deadbeef".parse().unwrap());
        let forged = processor.validate_webhook(&headers, body).await;
        assert!(matches!(forged, Err(PaymentError::InvalidSignature(_))));
    }
}
