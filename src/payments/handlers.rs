use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::webhook::EventKind;
use crate::{
    error::{ApiError, ApiResult},
    invoices::{repo_types::InvoiceStatus, service::transition},
    state::AppState,
};

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/stripe", post(stripe_webhook))
}

#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let event = state
        .payments
        .validate_webhook(&headers, &body)
        .await
        .map_err(|e| {
            warn!(error = %e, "webhook rejected");
            ApiError::bad_request(format!("Webhook Error: {e}"))
        })?;

    let to = match event.kind {
        EventKind::PaymentSucceeded => InvoiceStatus::PaidOnline,
        EventKind::PaymentFailed => InvoiceStatus::PaymentFailed,
        EventKind::Ignored => {
            info!(event_type = %event.event_type, "webhook event ignored");
            return Ok(Json(json!({ "received": true })));
        }
    };
    let invoice_id = event
        .invoice_id
        .ok_or_else(|| ApiError::bad_request("Missing invoiceId in event metadata"))?;

    match transition(&state, invoice_id, to).await {
        Ok(_) => info!(invoice_id, event_type = %event.event_type, status = %to, "webhook applied"),
        Err(e @ (ApiError::Conflict(_) | ApiError::NotFound(_))) => {
            warn!(invoice_id, event_type = %event.event_type, error = %e, "webhook acknowledged without change")
        }
        Err(e) => return Err(e),
    }
    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use crate::invoices::repo_types::{InvoiceStatus, LineItem, NewInvoice};
    use crate::payments::webhook::SIGNATURE_HEADER;
    use crate::store::Store;
    use crate::test_utils::{TestApp, WEBHOOK_SECRET};

    async fn seed(app: &TestApp, status: InvoiceStatus) -> i64 {
        app.store
            .insert_invoice(NewInvoice {
                customer_email: "client@example.com".into(),
                customer_name: Some("Client".into()),
                description: None,
                lines: vec![LineItem {
                    description: "Labor".into(),
                    unit_price: Decimal::from(100),
                    quantity: Decimal::ONE,
                }],
                status,
                is_proposal: false,
                secret_code: "abcdefghijklmnop".into(),
            })
            .await
            .unwrap()
            .id
    }

    fn event(kind: &str, id: i64) -> String {
        format!(r#"{{"type":"{kind}","data":{{"object":{{"metadata":{{"invoiceId":"{id}"}}}}}}}}"#)
    }

    fn signed(body: &str, secret: &str) -> Request<Body> {
        Request::post("/api/webhooks/stripe")
            .header(SIGNATURE_HEADER, secret)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn completed_checkout_marks_paid_online() {
        let app = TestApp::new();
        let id = seed(&app, InvoiceStatus::Unpaid).await;
        let res = app
            .router()
            .oneshot(signed(&event("checkout.session.completed", id), WEBHOOK_SECRET))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let inv = app.store.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(inv.status, InvoiceStatus::PaidOnline);
    }

    #[tokio::test]
    async fn failed_payment_marks_payment_failed() {
        let app = TestApp::new();
        let id = seed(&app, InvoiceStatus::Unpaid).await;
        let res = app
            .router()
            .oneshot(signed(&event("invoice.payment_failed", id), WEBHOOK_SECRET))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let inv = app.store.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(inv.status, InvoiceStatus::PaymentFailed);
    }

    #[tokio::test]
    async fn bad_signature_changes_nothing() {
        let app = TestApp::new();
        let id = seed(&app, InvoiceStatus::Unpaid).await;
        let res = app
            .router()
            .oneshot(signed(&event("invoice.paid", id), "whsec_wrong"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let unsigned = Request::post("/api/webhooks/stripe")
            .body(Body::from(event("invoice.paid", id)))
            .unwrap();
        let res = app.router().oneshot(unsigned).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let inv = app.store.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(inv.status, InvoiceStatus::Unpaid);
    }

    #[tokio::test]
    async fn unknown_events_are_acknowledged() {
        let app = TestApp::new();
        let body = r#"{"type":"customer.created","data":{"object":{}}}"#;
        let res = app.router().oneshot(signed(body, WEBHOOK_SECRET)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let app = TestApp::new();
        let res = app.router().oneshot(signed("{not json", WEBHOOK_SECRET)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_invoice_id_is_rejected() {
        let app = TestApp::new();
        let body = r#"{"type":"invoice.paid","data":{"object":{"metadata":{}}}}"#;
        let res = app.router().oneshot(signed(body, WEBHOOK_SECRET)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn event_for_voided_invoice_is_acknowledged_without_change() {
        let app = TestApp::new();
        let id = seed(&app, InvoiceStatus::Voided).await;
        let res = app
            .router()
            .oneshot(signed(&event("invoice.paid", id), WEBHOOK_SECRET))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let inv = app.store.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(inv.status, InvoiceStatus::Voided);
    }
}
