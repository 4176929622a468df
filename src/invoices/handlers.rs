use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::{get, post, put},
    Json, Router,
};
use time::{macros::format_description, Date};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        AccessQuery, CreateDocumentRequest, CreateInvoiceRequest, InvoiceResponse, LineItemInput,
        ListQuery, ListResponse, PublicInvoice,
    },
    repo_types::{Invoice, InvoiceFilter, InvoiceStatus, LineItem},
    service::{self, Billing, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
};
use crate::{
    auth::AdminSession,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", post(create_invoice).get(list_invoices))
        .route("/invoices/documents", post(create_document))
        .route("/invoices/:id/void", put(void_invoice))
        .route("/invoices/:id/paid", put(mark_paid))
        .route("/proposals", get(list_proposals))
        .route("/proposals/:id/promote", post(promote_proposal))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/invoices/:id/public", get(public_invoice))
        .route("/pay", get(pay))
}

fn lines_from(inputs: Vec<LineItemInput>) -> Vec<LineItem> {
    inputs.into_iter().filter_map(LineItemInput::into_line).collect()
}

fn parse_date(raw: Option<&str>, field: &str) -> ApiResult<Option<Date>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            Date::parse(s, format_description!("[year]-[month]-[day]"))
                .map_err(|_| ApiError::bad_request(format!("{field} must be YYYY-MM-DD")))
        })
        .transpose()
}

fn filter_from(q: &ListQuery) -> ApiResult<InvoiceFilter> {
    let status = q
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(InvoiceStatus::from_str)
        .transpose()
        .map_err(|_| ApiError::bad_request("Unknown status"))?;
    let start_date = parse_date(q.start_date.as_deref(), "startDate")?;
    let end_date = parse_date(q.end_date.as_deref(), "endDate")?;
    if let (Some(s), Some(e)) = (start_date, end_date) {
        if s > e {
            return Err(ApiError::bad_request("startDate must not be after endDate"));
        }
    }
    Ok(InvoiceFilter {
        status,
        start_date,
        end_date,
        is_proposal: q.proposals,
    })
}

fn page_size(q: &ListQuery) -> ApiResult<i64> {
    match q.limit {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(n) if (1..=MAX_PAGE_SIZE).contains(&n) => Ok(n),
        Some(_) => Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        ))),
    }
}

async fn list_with(state: &AppState, filter: InvoiceFilter, q: &ListQuery) -> ApiResult<Json<ListResponse>> {
    let limit = page_size(q)?;
    let page = service::list(state, &filter, limit, q.last_key.as_deref()).await?;
    Ok(Json(ListResponse {
        success: true,
        data: page.data,
        last_key: page.last_key,
    }))
}

#[instrument(skip(state, _session, payload))]
pub async fn create_invoice(
    State(state): State<AppState>,
    _session: AdminSession,
    Json(payload): Json<CreateInvoiceRequest>,
) -> ApiResult<Json<InvoiceResponse>> {
    let billing = Billing::new(
        payload.customer_email,
        payload.customer_name,
        payload.description,
        lines_from(payload.line_items),
    )?;
    let invoice = service::create_billed_invoice(&state, billing).await?;
    Ok(Json(InvoiceResponse {
        success: true,
        message: "Invoice created and sent".into(),
        invoice,
    }))
}

#[instrument(skip(state, _session, payload))]
pub async fn create_document(
    State(state): State<AppState>,
    _session: AdminSession,
    Json(payload): Json<CreateDocumentRequest>,
) -> ApiResult<Json<InvoiceResponse>> {
    let billing = Billing::new(
        payload.customer_email,
        payload.customer_name,
        payload.description,
        lines_from(payload.lines),
    )?;
    let is_proposal = payload.is_proposal;
    let invoice = service::create_document(&state, billing, is_proposal).await?;
    Ok(Json(InvoiceResponse {
        success: true,
        message: if is_proposal {
            "Proposal created and sent via email".into()
        } else {
            "Invoice created and sent via email".into()
        },
        invoice,
    }))
}

#[instrument(skip(state, _session))]
pub async fn list_invoices(
    State(state): State<AppState>,
    _session: AdminSession,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let filter = filter_from(&q)?;
    list_with(&state, filter, &q).await
}

#[instrument(skip(state, _session))]
pub async fn list_proposals(
    State(state): State<AppState>,
    _session: AdminSession,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let mut filter = filter_from(&q)?;
    filter.is_proposal = Some(true);
    list_with(&state, filter, &q).await
}

#[instrument(skip(state, _session))]
pub async fn void_invoice(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<InvoiceResponse>> {
    let invoice = service::void(&state, id).await?;
    Ok(Json(InvoiceResponse {
        success: true,
        message: "Invoice voided".into(),
        invoice,
    }))
}

#[instrument(skip(state, _session))]
pub async fn mark_paid(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<InvoiceResponse>> {
    let invoice = service::transition(&state, id, InvoiceStatus::Paid).await?;
    Ok(Json(InvoiceResponse {
        success: true,
        message: "Invoice marked as paid".into(),
        invoice,
    }))
}

#[instrument(skip(state, _session))]
pub async fn promote_proposal(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<InvoiceResponse>> {
    let invoice = service::promote(&state, id).await?;
    Ok(Json(InvoiceResponse {
        success: true,
        message: "Proposal converted to invoice and sent".into(),
        invoice,
    }))
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretQuery {
    pub secret_code: Option<String>,
}

#[instrument(skip(state, q))]
pub async fn public_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SecretQuery>,
) -> ApiResult<Json<PublicInvoice>> {
    let invoice = service::authorize_access(&state, Some(&id), q.secret_code.as_deref()).await?;
    Ok(Json(PublicInvoice::from(invoice)))
}

fn paid_page(state: &AppState, invoice: &Invoice) -> String {
    format!(
        "{}/paidInvoice?id={}&secretCode={}",
        state.config.public_base_url, invoice.id, invoice.secret_code
    )
}

/// Resolves a payment link: redirects to hosted checkout, or to the paid
/// page when nothing is owed.
#[instrument(skip(state, q))]
pub async fn pay(State(state): State<AppState>, Query(q): Query<AccessQuery>) -> ApiResult<Redirect> {
    let invoice =
        service::authorize_access(&state, q.id.as_deref(), q.secret_code.as_deref()).await?;
    if invoice.is_proposal {
        warn!(invoice_id = invoice.id, "payment attempted on a proposal");
        return Err(ApiError::Conflict("Proposals cannot be paid".into()));
    }

    let paid_url = paid_page(&state, &invoice);
    if !invoice.status.is_payable() {
        info!(invoice_id = invoice.id, status = %invoice.status, "invoice not payable; redirecting");
        return Ok(Redirect::to(&paid_url));
    }

    let request = service::checkout_request(
        &invoice,
        state.config.payment.service_fee_basis_points,
        paid_url,
        state.config.public_base_url.clone(),
    )?;
    let url = state
        .payments
        .create_checkout_session(&request)
        .await
        .map_err(|e| {
            error!(error = %e, invoice_id = invoice.id, "checkout session failed");
            ApiError::from(e)
        })?;
    info!(invoice_id = invoice.id, total_cents = request.total_cents(), "checkout session created");
    Ok(Redirect::to(&url))
}
