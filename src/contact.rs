use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::{
    auth::codes::is_valid_email,
    email::contact_mail,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/contact", post(send_contact))
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[instrument(skip_all)]
pub async fn send_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> ApiResult<Json<Value>> {
    let name = non_blank(payload.name).ok_or_else(|| ApiError::bad_request("Name is required"))?;
    let message =
        non_blank(payload.message).ok_or_else(|| ApiError::bad_request("Message is required"))?;
    let email = non_blank(payload.email)
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| ApiError::bad_request("A valid email is required"))?;
    let phone = non_blank(payload.phone);

    state
        .mailer
        .send(contact_mail(
            &state.config.admin_email,
            &name,
            &email,
            phone.as_deref(),
            &message,
        ))
        .await?;

    info!(from = %email, "contact message forwarded");
    Ok(Json(json!({ "message": "Email sent successfully" })))
}
