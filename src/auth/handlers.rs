use axum::{
    extract::{FromRef, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use super::{
    codes::{constant_time_eq, is_valid_email, login_code, LOGIN_CODE_TTL_MINUTES, MAX_VERIFY_ATTEMPTS},
    dto::{MessageResponse, RequestCodeRequest, SessionInfo, VerifyCodeRequest},
    extractors::{clear_session_cookie, session_cookie, AdminSession},
    jwt::SessionKeys,
    repo_types::AuthCode,
};
use crate::{
    email::login_code_mail,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/code", post(request_code))
        .route("/auth/verify", post(verify_code))
        .route("/auth/logout", post(logout))
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route("/auth/session", get(current_session))
}

fn normalize(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

#[instrument(skip(state, payload))]
pub async fn request_code(
    State(state): State<AppState>,
    Json(payload): Json<RequestCodeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize(payload.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;
    if !is_valid_email(&email) || email != state.config.admin_email {
        warn!(email = %email, "login code requested for unauthorized email");
        return Err(ApiError::bad_request("Unauthorized email"));
    }

    let issued_at = OffsetDateTime::now_utc();
    let code = AuthCode {
        email: email.clone(),
        code: login_code(),
        issued_at,
        expires_at: issued_at + Duration::minutes(LOGIN_CODE_TTL_MINUTES),
    };
    state.store.put_auth_code(&code).await?;
    state.mailer.send(login_code_mail(&email, &code.code)).await?;

    info!(email = %email, "login code sent");
    Ok(Json(MessageResponse {
        message: "Validation code sent".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let (email, submitted) = match (normalize(payload.email), payload.code) {
        (Some(e), Some(c)) if !c.trim().is_empty() => (e, c.trim().to_string()),
        _ => return Err(ApiError::bad_request("Email and code are required")),
    };

    let stored = state
        .store
        .get_auth_code(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("No code found"))?;

    if !constant_time_eq(&stored.code, &submitted) {
        let attempts = state.store.record_failed_attempt(&email).await?;
        warn!(email = %email, attempts, "login code mismatch");
        if attempts >= MAX_VERIFY_ATTEMPTS {
            state.store.delete_auth_code(&email).await?;
            warn!(email = %email, "login code discarded after repeated mismatches");
            return Err(ApiError::unauthorized("Too many attempts; request a new code"));
        }
        return Err(ApiError::unauthorized("Invalid code"));
    }
    if stored.is_expired(OffsetDateTime::now_utc()) {
        warn!(email = %email, "login code expired");
        return Err(ApiError::unauthorized("Code expired"));
    }

    state.store.delete_auth_code(&email).await?;

    let keys = SessionKeys::from_ref(&state);
    let is_admin = email == state.config.admin_email;
    let token = keys.sign(&email, is_admin)?;
    let jwt = &state.config.jwt;
    let cookie = session_cookie(&token, jwt.ttl_minutes, jwt.cookie_secure);

    info!(email = %email, "admin logged in");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse {
            message: "Login successful".into(),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie(state.config.jwt.cookie_secure))],
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    )
}

#[instrument(skip_all)]
pub async fn current_session(session: AdminSession) -> Json<SessionInfo> {
    Json(SessionInfo {
        email: session.email,
        is_admin: true,
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::json;
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;

    use crate::auth::codes::MAX_VERIFY_ATTEMPTS;
    use crate::auth::repo_types::AuthCode;
    use crate::store::Store;
    use crate::test_utils::{admin_cookie, body_json, json_request, TestApp, ADMIN_EMAIL};

    #[tokio::test]
    async fn request_code_rejects_other_emails() {
        let app = TestApp::new();
        let res = app
            .router()
            .oneshot(json_request("POST", "/api/auth/code", json!({"email": "x@y.com"}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn request_code_then_verify_sets_cookie_and_consumes_code() {
        let app = TestApp::new();
        let res = app
            .router()
            .oneshot(json_request(
                "POST",
                "/api/auth/code",
                json!({"email": ADMIN_EMAIL.to_uppercase()}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let stored = app.store.get_auth_code(ADMIN_EMAIL).await.unwrap().unwrap();
        let mails = app.mailer.sent();
        assert_eq!(mails.len(), 1);
        assert!(mails[0].text.contains(&stored.code));

        let res = app
            .router()
            .oneshot(json_request(
                "POST",
                "/api/auth/verify",
                json!({"email": ADMIN_EMAIL, "code": stored.code}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("auth_token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));

        // single use
        assert!(app.store.get_auth_code(ADMIN_EMAIL).await.unwrap().is_none());

        // the issued cookie opens admin endpoints
        let token_pair = cookie.split(';').next().unwrap().to_string();
        let res = app
            .router()
            .oneshot(
                Request::get("/api/auth/session")
                    .header(header::COOKIE, token_pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["email"], ADMIN_EMAIL);
        assert_eq!(body["isAdmin"], true);
    }

    #[tokio::test]
    async fn verify_wrong_code_is_unauthorized_and_keeps_code() {
        let app = TestApp::new();
        let now = OffsetDateTime::now_utc();
        app.store
            .put_auth_code(&AuthCode {
                email: ADMIN_EMAIL.into(),
                code: "123456".into(),
                issued_at: now,
                expires_at: now + Duration::minutes(10),
            })
            .await
            .unwrap();
        let res = app
            .router()
            .oneshot(json_request(
                "POST",
                "/api/auth/verify",
                json!({"email": ADMIN_EMAIL, "code": "654321"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        assert!(app.store.get_auth_code(ADMIN_EMAIL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repeated_wrong_codes_discard_the_code() {
        let app = TestApp::new();
        let now = OffsetDateTime::now_utc();
        app.store
            .put_auth_code(&AuthCode {
                email: ADMIN_EMAIL.into(),
                code: "123456".into(),
                issued_at: now,
                expires_at: now + Duration::minutes(10),
            })
            .await
            .unwrap();
        let verify = |code: &str| {
            json_request(
                "POST",
                "/api/auth/verify",
                json!({"email": ADMIN_EMAIL, "code": code}),
                None,
            )
        };

        for _ in 0..MAX_VERIFY_ATTEMPTS {
            let res = app.router().oneshot(verify("000000")).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
        assert!(app.store.get_auth_code(ADMIN_EMAIL).await.unwrap().is_none());

        // the right code no longer works once discarded
        let res = app.router().oneshot(verify("123456")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn new_code_resets_failed_attempts() {
        let app = TestApp::new();
        let now = OffsetDateTime::now_utc();
        let code = AuthCode {
            email: ADMIN_EMAIL.into(),
            code: "123456".into(),
            issued_at: now,
            expires_at: now + Duration::minutes(10),
        };
        app.store.put_auth_code(&code).await.unwrap();
        for _ in 1..MAX_VERIFY_ATTEMPTS {
            app.store.record_failed_attempt(ADMIN_EMAIL).await.unwrap();
        }
        app.store.put_auth_code(&code).await.unwrap();

        let res = app
            .router()
            .oneshot(json_request(
                "POST",
                "/api/auth/verify",
                json!({"email": ADMIN_EMAIL, "code": "000000"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(app.store.get_auth_code(ADMIN_EMAIL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn verify_expired_code_is_unauthorized() {
        let app = TestApp::new();
        let issued = OffsetDateTime::now_utc() - Duration::minutes(30);
        app.store
            .put_auth_code(&AuthCode {
                email: ADMIN_EMAIL.into(),
                code: "123456".into(),
                issued_at: issued,
                expires_at: issued + Duration::minutes(10),
            })
            .await
            .unwrap();
        let res = app
            .router()
            .oneshot(json_request(
                "POST",
                "/api/auth/verify",
                json!({"email": ADMIN_EMAIL, "code": "123456"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_without_code_on_file_is_not_found() {
        let app = TestApp::new();
        let res = app
            .router()
            .oneshot(json_request(
                "POST",
                "/api/auth/verify",
                json!({"email": ADMIN_EMAIL, "code": "123456"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .router()
            .oneshot(json_request("POST", "/api/auth/verify", json!({"email": ADMIN_EMAIL}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_endpoint_distinguishes_missing_malformed_and_forged() {
        let app = TestApp::new();
        let get = |cookie: Option<&str>| {
            let mut req = Request::get("/api/auth/session");
            if let Some(c) = cookie {
                req = req.header(header::COOKIE, c);
            }
            req.body(Body::empty()).unwrap()
        };

        let res = app.router().oneshot(get(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.router().oneshot(get(Some("auth_token=garbage"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let forged = crate::test_utils::cookie_signed_with("wrong-secret", true);
        let res = app.router().oneshot(get(Some(&forged))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.router().oneshot(get(Some(&admin_cookie()))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = TestApp::new();
        let res = app
            .router()
            .oneshot(Request::post("/api/auth/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
