use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use tracing::warn;

use super::jwt::{SessionKeys, TokenError};
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "auth_token";

/// Verified administrator session taken from the `auth_token` cookie.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub email: String,
}

/// Value of `name` across every `Cookie` header on the request.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()))
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

pub fn session_cookie(token: &str, ttl_minutes: i64, secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::minutes(ttl_minutes))
        .build()
        .to_string()
}

pub fn clear_session_cookie(secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::ZERO)
        .build()
        .to_string()
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, SESSION_COOKIE)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Unauthorized: No token provided"))?;

        let keys = SessionKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|e| match e {
            TokenError::Malformed => {
                warn!("malformed session token");
                ApiError::bad_request("Malformed session token")
            }
            TokenError::Invalid => {
                warn!("invalid or expired session token");
                ApiError::unauthorized("Unauthorized: Invalid token")
            }
        })?;

        if !claims.is_admin {
            warn!(email = %claims.sub, "session without admin rights");
            return Err(ApiError::unauthorized("Unauthorized: Admin access required"));
        }

        Ok(AdminSession { email: claims.sub })
    }
}
