use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::SessionClaims;
use crate::{config::JwtConfig, state::AppState};

/// Why a session token was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// Not a structurally valid JWT.
    #[error("malformed session token")]
    Malformed,
    /// Well formed, but the signature, expiry, issuer or audience is wrong.
    #[error("invalid or expired session token")]
    Invalid,
}

#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl SessionKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
        }
    }

    pub fn sign(&self, email: &str, is_admin: bool) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = SessionClaims {
            sub: email.to_string(),
            is_admin,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(email = %email, is_admin, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Malformed,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(email = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        SessionKeys::new(&state.config.jwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str, issuer: &str, audience: &str) -> SessionKeys {
        SessionKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            cookie_secure: false,
        })
    }

    #[test]
    fn sign_and_verify_session() {
        let keys = keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.sign("admin@example.com", true).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin@example.com");
        assert!(claims.is_admin);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = keys("dev-secret", "iss", "aud");
        assert_eq!(keys.verify("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(keys.verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn wrong_secret_issuer_or_audience_is_invalid() {
        let good = keys("same-secret", "good-iss", "good-aud");
        let token = good.sign("admin@example.com", true).unwrap();
        assert_eq!(
            keys("other-secret", "good-iss", "good-aud").verify(&token),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            keys("same-secret", "bad-iss", "good-aud").verify(&token),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            keys("same-secret", "good-iss", "bad-aud").verify(&token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_token_is_invalid() {
        let keys = keys("dev-secret", "iss", "aud");
        let past = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = SessionClaims {
            sub: "admin@example.com".into(),
            is_admin: true,
            iat: past.unix_timestamp() as usize,
            exp: (past + TimeDuration::minutes(5)).unix_timestamp() as usize,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert_eq!(keys.verify(&token), Err(TokenError::Invalid));
    }
}
