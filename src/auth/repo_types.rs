use time::OffsetDateTime;

/// One-time login code; at most one per email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCode {
    pub email: String,
    pub code: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl AuthCode {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}
