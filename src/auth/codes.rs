use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;

/// Login codes are valid for this many minutes.
pub const LOGIN_CODE_TTL_MINUTES: i64 = 10;

/// Wrong guesses allowed before a login code is discarded.
pub const MAX_VERIFY_ATTEMPTS: u32 = 5;

const SECRET_CODE_LEN: usize = 16;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Six decimal digits, never with a leading zero.
pub fn login_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Per-invoice access code embedded in payment links.
pub fn secret_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_CODE_LEN)
        .map(char::from)
        .collect()
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("owner@builder.com"));
        assert!(!is_valid_email("owner@builder"));
        assert!(!is_valid_email("owner builder@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn login_code_is_six_digits() {
        for _ in 0..100 {
            let code = login_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn secret_codes_are_alphanumeric_and_distinct() {
        let a = secret_code();
        let b = secret_code();
        assert_eq!(a.len(), SECRET_CODE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc", "abc123"));
    }
}
