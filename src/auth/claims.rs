use serde::{Deserialize, Serialize};

/// JWT payload carried in the `auth_token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String, // admin email
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}
