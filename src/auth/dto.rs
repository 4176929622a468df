use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RequestCodeRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub email: String,
    pub is_admin: bool,
}
