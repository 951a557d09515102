use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

// -- JWT Claims --

/// Claims carried by the short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub iat: usize,
    pub exp: usize,
}

/// Claims carried by the refresh token. `jti` makes every issued token unique,
/// so a rotation never hands back the token it replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

// -- Envelope --

/// Uniform success body: `{status, data, message, success}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn new(status: u16, data: T, message: impl Into<String>) -> Self {
        Self {
            status,
            data,
            message: message.into(),
            success: status < 400,
        }
    }
}

/// Placeholder payload for responses that carry no data (`{}` on the wire).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// -- Account --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_marks_client_errors_unsuccessful() {
        assert!(ApiResponse::new(200, Empty {}, "ok").success);
        assert!(!ApiResponse::new(409, Empty {}, "taken").success);
    }

    #[test]
    fn empty_payload_serializes_as_object() {
        let body = serde_json::to_value(ApiResponse::new(200, Empty {}, "User logged out")).unwrap();
        assert_eq!(body["data"], serde_json::json!({}));
        assert_eq!(body["status"], 200);
    }

    #[test]
    fn refresh_request_accepts_missing_token() {
        let req: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(req.refresh_token.is_none());
    }
}
