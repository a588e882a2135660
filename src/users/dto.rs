use serde::{Deserialize, Serialize};

use crate::users::repo::Identity;

/// Request body for login. Accepts either email or username.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Request body for token refresh; the token may come from the cookie
/// instead, in which case the body is empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDetailsRequest {
    pub username: Option<String>,
    pub phone: Option<String>,
}

/// Login response data: the identity plus both tokens (tokens also travel
/// as cookies).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub user: Identity,
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh response data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_request_accepts_camel_case() {
        let req: RefreshRequest =
            serde_json::from_str(r#"{"refreshToken": "abc"}"#).unwrap();
        assert_eq!(req.refresh_token.as_deref(), Some("abc"));

        let empty: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.refresh_token.is_none());
    }

    #[test]
    fn token_pair_serializes_camel_case() {
        let pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }
}
