use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::claims::TokenKind;
use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::{self, Identity};

/// Authenticated request context: the persisted identity resolved from a
/// verified access token, stripped of password hash and refresh token.
/// Constructed once per secured request and handed to handlers by value.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts, "accessToken"))
            .ok_or_else(|| ApiError::unauthorized("Missing access token"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::unauthorized("Invalid or expired token")
        })?;

        if claims.kind != TokenKind::Access {
            return Err(ApiError::unauthorized("Access token required"));
        }

        let identity = repo::find_identity_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %claims.sub, "identity lookup failed");
                ApiError::internal("Internal server error")
            })?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token references a deleted user");
                ApiError::unauthorized("User no longer exists")
            })?;

        Ok(AuthUser(identity))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(|t| t.to_string())
}

fn cookie_token(parts: &Parts, name: &str) -> Option<String> {
    let header = parts
        .headers
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())?;
    token_from_cookie_header(header, name)
}

/// Pull one value out of a `Cookie:` request header.
pub fn token_from_cookie_header(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name && !v.is_empty()).then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_parsing_finds_the_named_value() {
        let header = "theme=dark; accessToken=abc.def.ghi; refreshToken=zzz";
        assert_eq!(
            token_from_cookie_header(header, "accessToken"),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(
            token_from_cookie_header(header, "refreshToken"),
            Some("zzz".to_string())
        );
    }

    #[test]
    fn cookie_header_parsing_misses_absent_or_empty_values() {
        assert_eq!(token_from_cookie_header("theme=dark", "accessToken"), None);
        assert_eq!(token_from_cookie_header("accessToken=", "accessToken"), None);
        assert_eq!(token_from_cookie_header("", "accessToken"), None);
    }
}
