use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    routing::{delete, get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::{token_from_cookie_header, AuthUser},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        sessions,
    },
    error::{ApiError, ApiResult},
    images::{self, UploadItem},
    response::ApiResponse,
    state::AppState,
    users::{
        dto::{ChangePasswordRequest, LoginData, LoginRequest, RefreshRequest, TokenPair, UpdateDetailsRequest},
        repo::{self, Identity, NewUser, UserRole},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_access_token))
        .route("/changePassword", post(change_password))
        .route("/updateDetails", post(update_details))
        .route("/currentUser", get(current_user))
        .route("/updateAvatar", post(update_avatar))
        .route("/updateCoverImage", post(update_cover_image))
        .route("/deleteUser", delete(delete_user))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn cookie(name: &str, value: &str, max_age_secs: u64) -> anyhow::Result<HeaderValue> {
    let value = format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        name, value, max_age_secs
    );
    Ok(HeaderValue::from_str(&value)?)
}

fn auth_cookie_headers(keys: &JwtKeys, access: &str, refresh: &str) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, cookie("accessToken", access, keys.access_ttl.as_secs())?);
    headers.append(SET_COOKIE, cookie("refreshToken", refresh, keys.refresh_ttl.as_secs())?);
    Ok(headers)
}

fn clear_auth_cookie_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("accessToken=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0"),
    );
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("refreshToken=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0"),
    );
    headers
}

/// Sign an access/refresh pair and persist the refresh token as the user's
/// single active session.
async fn issue_token_pair(
    state: &AppState,
    user_id: Uuid,
    email: &str,
    username: &str,
) -> ApiResult<(String, String)> {
    let keys = JwtKeys::from_ref(state);
    let fail = |e: anyhow::Error| {
        error!(error = %e, user_id = %user_id, "token issuance failed");
        ApiError::internal("Something went wrong while generating access and refresh tokens")
    };
    let access = keys.sign_access(user_id, email, username).map_err(fail)?;
    let refresh = keys.sign_refresh(user_id).map_err(fail)?;
    let expires_at =
        OffsetDateTime::now_utc() + TimeDuration::seconds(keys.refresh_ttl.as_secs() as i64);
    sessions::store(&state.db, user_id, &refresh, expires_at)
        .await
        .map_err(fail)?;
    Ok((access, refresh))
}

async fn read_upload(field: axum::extract::multipart::Field<'_>) -> ApiResult<UploadItem> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    let body = field
        .bytes()
        .await
        .map_err(|_| ApiError::bad_request("Malformed multipart body"))?;
    Ok(UploadItem { body, content_type })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|_| ApiError::bad_request("Malformed multipart body"))
}

#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> ApiResult<ApiResponse<Identity>> {
    let mut email = None;
    let mut username = None;
    let mut password = None;
    let mut role = None;
    let mut phone = None;
    let mut avatar = None;
    let mut cover_image = None;

    while let Ok(Some(field)) = mp.next_field().await {
        match field.name().map(|s| s.to_string()).as_deref() {
            Some("email") => email = Some(read_text(field).await?),
            Some("username") => username = Some(read_text(field).await?),
            Some("password") => password = Some(read_text(field).await?),
            Some("role") => role = Some(read_text(field).await?),
            Some("phone") => phone = Some(read_text(field).await?),
            Some("avatar") => avatar = Some(read_upload(field).await?),
            Some("coverImage") => cover_image = Some(read_upload(field).await?),
            _ => {}
        }
    }

    let (Some(email), Some(username), Some(password), Some(role), Some(phone)) =
        (email, username, password, role, phone)
    else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    let email = email.trim().to_lowercase();
    let username = username.trim().to_lowercase();
    let phone = phone.trim().to_string();
    if [&email, &username, &password, &role, &phone]
        .iter()
        .any(|f| f.is_empty())
    {
        return Err(ApiError::bad_request("All fields are required"));
    }

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }

    if password.len() < 6 {
        warn!("password too short");
        return Err(ApiError::bad_request(
            "Password must be at least 6 characters long",
        ));
    }

    let role: UserRole = role
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Role must be donor or recipient"))?;

    if let Ok(Some(_)) =
        repo::find_by_email_or_username(&state.db, Some(email.as_str()), Some(username.as_str()))
            .await
    {
        warn!(email = %email, username = %username, "duplicate registration");
        return Err(ApiError::conflict(
            "User with given email or username already exists",
        ));
    }

    let Some(avatar) = avatar else {
        return Err(ApiError::bad_request("Avatar image is required"));
    };

    let user_id = Uuid::new_v4();
    let prefix = format!("users/{}", user_id);

    let avatar_url = images::stage_upload(&state, &prefix, "avatar", &avatar)
        .await
        .map_err(|e| {
            error!(error = %e, "avatar upload failed");
            ApiError::internal("Error while uploading avatar image")
        })?;

    let mut staged = vec![avatar_url.clone()];
    let cover_image_url = match cover_image {
        Some(item) => match images::stage_upload(&state, &prefix, "cover", &item).await {
            Ok(url) => {
                staged.push(url.clone());
                Some(url)
            }
            Err(e) => {
                error!(error = %e, "cover image upload failed");
                images::discard_many(&state, &staged).await;
                return Err(ApiError::internal("Error while uploading cover image"));
            }
        },
        None => None,
    };

    let hash = match hash_password(&password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            images::discard_many(&state, &staged).await;
            return Err(ApiError::internal("Something went wrong while registering user"));
        }
    };

    let created = repo::create(
        &state.db,
        NewUser {
            id: user_id,
            username,
            email,
            password_hash: hash,
            role,
            phone,
            avatar_url,
            cover_image_url,
        },
    )
    .await;

    match created {
        Ok(identity) => {
            info!(user_id = %identity.id, email = %identity.email, "user registered");
            Ok(ApiResponse::created(identity, "User registered successfully"))
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            // reclaim the staged uploads before reporting the failure
            images::discard_many(&state, &staged).await;
            match e.downcast::<sqlx::Error>() {
                Ok(db_err) => Err(db_err.into()),
                Err(_) => Err(ApiError::internal("Something went wrong while registering user")),
            }
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(HeaderMap, ApiResponse<LoginData>)> {
    let email = payload.email.map(|e| e.trim().to_lowercase());
    let username = payload.username.map(|u| u.trim().to_lowercase());

    if email.is_none() && username.is_none() {
        return Err(ApiError::bad_request("Username or email is required"));
    }

    let user = repo::find_by_email_or_username(&state.db, email.as_deref(), username.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, "user lookup failed");
            ApiError::internal("Internal server error")
        })?
        .ok_or_else(|| {
            warn!("login for unknown user");
            ApiError::not_found("User not found")
        })?;

    let Some(password) = payload.password else {
        return Err(ApiError::bad_request("Password is required"));
    };

    let ok = verify_password(&password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        ApiError::internal("Internal server error")
    })?;

    if !ok {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(ApiError::unauthorized("Invalid password"));
    }

    let (access_token, refresh_token) =
        issue_token_pair(&state, user.id, &user.email, &user.username).await?;

    let keys = JwtKeys::from_ref(&state);
    let headers = auth_cookie_headers(&keys, &access_token, &refresh_token)?;

    info!(user_id = %user.id, "user logged in");
    Ok((
        headers,
        ApiResponse::ok(
            LoginData {
                user: user.into(),
                access_token,
                refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<(HeaderMap, ApiResponse<serde_json::Value>)> {
    sessions::clear(&state.db, identity.id).await.map_err(|e| {
        error!(error = %e, user_id = %identity.id, "failed to clear refresh session");
        ApiError::internal("Internal server error")
    })?;

    info!(user_id = %identity.id, "user logged out");
    Ok((
        clear_auth_cookie_headers(),
        ApiResponse::ok(serde_json::json!({}), "User logged out successfully"),
    ))
}

#[instrument(skip(state, headers, payload))]
pub async fn refresh_access_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> ApiResult<(HeaderMap, ApiResponse<TokenPair>)> {
    let incoming = headers
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| token_from_cookie_header(h, "refreshToken"))
        .or_else(|| payload.and_then(|Json(p)| p.refresh_token))
        .ok_or_else(|| ApiError::unauthorized("Unauthorized access"))?;

    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&incoming)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user = repo::find_by_id(&state.db, claims.sub)
        .await
        .map_err(|e| {
            error!(error = %e, "user lookup failed");
            ApiError::internal("Internal server error")
        })?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token - user not found"))?;

    let fail = |e: anyhow::Error| {
        error!(error = %e, user_id = %user.id, "token issuance failed");
        ApiError::internal("Something went wrong while generating access and refresh tokens")
    };
    let access_token = keys
        .sign_access(user.id, &user.email, &user.username)
        .map_err(fail)?;
    let refresh_token = keys.sign_refresh(user.id).map_err(fail)?;
    let expires_at =
        OffsetDateTime::now_utc() + TimeDuration::seconds(keys.refresh_ttl.as_secs() as i64);

    // One conditional update: only the currently stored token rotates, so a
    // replayed or superseded token fails here.
    let rotated = sessions::rotate(&state.db, user.id, &incoming, &refresh_token, expires_at)
        .await
        .map_err(fail)?;
    if rotated.is_none() {
        warn!(user_id = %user.id, "stale or reused refresh token");
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let headers = auth_cookie_headers(&keys, &access_token, &refresh_token)?;
    info!(user_id = %user.id, "access token refreshed");
    Ok((
        headers,
        ApiResponse::ok(
            TokenPair {
                access_token,
                refresh_token,
            },
            "Access token refreshed successfully",
        ),
    ))
}

#[instrument(skip(state, identity, payload), fields(user_id = %identity.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let (Some(old_password), Some(new_password)) = (payload.old_password, payload.new_password)
    else {
        return Err(ApiError::bad_request(
            "Old password and new password are required",
        ));
    };

    if old_password == new_password {
        return Err(ApiError::bad_request(
            "New password must be different from old password",
        ));
    }

    let user = repo::find_by_id(&state.db, identity.id)
        .await
        .map_err(|e| {
            error!(error = %e, "user lookup failed");
            ApiError::internal("Internal server error")
        })?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    let ok = verify_password(&old_password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        ApiError::internal("Internal server error")
    })?;
    if !ok {
        return Err(ApiError::bad_request("Old password is incorrect"));
    }

    let hash = hash_password(&new_password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::internal("Internal server error")
    })?;
    repo::update_password(&state.db, user.id, &hash)
        .await
        .map_err(|e| {
            error!(error = %e, "update_password failed");
            ApiError::internal("Internal server error")
        })?;

    info!(user_id = %user.id, "password changed");
    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    ))
}

#[instrument(skip(state, identity, payload), fields(user_id = %identity.id))]
pub async fn update_details(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<UpdateDetailsRequest>,
) -> ApiResult<ApiResponse<Identity>> {
    let username = payload.username.map(|u| u.trim().to_lowercase());
    let phone = payload.phone.map(|p| p.trim().to_string());

    if username.is_none() && phone.is_none() {
        return Err(ApiError::bad_request(
            "At least one field is required to update",
        ));
    }
    if username.as_deref() == Some("") || phone.as_deref() == Some("") {
        return Err(ApiError::bad_request("Fields must not be empty"));
    }

    let updated = repo::update_details(&state.db, identity.id, username.as_deref(), phone.as_deref())
        .await
        .map_err(|e| match e.downcast::<sqlx::Error>() {
            Ok(db_err) => db_err.into(),
            Err(e) => {
                error!(error = %e, "update_details failed");
                ApiError::internal("Something went wrong while updating user details")
            }
        })?
        .ok_or_else(|| {
            ApiError::internal("Something went wrong while updating user details")
        })?;

    info!(user_id = %updated.id, "user details updated");
    Ok(ApiResponse::ok(updated, "User details updated successfully"))
}

#[instrument(skip(identity), fields(user_id = %identity.id))]
pub async fn current_user(AuthUser(identity): AuthUser) -> ApiResult<ApiResponse<Identity>> {
    Ok(ApiResponse::ok(
        identity,
        "Current user fetched successfully",
    ))
}

#[instrument(skip(state, identity, mp), fields(user_id = %identity.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    mut mp: Multipart,
) -> ApiResult<ApiResponse<Identity>> {
    let mut upload = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("avatar") {
            upload = Some(read_upload(field).await?);
        }
    }
    let Some(upload) = upload else {
        return Err(ApiError::bad_request("Avatar image is required"));
    };

    let prefix = format!("users/{}", identity.id);
    let new_url = images::stage_upload(&state, &prefix, "avatar", &upload)
        .await
        .map_err(|e| {
            error!(error = %e, "avatar upload failed");
            ApiError::internal("Error while uploading avatar image")
        })?;

    let committed = repo::update_avatar(&state.db, identity.id, &new_url).await;
    let updated = match committed {
        Ok(Some(updated)) => updated,
        other => {
            if let Err(e) = &other {
                error!(error = %e, "update_avatar failed");
            }
            images::discard_by_url(&state, &new_url).await;
            return Err(ApiError::internal("Something went wrong while updating avatar"));
        }
    };

    // delete-after-swap: the old object is gone only once the new URL is
    // committed; a failed delete is logged inside discard_by_url
    images::discard_by_url(&state, &identity.avatar_url).await;

    info!(user_id = %updated.id, "avatar updated");
    Ok(ApiResponse::ok(updated, "Avatar updated successfully"))
}

#[instrument(skip(state, identity, mp), fields(user_id = %identity.id))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    mut mp: Multipart,
) -> ApiResult<ApiResponse<Identity>> {
    let mut upload = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("coverImage") {
            upload = Some(read_upload(field).await?);
        }
    }
    let Some(upload) = upload else {
        return Err(ApiError::bad_request("Cover image is required"));
    };

    let prefix = format!("users/{}", identity.id);
    let new_url = images::stage_upload(&state, &prefix, "cover", &upload)
        .await
        .map_err(|e| {
            error!(error = %e, "cover image upload failed");
            ApiError::internal("Error while uploading cover image")
        })?;

    let committed = repo::update_cover_image(&state.db, identity.id, &new_url).await;
    let updated = match committed {
        Ok(Some(updated)) => updated,
        other => {
            if let Err(e) = &other {
                error!(error = %e, "update_cover_image failed");
            }
            images::discard_by_url(&state, &new_url).await;
            return Err(ApiError::internal(
                "Something went wrong while updating cover image",
            ));
        }
    };

    if let Some(old) = &identity.cover_image_url {
        images::discard_by_url(&state, old).await;
    }

    info!(user_id = %updated.id, "cover image updated");
    Ok(ApiResponse::ok(updated, "Cover image updated successfully"))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<(HeaderMap, ApiResponse<serde_json::Value>)> {
    images::discard_by_url(&state, &identity.avatar_url).await;
    if let Some(cover) = &identity.cover_image_url {
        images::discard_by_url(&state, cover).await;
    }

    sessions::clear(&state.db, identity.id).await.map_err(|e| {
        error!(error = %e, "failed to clear refresh session");
        ApiError::internal("Internal server error")
    })?;

    let deleted = repo::delete(&state.db, identity.id).await.map_err(|e| {
        error!(error = %e, "delete user failed");
        ApiError::internal("Internal server error")
    })?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = %identity.id, "user deleted");
    Ok((
        clear_auth_cookie_headers(),
        ApiResponse::ok(serde_json::json!({}), "User deleted successfully"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    #[test]
    fn email_validation_accepts_plausible_addresses() {
        assert!(is_valid_email("ann@x.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
    }

    #[test]
    fn auth_cookies_are_http_only_and_secure() {
        let keys = JwtKeys::new(&JwtConfig {
            secret: "s".into(),
            issuer: "i".into(),
            audience: "a".into(),
            ttl_minutes: 60,
            refresh_ttl_minutes: 120,
        });
        let headers = auth_cookie_headers(&keys, "acc.tok", "ref.tok").unwrap();
        let cookies: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("accessToken=acc.tok;"));
        assert!(cookies[1].starts_with("refreshToken=ref.tok;"));
        for c in &cookies {
            assert!(c.contains("HttpOnly"));
            assert!(c.contains("Secure"));
            assert!(c.contains("SameSite=Lax"));
        }
        assert!(cookies[0].contains("Max-Age=3600"));
        assert!(cookies[1].contains("Max-Age=7200"));
    }

    #[test]
    fn clearing_cookies_expires_them_immediately() {
        let headers = clear_auth_cookie_headers();
        let cookies: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
        assert!(cookies[0].starts_with("accessToken=;"));
        assert!(cookies[1].starts_with("refreshToken=;"));
    }
}
