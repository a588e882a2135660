use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    listings::dto::Pagination,
    notifications::{dto::NotificationView, repo},
    response::ApiResponse,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/markNotificationRead/:id", post(mark_notification_read))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Query(p): Query<Pagination>,
) -> ApiResult<ApiResponse<Vec<NotificationView>>> {
    let rows = repo::list_by_user(&state.db, identity.id, p.limit, p.offset)
        .await
        .map_err(|e| {
            error!(error = %e, "list notifications failed");
            ApiError::internal("Internal server error")
        })?;
    let views = rows.into_iter().map(NotificationView::from).collect();
    Ok(ApiResponse::ok(views, "Notifications fetched successfully"))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<NotificationView>> {
    let updated = repo::mark_read(&state.db, id, identity.id)
        .await
        .map_err(|e| {
            error!(error = %e, %id, "mark notification read failed");
            ApiError::internal("Internal server error")
        })?
        .ok_or_else(|| ApiError::not_found("Notification not found"))?;
    Ok(ApiResponse::ok(
        updated.into(),
        "Notification marked as read",
    ))
}
