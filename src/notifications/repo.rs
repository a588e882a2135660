use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Alert,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub related_listing_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub read_status: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, message, related_listing_id, kind, read_status, created_at, updated_at";

pub async fn create(
    db: &PgPool,
    user_id: Uuid,
    message: &str,
    related_listing_id: Option<Uuid>,
    kind: NotificationKind,
) -> anyhow::Result<Notification> {
    let created = sqlx::query_as::<_, Notification>(&format!(
        r#"
        INSERT INTO notifications (id, user_id, message, related_listing_id, kind)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {NOTIFICATION_COLUMNS}
        "#,
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(message)
    .bind(related_listing_id)
    .bind(kind)
    .fetch_one(db)
    .await?;
    Ok(created)
}

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Notification>> {
    let rows = sqlx::query_as::<_, Notification>(&format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS}
          FROM notifications
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3
        "#,
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Mark one of the user's own notifications as read. `None` when the id does
/// not exist or belongs to someone else.
pub async fn mark_read(
    db: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<Notification>> {
    let updated = sqlx::query_as::<_, Notification>(&format!(
        r#"
        UPDATE notifications
           SET read_status = TRUE, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {NOTIFICATION_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(updated)
}
