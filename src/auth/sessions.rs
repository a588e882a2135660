use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

/// One active refresh token per user. Issuing a new pair overwrites the row;
/// rotation only succeeds against the token currently stored, so a stale or
/// replayed token loses the conditional update and is rejected.

/// Upsert the active refresh token for a user (login, and the winning side
/// of a rotation both land here).
pub async fn store(
    db: &PgPool,
    user_id: Uuid,
    token: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_sessions (user_id, token, expires_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
            SET token = EXCLUDED.token,
                rotations = refresh_sessions.rotations + 1,
                expires_at = EXCLUDED.expires_at,
                updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(expires_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Swap `old_token` for `new_token` in a single conditional update. Returns
/// the rotation counter on success, `None` when the stored token does not
/// match (stale, replayed, or expired) so the caller can reject the refresh.
pub async fn rotate(
    db: &PgPool,
    user_id: Uuid,
    old_token: &str,
    new_token: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<Option<i64>> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        UPDATE refresh_sessions
           SET token = $3,
               rotations = rotations + 1,
               expires_at = $4,
               updated_at = now()
         WHERE user_id = $1
           AND token = $2
           AND expires_at > now()
        RETURNING rotations
        "#,
    )
    .bind(user_id)
    .bind(old_token)
    .bind(new_token)
    .bind(expires_at)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(rotations,)| rotations))
}

/// Drop the session entirely (logout, account deletion).
pub async fn clear(db: &PgPool, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM refresh_sessions WHERE user_id = $1"#)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}
