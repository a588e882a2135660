use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Donor,
    Recipient,
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donor" => Ok(Self::Donor),
            "recipient" => Ok(Self::Recipient),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Donor => write!(f, "donor"),
            Self::Recipient => write!(f, "recipient"),
        }
    }
}

/// Full user record. Only ever serialized with the password hash skipped;
/// handlers that answer requests return [`Identity`] instead.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub phone: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The persisted identity as returned to clients: no password hash, no
/// refresh token.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub phone: String,
    #[serde(rename = "avatar")]
    pub avatar_url: String,
    #[serde(rename = "coverImage")]
    pub cover_image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            phone: user.phone,
            avatar_url: user.avatar_url,
            cover_image_url: user.cover_image_url,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

const IDENTITY_COLUMNS: &str =
    "id, username, email, role, phone, avatar_url, cover_image_url, created_at, updated_at";

pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub phone: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
}

pub async fn create(db: &PgPool, user: NewUser) -> anyhow::Result<Identity> {
    let created = sqlx::query_as::<_, Identity>(&format!(
        r#"
        INSERT INTO users (id, username, email, password_hash, role, phone, avatar_url, cover_image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {IDENTITY_COLUMNS}
        "#,
    ))
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(&user.phone)
    .bind(&user.avatar_url)
    .bind(&user.cover_image_url)
    .fetch_one(db)
    .await?;
    Ok(created)
}

/// Lookup by email or username, whichever is provided (login and the
/// registration uniqueness pre-check).
pub async fn find_by_email_or_username(
    db: &PgPool,
    email: Option<&str>,
    username: Option<&str>,
) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, role, phone,
               avatar_url, cover_image_url, created_at, updated_at
          FROM users
         WHERE email = $1 OR username = $2
        "#,
    )
    .bind(email)
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, role, phone,
               avatar_url, cover_image_url, created_at, updated_at
          FROM users
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_identity_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Identity>> {
    let identity = sqlx::query_as::<_, Identity>(&format!(
        r#"SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1"#,
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(identity)
}

/// Partial profile update; absent fields keep their current value.
pub async fn update_details(
    db: &PgPool,
    id: Uuid,
    username: Option<&str>,
    phone: Option<&str>,
) -> anyhow::Result<Option<Identity>> {
    let identity = sqlx::query_as::<_, Identity>(&format!(
        r#"
        UPDATE users
           SET username = COALESCE($2, username),
               phone = COALESCE($3, phone),
               updated_at = now()
         WHERE id = $1
        RETURNING {IDENTITY_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(username)
    .bind(phone)
    .fetch_optional(db)
    .await?;
    Ok(identity)
}

pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
    sqlx::query(r#"UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1"#)
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn update_avatar(db: &PgPool, id: Uuid, url: &str) -> anyhow::Result<Option<Identity>> {
    let identity = sqlx::query_as::<_, Identity>(&format!(
        r#"
        UPDATE users SET avatar_url = $2, updated_at = now()
         WHERE id = $1
        RETURNING {IDENTITY_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(url)
    .fetch_optional(db)
    .await?;
    Ok(identity)
}

pub async fn update_cover_image(
    db: &PgPool,
    id: Uuid,
    url: &str,
) -> anyhow::Result<Option<Identity>> {
    let identity = sqlx::query_as::<_, Identity>(&format!(
        r#"
        UPDATE users SET cover_image_url = $2, updated_at = now()
         WHERE id = $1
        RETURNING {IDENTITY_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(url)
    .fetch_optional(db)
    .await?;
    Ok(identity)
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_from_lowercase_names() {
        assert_eq!("donor".parse::<UserRole>(), Ok(UserRole::Donor));
        assert_eq!("recipient".parse::<UserRole>(), Ok(UserRole::Recipient));
        assert!("admin".parse::<UserRole>().is_err());
        assert!("Donor".parse::<UserRole>().is_err());
    }

    #[test]
    fn identity_serialization_never_leaks_credentials() {
        let identity = Identity {
            id: Uuid::new_v4(),
            username: "ann".into(),
            email: "ann@x.com".into(),
            role: UserRole::Donor,
            phone: "555-0100".into(),
            avatar_url: "https://fake.local/users/x/avatar.jpg".into(),
            cover_image_url: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["username"], "ann");
        assert_eq!(json["role"], "donor");
        assert_eq!(json["avatar"], "https://fake.local/users/x/avatar.jpg");
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("refreshToken").is_none());
    }

    #[test]
    fn user_serialization_skips_the_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "ann".into(),
            email: "ann@x.com".into(),
            password_hash: "$argon2id$v=19$...".into(),
            role: UserRole::Recipient,
            phone: "555-0100".into(),
            avatar_url: "https://fake.local/a.jpg".into(),
            cover_image_url: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
