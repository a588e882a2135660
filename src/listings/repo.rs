use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "listing_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Available,
    Claimed,
    Expired,
}

impl FromStr for ListingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "claimed" => Ok(Self::Claimed),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    pub photos: Vec<String>,
    pub donor_id: Uuid,
    pub claimed_by: Option<Uuid>,
    pub pickup_address: String,
    pub expiry_date: OffsetDateTime,
    pub status: ListingStatus,
    pub claimed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The only legal transition out of `available` other than expiry. Failure
/// tells the handler whether the listing is missing or merely lost the race.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("listing not found")]
    NotFound,
    #[error("listing is not available")]
    NotAvailable,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

const LISTING_COLUMNS: &str = "id, title, description, quantity, photos, donor_id, claimed_by, \
     pickup_address, expiry_date, status, claimed_at, created_at, updated_at";

pub struct NewListing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    pub photos: Vec<String>,
    pub donor_id: Uuid,
    pub pickup_address: String,
    pub expiry_date: OffsetDateTime,
    pub status: ListingStatus,
}

pub async fn create(db: &PgPool, listing: NewListing) -> anyhow::Result<Listing> {
    let created = sqlx::query_as::<_, Listing>(&format!(
        r#"
        INSERT INTO listings
            (id, title, description, quantity, photos, donor_id, pickup_address, expiry_date, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {LISTING_COLUMNS}
        "#,
    ))
    .bind(listing.id)
    .bind(&listing.title)
    .bind(&listing.description)
    .bind(listing.quantity)
    .bind(&listing.photos)
    .bind(listing.donor_id)
    .bind(&listing.pickup_address)
    .bind(listing.expiry_date)
    .bind(listing.status)
    .fetch_one(db)
    .await?;
    Ok(created)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Listing>> {
    let listing = sqlx::query_as::<_, Listing>(&format!(
        r#"SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"#,
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(listing)
}

/// Claimable feed: available and not yet past expiry, newest first.
pub async fn list_available(
    db: &PgPool,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Listing>> {
    let rows = sqlx::query_as::<_, Listing>(&format!(
        r#"
        SELECT {LISTING_COLUMNS}
          FROM listings
         WHERE status = 'available' AND expiry_date > now()
         ORDER BY created_at DESC
         LIMIT $1 OFFSET $2
        "#,
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// available -> claimed as a single conditional update. Two concurrent
/// claimants both reach this statement; the row predicate lets exactly one
/// through. A listing already past expiry cannot be claimed even if the
/// sweep has not flipped it yet.
pub async fn claim(db: &PgPool, listing_id: Uuid, recipient_id: Uuid) -> Result<Listing, ClaimError> {
    let claimed = sqlx::query_as::<_, Listing>(&format!(
        r#"
        UPDATE listings
           SET status = 'claimed',
               claimed_by = $2,
               claimed_at = now(),
               updated_at = now()
         WHERE id = $1
           AND status = 'available'
           AND expiry_date > now()
        RETURNING {LISTING_COLUMNS}
        "#,
    ))
    .bind(listing_id)
    .bind(recipient_id)
    .fetch_optional(db)
    .await?;

    if let Some(listing) = claimed {
        return Ok(listing);
    }

    let (exists,): (bool,) =
        sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM listings WHERE id = $1)"#)
            .bind(listing_id)
            .fetch_one(db)
            .await?;
    if exists {
        Err(ClaimError::NotAvailable)
    } else {
        Err(ClaimError::NotFound)
    }
}

/// Time-driven sweep: flip everything past expiry to expired. Returns the
/// number of listings transitioned.
pub async fn expire_overdue(db: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE listings
           SET status = 'expired', updated_at = now()
         WHERE status <> 'expired' AND expiry_date <= now()
        "#,
    )
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_from_lowercase_names() {
        assert_eq!("available".parse::<ListingStatus>(), Ok(ListingStatus::Available));
        assert_eq!("claimed".parse::<ListingStatus>(), Ok(ListingStatus::Claimed));
        assert_eq!("expired".parse::<ListingStatus>(), Ok(ListingStatus::Expired));
        assert!("done".parse::<ListingStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ListingStatus::Available).unwrap(),
            serde_json::json!("available")
        );
    }
}
