use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::listings::repo::{Listing, ListingStatus};

/// Listing as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    pub food_photos: Vec<String>,
    pub donor_id: Uuid,
    pub claimed_by: Option<Uuid>,
    pub pickup_address: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_date: OffsetDateTime,
    pub status: ListingStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub claimed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Listing> for ListingView {
    fn from(l: Listing) -> Self {
        Self {
            id: l.id,
            title: l.title,
            description: l.description,
            quantity: l.quantity,
            food_photos: l.photos,
            donor_id: l.donor_id,
            claimed_by: l.claimed_by,
            pickup_address: l.pickup_address,
            expiry_date: l.expiry_date,
            status: l.status,
            claimed_at: l.claimed_at,
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn listing_view_serializes_camel_case() {
        let view = ListingView {
            id: Uuid::new_v4(),
            title: "Fresh bread".into(),
            description: "Six loaves".into(),
            quantity: 6,
            food_photos: vec!["https://fake.local/listings/a/photo-b.jpg".into()],
            donor_id: Uuid::new_v4(),
            claimed_by: None,
            pickup_address: "12 Baker St".into(),
            expiry_date: datetime!(2026-09-01 12:00 UTC),
            status: ListingStatus::Available,
            claimed_at: None,
            created_at: datetime!(2026-08-01 08:30 UTC),
            updated_at: datetime!(2026-08-01 08:30 UTC),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["foodPhotos"][0], "https://fake.local/listings/a/photo-b.jpg");
        assert_eq!(json["pickupAddress"], "12 Baker St");
        assert_eq!(json["status"], "available");
        assert_eq!(json["expiryDate"], "2026-09-01T12:00:00Z");
        assert!(json["claimedBy"].is_null());
        assert!(json["claimedAt"].is_null());
    }

    #[test]
    fn pagination_defaults_apply() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }
}
