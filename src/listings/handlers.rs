use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, post},
    Router,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    images::{self, UploadItem},
    listings::{
        dto::{ListingView, Pagination},
        repo::{self, ClaimError, ListingStatus, NewListing},
    },
    notifications,
    response::ApiResponse,
    state::AppState,
    users::repo::UserRole,
};

const MAX_FOOD_PHOTOS: usize = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/createListing", post(create_listing))
        .route("/claimListing/:id", post(claim_listing))
        .route("/listings", get(list_listings))
        .route("/listings/:id", get(get_listing))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

fn parse_quantity(raw: &str) -> Result<i32, ApiError> {
    let quantity = raw
        .trim()
        .parse::<i32>()
        .map_err(|_| ApiError::bad_request("Quantity must be an integer"))?;
    if quantity < 1 {
        return Err(ApiError::bad_request("Quantity must be at least 1"));
    }
    Ok(quantity)
}

fn parse_expiry(raw: &str) -> Result<OffsetDateTime, ApiError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|_| ApiError::bad_request("expiryDate must be an RFC 3339 timestamp"))
}

#[instrument(skip(state, identity, mp), fields(user_id = %identity.id))]
pub async fn create_listing(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    mut mp: Multipart,
) -> ApiResult<ApiResponse<ListingView>> {
    if identity.role != UserRole::Donor {
        warn!(role = %identity.role, "non-donor attempted to create listing");
        return Err(ApiError::forbidden("Only donors can create listings"));
    }

    let mut title = None;
    let mut description = None;
    let mut quantity = None;
    let mut pickup_address = None;
    let mut expiry_date = None;
    let mut status = None;
    let mut photos: Vec<UploadItem> = Vec::new();

    while let Ok(Some(field)) = mp.next_field().await {
        match field.name().map(|s| s.to_string()).as_deref() {
            Some("title") => title = Some(read_text(field).await?),
            Some("description") => description = Some(read_text(field).await?),
            Some("quantity") => quantity = Some(read_text(field).await?),
            Some("pickupAddress") => pickup_address = Some(read_text(field).await?),
            Some("expiryDate") => expiry_date = Some(read_text(field).await?),
            Some("status") => status = Some(read_text(field).await?),
            Some("foodPhotos") | Some("foodPhotos[]") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("Malformed multipart body"))?;
                photos.push(UploadItem { body, content_type });
            }
            _ => {}
        }
    }

    let (Some(title), Some(description), Some(quantity), Some(pickup_address), Some(expiry_date)) =
        (title, description, quantity, pickup_address, expiry_date)
    else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    let title = title.trim().to_string();
    let description = description.trim().to_string();
    let pickup_address = pickup_address.trim().to_string();
    if title.is_empty() || description.is_empty() || pickup_address.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }

    let quantity = parse_quantity(&quantity)?;
    let expiry_date = parse_expiry(&expiry_date)?;
    let status = match status.as_deref().map(str::trim) {
        None | Some("") => ListingStatus::Available,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid listing status"))?,
    };

    if photos.is_empty() {
        return Err(ApiError::bad_request("Food photo is required"));
    }
    if photos.len() > MAX_FOOD_PHOTOS {
        return Err(ApiError::bad_request("At most 5 food photos are allowed"));
    }

    let listing_id = Uuid::new_v4();
    let prefix = format!("listings/{}/{}", identity.id, listing_id);
    let mut photo_urls = Vec::with_capacity(photos.len());
    for photo in &photos {
        match images::stage_upload(&state, &prefix, "photo", photo).await {
            Ok(url) => photo_urls.push(url),
            Err(e) => {
                error!(error = %e, "food photo upload failed");
                images::discard_many(&state, &photo_urls).await;
                return Err(ApiError::internal(
                    "Something went wrong while uploading food photo",
                ));
            }
        }
    }

    let created = repo::create(
        &state.db,
        NewListing {
            id: listing_id,
            title,
            description,
            quantity,
            photos: photo_urls.clone(),
            donor_id: identity.id,
            pickup_address,
            expiry_date,
            status,
        },
    )
    .await;

    let listing = match created {
        Ok(listing) => listing,
        Err(e) => {
            error!(error = %e, "create listing failed");
            // reclaim the staged uploads before reporting the failure
            images::discard_many(&state, &photo_urls).await;
            return Err(ApiError::internal(
                "Something went wrong while creating listing",
            ));
        }
    };

    info!(listing_id = %listing.id, donor_id = %listing.donor_id, "listing created");
    Ok(ApiResponse::created(
        listing.into(),
        "Listing created successfully",
    ))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn claim_listing(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<ListingView>> {
    if identity.role != UserRole::Recipient {
        warn!(role = %identity.role, "non-recipient attempted to claim listing");
        return Err(ApiError::forbidden("Only recipients can claim listings"));
    }

    let listing = match repo::claim(&state.db, id, identity.id).await {
        Ok(listing) => listing,
        Err(ClaimError::NotFound) => return Err(ApiError::not_found("Listing not found")),
        Err(ClaimError::NotAvailable) => {
            warn!(listing_id = %id, "claim lost or listing unavailable");
            return Err(ApiError::conflict("Listing is no longer available"));
        }
        Err(ClaimError::Db(e)) => return Err(e.into()),
    };

    // best-effort; the claim itself is already committed
    if let Err(e) = notifications::repo::create(
        &state.db,
        listing.donor_id,
        &format!("Your listing \"{}\" has been claimed", listing.title),
        Some(listing.id),
        notifications::repo::NotificationKind::Info,
    )
    .await
    {
        warn!(error = %e, listing_id = %listing.id, "failed to notify donor of claim");
    }

    info!(listing_id = %listing.id, recipient_id = %identity.id, "listing claimed");
    Ok(ApiResponse::ok(
        listing.into(),
        "Listing claimed successfully",
    ))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn list_listings(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Query(p): Query<Pagination>,
) -> ApiResult<ApiResponse<Vec<ListingView>>> {
    let listings = repo::list_available(&state.db, p.limit, p.offset)
        .await
        .map_err(|e| {
            error!(error = %e, "list listings failed");
            ApiError::internal("Internal server error")
        })?;
    let views = listings.into_iter().map(ListingView::from).collect();
    Ok(ApiResponse::ok(views, "Listings fetched successfully"))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn get_listing(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<ListingView>> {
    let listing = repo::find_by_id(&state.db, id)
        .await
        .map_err(|e| {
            error!(error = %e, %id, "get listing failed");
            ApiError::internal("Internal server error")
        })?
        .ok_or_else(|| ApiError::not_found("Listing not found"))?;
    Ok(ApiResponse::ok(
        listing.into(),
        "Listing fetched successfully",
    ))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|_| ApiError::bad_request("Malformed multipart body"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_a_positive_integer() {
        assert_eq!(parse_quantity("3").unwrap(), 3);
        assert_eq!(parse_quantity(" 1 ").unwrap(), 1);
        assert!(parse_quantity("0").is_err());
        assert!(parse_quantity("-2").is_err());
        assert!(parse_quantity("2.5").is_err());
        assert!(parse_quantity("lots").is_err());
    }

    #[test]
    fn expiry_must_be_rfc3339() {
        assert!(parse_expiry("2026-09-01T12:00:00Z").is_ok());
        assert!(parse_expiry("2026-09-01T12:00:00+02:00").is_ok());
        assert!(parse_expiry("tomorrow").is_err());
        assert!(parse_expiry("2026-09-01").is_err());
    }
}
