use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// One file pulled out of a multipart body.
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Upload an item under `{prefix}/{stem}-{uuid}.{ext}` and return its public
/// URL. The object is only "staged" at this point: callers commit the URL to
/// the database afterwards and call [`discard_by_url`] if that commit fails.
pub async fn stage_upload(
    st: &AppState,
    prefix: &str,
    stem: &str,
    item: &UploadItem,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(&item.content_type).unwrap_or("bin");
    let key = format!("{}/{}-{}.{}", prefix, stem, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, item.body.clone(), &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(st.storage.public_url(&key))
}

/// Best-effort removal of a previously uploaded object. Used both to reclaim
/// staged objects after a failed database write and to drop replaced or
/// orphaned images; failures are logged, never surfaced.
pub async fn discard_by_url(st: &AppState, url: &str) {
    let Some(key) = st.storage.key_from_url(url) else {
        warn!(%url, "cannot derive storage key from url, skipping delete");
        return;
    };
    if let Err(e) = st.storage.delete_object(&key).await {
        warn!(error = %e, %key, "failed to delete stored object");
    }
}

pub async fn discard_many(st: &AppState, urls: &[String]) {
    for url in urls {
        discard_by_url(st, url).await;
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn ext_from_mime_covers_the_supported_image_types() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("whatever/else"), None);
    }

    #[tokio::test]
    async fn staged_uploads_land_under_the_given_namespace() {
        let state = AppState::fake();
        let item = UploadItem {
            body: Bytes::from_static(b"not-really-a-jpeg"),
            content_type: "image/jpeg".into(),
        };
        let url = stage_upload(&state, "listings/donor/listing", "photo", &item)
            .await
            .unwrap();
        assert!(url.starts_with("https://fake.local/listings/donor/listing/photo-"));
        assert!(url.ends_with(".jpg"));
    }
}
