use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::notifications::repo::{Notification, NotificationKind};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub related_listing_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read_status: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            message: n.message,
            related_listing_id: n.related_listing_id,
            kind: n.kind,
            read_status: n.read_status,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn notification_view_uses_type_for_the_kind() {
        let view = NotificationView {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            message: "Your listing \"Fresh bread\" has been claimed".into(),
            related_listing_id: Some(Uuid::new_v4()),
            kind: NotificationKind::Info,
            read_status: false,
            created_at: datetime!(2026-08-01 08:30 UTC),
            updated_at: datetime!(2026-08-01 08:30 UTC),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "info");
        assert_eq!(json["readStatus"], false);
        assert!(json.get("kind").is_none());
    }
}
