//! Account notifications (session)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::api::{timestamp, Listing};
use crate::error::Result;
use crate::http::{ApiClient, ApiRequest};
use crate::session::id_string;

/// A server-side notification for the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default, alias = "read")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ApiClient {
    pub async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        self.require_session()?;
        let mut request = ApiRequest::get("/notifications");
        if unread_only {
            request = request.query("unread_only", true);
        }
        let listing: Listing<Notification> = self.send_json(request).await?;
        Ok(listing.into_vec())
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        self.require_session()?;
        let path = format!("/notifications/{}/read", encode(notification_id));
        self.send_empty(ApiRequest::patch(path)).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        self.require_session()?;
        self.send_empty(ApiRequest::post("/notifications/read-all"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_read_alias() {
        let n: Notification =
            serde_json::from_str(r#"{"id": 1, "message": "Quota at 80%", "read": true}"#).unwrap();
        assert!(n.is_read);
        assert!(n.title.is_none());
    }
}
