//! Typed REST endpoints of the platform
//!
//! Each submodule adds `impl ApiClient` methods for one resource family.
//! Every call goes through [`ApiClient::send`](crate::http::ApiClient::send),
//! so credential injection, 401 recovery and notifications apply uniformly.
//!
//! Project-scoped calls (conversations, chat, documents) fail fast with
//! [`BotdeskError::MissingApiKey`](crate::error::BotdeskError::MissingApiKey)
//! when no project key is selected.

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod documents;
pub mod notifications;
pub mod projects;

pub use auth::{Credentials, LoginResponse, SignupRequest};
pub use conversations::{Conversation, Message};
pub use documents::{Document, SearchHit};
pub use notifications::Notification;
pub use projects::{ApiKeyInfo, CreatedApiKey, Project};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{BotdeskError, Result};
use crate::http::ApiClient;

impl ApiClient {
    /// Fails with [`BotdeskError::MissingApiKey`] unless a project key is
    /// selected.
    pub(crate) fn require_project_key(&self) -> Result<()> {
        if self.session().project_api_key().is_none() {
            return Err(BotdeskError::MissingApiKey.into());
        }
        Ok(())
    }

    /// Fails with [`BotdeskError::NotAuthenticated`] unless logged in.
    pub(crate) fn require_session(&self) -> Result<()> {
        if !self.session().is_authenticated() {
            return Err(BotdeskError::NotAuthenticated.into());
        }
        Ok(())
    }
}

/// List endpoints answer with either a bare array or `{"items": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(
            alias = "conversations",
            alias = "messages",
            alias = "documents",
            alias = "notifications"
        )]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { items } => items,
        }
    }
}

/// Deserializes an optional timestamp, accepting RFC 3339 as well as naive
/// ISO-8601 (taken as UTC). Unparseable values become `None`.
pub(crate) fn timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    match NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Ok(Some(naive.and_utc())),
        Err(_) => {
            tracing::debug!(value = %raw, "Ignoring unparseable timestamp");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::conversations::Conversation;

    #[derive(Deserialize)]
    struct Stamped {
        #[serde(default, deserialize_with = "timestamp")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_timestamp_accepts_naive_and_offset_forms() {
        let a: Stamped = serde_json::from_str(r#"{"at":"2024-05-01T10:00:00Z"}"#).unwrap();
        let b: Stamped = serde_json::from_str(r#"{"at":"2024-05-01T10:00:00.123456"}"#).unwrap();
        assert_eq!(a.at.unwrap().timestamp(), b.at.unwrap().timestamp());

        let missing: Stamped = serde_json::from_str("{}").unwrap();
        assert!(missing.at.is_none());
        let garbage: Stamped = serde_json::from_str(r#"{"at":"yesterday"}"#).unwrap();
        assert!(garbage.at.is_none());
        let null: Stamped = serde_json::from_str(r#"{"at":null}"#).unwrap();
        assert!(null.at.is_none());
    }

    #[test]
    fn test_listing_accepts_both_shapes() {
        let bare: Listing<Conversation> = serde_json::from_str(r#"[{"id": 1}]"#).unwrap();
        assert_eq!(bare.into_vec()[0].id, "1");

        let wrapped: Listing<Conversation> =
            serde_json::from_str(r#"{"conversations": [{"id": "c1", "title": "Hi"}], "total": 1}"#)
                .unwrap();
        let items = wrapped.into_vec();
        assert_eq!(items[0].title.as_deref(), Some("Hi"));
    }
}
