//! Conversation history (project key)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::api::{timestamp, Listing};
use crate::error::Result;
use crate::http::{ApiClient, ApiRequest};
use crate::session::id_string;

/// Summary of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_count: Option<u64>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn conversation_path(conversation_id: &str) -> String {
    format!("/conversations/{}", encode(conversation_id))
}

impl ApiClient {
    pub async fn list_conversations(&self, limit: Option<u32>) -> Result<Vec<Conversation>> {
        self.require_project_key()?;
        let mut request = ApiRequest::get("/conversations");
        if let Some(limit) = limit {
            request = request.query("limit", limit);
        }
        let listing: Listing<Conversation> = self.send_json(request).await?;
        Ok(listing.into_vec())
    }

    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.require_project_key()?;
        let path = format!("{}/messages", conversation_path(conversation_id));
        let listing: Listing<Message> = self.get_json(&path).await?;
        Ok(listing.into_vec())
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.require_project_key()?;
        self.send_empty(ApiRequest::delete(conversation_path(conversation_id)))
            .await
    }
}
