//! User-facing message catalog
//!
//! Errors shown to the user are resolved through a [`MessageCatalog`]. The
//! built-in texts are English; individual keys can be overridden from the
//! `messages:` section of the configuration file, which is how deployments
//! ship translated strings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifies one user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    Network,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    RateLimited,
    ServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    Unknown,
    InvalidApiKey,
    SessionExpired,
    StreamFailed,
}

impl MessageKey {
    /// Maps an HTTP status to the catalog key used when the server did not
    /// send its own `detail`.
    pub fn for_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            413 => Self::PayloadTooLarge,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            _ => Self::Unknown,
        }
    }

    fn default_text(self) -> &'static str {
        match self {
            Self::Network => "Network error: unable to reach the server",
            Self::BadRequest => "The request was invalid",
            Self::Unauthorized => "You are not authorized to perform this action",
            Self::Forbidden => "You do not have permission to access this resource",
            Self::NotFound => "The requested resource was not found",
            Self::PayloadTooLarge => "The uploaded file is too large",
            Self::RateLimited => "Too many requests, please slow down",
            Self::ServerError => "Internal server error",
            Self::BadGateway => "Bad gateway",
            Self::ServiceUnavailable => "Service temporarily unavailable",
            Self::GatewayTimeout => "The server took too long to respond",
            Self::Unknown => "An unexpected error occurred",
            Self::InvalidApiKey => "The project API key is invalid or has been revoked",
            Self::SessionExpired => "Your session has expired, please log in again",
            Self::StreamFailed => "The response stream was interrupted",
        }
    }
}

/// Resolves [`MessageKey`]s to display text.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    overrides: HashMap<MessageKey, String>,
}

impl MessageCatalog {
    /// Builds a catalog with the given per-key overrides.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use botdesk::i18n::{MessageCatalog, MessageKey};
    ///
    /// let mut overrides = HashMap::new();
    /// overrides.insert(MessageKey::NotFound, "Không tìm thấy".to_string());
    /// let catalog = MessageCatalog::with_overrides(overrides);
    /// assert_eq!(catalog.get(MessageKey::NotFound), "Không tìm thấy");
    /// ```
    pub fn with_overrides(overrides: HashMap<MessageKey, String>) -> Self {
        Self { overrides }
    }

    /// Returns the text for `key`.
    pub fn get(&self, key: MessageKey) -> &str {
        self.overrides
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_text())
    }

    /// Message for a failed response: the server's own detail wins over the
    /// catalog text.
    pub fn for_response(&self, status: u16, detail: Option<&str>) -> String {
        match detail {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => self.get(MessageKey::for_status(status)).to_string(),
        }
    }
}

/// Extracts a human-readable detail from an error body.
///
/// Accepts `{"detail": "..."}`, validation-style
/// `{"detail": [{"msg": "..."}, ...]}`, and `{"message": "..."}`.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        _ => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}
