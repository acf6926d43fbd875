//! Error types for Botdesk
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.
//!
//! Every variant that reaches a caller carries a message that is already
//! resolved for display (server `detail` text or a catalog message), so UI
//! layers can print `err.to_string()` without further lookup.

use thiserror::Error;

/// Main error type for Botdesk operations
///
/// The first group of variants is the failure taxonomy of the HTTP session
/// client and the streaming chat consumer; the second group wraps library
/// errors from the ambient stack.
#[derive(Error, Debug)]
pub enum BotdeskError {
    /// The project API key was rejected (invalid, expired or revoked).
    ///
    /// The stored key has already been cleared when this is returned; it is
    /// never retried automatically.
    #[error("{0}")]
    ProjectKey(String),

    /// The user session could not be recovered (refresh failed, no refresh
    /// token, or an auth endpoint itself returned 401).
    #[error("{0}")]
    Session(String),

    /// The server reported an error inside a chat stream.
    #[error("{0}")]
    Stream(String),

    /// No response was received at all (connection refused, DNS, timeout).
    #[error("{0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Api {
        /// HTTP status code of the response
        status: u16,
        /// Resolved, translated message for display
        message: String,
    },

    /// A project-scoped call was attempted without an active project key
    #[error("No project API key is selected; choose a project first")]
    MissingApiKey,

    /// A session-scoped call was attempted while logged out
    #[error("Not logged in")]
    NotAuthenticated,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage errors
    #[error("Credential store error: {0}")]
    Store(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl BotdeskError {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::ProjectKey(_) | Self::Session(_) => Some(401),
            _ => None,
        }
    }
}

/// Result type alias for Botdesk operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need to branch on the failure class use
/// `err.downcast_ref::<BotdeskError>()`.
pub type Result<T> = anyhow::Result<T>;
