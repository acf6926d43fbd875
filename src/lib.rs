//! Botdesk - client library for a multi-tenant chatbot platform
//!
//! This library provides an authenticated HTTP session client, a streaming
//! chat consumer, and the session/project context shared between them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `http`: REST client with credential injection and single-flight token refresh
//! - `chat`: Streaming chat decoding and per-conversation chat sessions
//! - `session`: Token pair, user and project context, credential storage
//! - `api`: Typed REST endpoints (auth, projects, conversations, documents, ...)
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `i18n`: User-facing message catalog
//! - `notify`: User notification sink
//! - `cli` / `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use botdesk::{ApiClient, Config, ChatSession};
//! use botdesk::session::{SessionContext, ProjectContext};
//! use botdesk::session::store::MemoryCredentialStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let session = Arc::new(SessionContext::new(Arc::new(MemoryCredentialStore::new())));
//!     session.pin_project(ProjectContext::new("p-1", Some("bk_live".to_string())));
//!     let client = ApiClient::from_config(&config, session)?;
//!
//!     let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//!     let mut tx = tx;
//!     let mut chat = ChatSession::new(client, config.chat.clone());
//!     let turn = chat.send("Hello", &mut tx).await?;
//!     println!("{}", turn.response_text);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod i18n;
pub mod notify;
pub mod session;

// Re-export commonly used types
pub use chat::{ChatSession, ChatStreamHandler, StreamOutcome};
pub use config::Config;
pub use error::{BotdeskError, Result};
pub use http::ApiClient;
pub use session::{SessionContext, SessionSignal};
