//! Chat request/response types and the stream callback interface

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::config::ChatConfig;
use crate::error::BotdeskError;
use crate::session::opt_id_string;

/// Body of a chat request (streaming or not).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    pub stream: bool,
}

impl ChatRequest {
    /// A streaming request with server-side generation defaults.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            temperature: None,
            max_tokens: None,
            top_k: None,
            stream: true,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Applies generation parameters from configuration.
    pub fn with_params(mut self, params: &ChatConfig) -> Self {
        self.temperature = Some(params.temperature);
        self.max_tokens = Some(params.max_tokens);
        self.top_k = Some(params.top_k);
        self
    }
}

/// Non-streaming chat reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(alias = "answer")]
    pub response: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub contexts: Vec<Value>,
}

/// Retrieval metadata sent ahead of (or alongside) the generated tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatMeta {
    pub conversation_id: Option<String>,
    pub contexts: Vec<String>,
    /// Fields this client does not interpret.
    pub extra: Map<String, Value>,
}

impl ChatMeta {
    /// Builds metadata from a decoded JSON object.
    ///
    /// `contexts` entries that are not strings are kept as their JSON text;
    /// a numeric `conversation_id` is converted to a string.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let contexts = match object.remove("contexts") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        let conversation_id = match object.remove("conversation_id") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            conversation_id,
            contexts,
            extra: object,
        }
    }
}

/// Receives the events of one chat stream.
///
/// After `on_complete` or `on_error` no further method is called.
pub trait ChatStreamHandler: Send {
    fn on_token(&mut self, token: &str);
    fn on_meta(&mut self, meta: &ChatMeta);
    fn on_complete(&mut self);
    fn on_error(&mut self, error: BotdeskError);
}

/// Stream events as values, for callers that prefer a channel.
#[derive(Debug)]
pub enum ChatStreamEvent {
    Token(String),
    Meta(ChatMeta),
    Complete,
    Error(BotdeskError),
}

impl ChatStreamHandler for mpsc::UnboundedSender<ChatStreamEvent> {
    fn on_token(&mut self, token: &str) {
        let _ = self.send(ChatStreamEvent::Token(token.to_string()));
    }

    fn on_meta(&mut self, meta: &ChatMeta) {
        let _ = self.send(ChatStreamEvent::Meta(meta.clone()));
    }

    fn on_complete(&mut self) {
        let _ = self.send(ChatStreamEvent::Complete);
    }

    fn on_error(&mut self, error: BotdeskError) {
        let _ = self.send(ChatStreamEvent::Error(error));
    }
}

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Terminal marker seen or the body ended.
    Completed,
    /// The caller cancelled; reported to the handler as completion.
    Cancelled,
    /// `on_error` was called.
    Failed,
}
