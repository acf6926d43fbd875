//! Per-conversation chat driver
//!
//! A [`ChatSession`] sends messages for one conversation. Each
//! [`ChatSession::send`] is one ephemeral chat stream session: it resolves the
//! active project key, owns a fresh [`CancellationToken`], accumulates the
//! reply into a [`ChatTurn`], and adopts the conversation id the server
//! assigns. Starting a send cancels whatever stream the session still had
//! open, so callbacks of an old stream never interleave with a new one.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::chat::types::{ChatMeta, ChatRequest, ChatStreamHandler, StreamOutcome};
use crate::config::ChatConfig;
use crate::error::{BotdeskError, Result};
use crate::http::ApiClient;
use crate::session::SessionSignal;

/// Result of one send.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub conversation_id: Option<String>,
    pub response_text: String,
    pub contexts: Vec<String>,
    pub outcome: StreamOutcome,
    /// Display message when `outcome` is [`StreamOutcome::Failed`].
    pub error: Option<String>,
}

/// Cancels the stream currently running in a [`ChatSession`].
#[derive(Debug, Clone, Default)]
pub struct ChatCanceller {
    active: Arc<Mutex<ActiveStream>>,
}

#[derive(Debug, Default)]
struct ActiveStream {
    generation: u64,
    token: Option<CancellationToken>,
}

impl ChatCanceller {
    fn lock(&self) -> MutexGuard<'_, ActiveStream> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancels the in-flight stream, if any. Returns `true` if one was
    /// running.
    pub fn cancel(&self) -> bool {
        match self.lock().token.as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Installs `token` as the active stream, cancelling the previous one.
    fn replace(&self, token: CancellationToken) -> u64 {
        let mut active = self.lock();
        if let Some(previous) = active.token.replace(token) {
            previous.cancel();
        }
        active.generation += 1;
        active.generation
    }

    /// Forgets the stream started as `generation` unless a newer one exists.
    fn clear(&self, generation: u64) {
        let mut active = self.lock();
        if active.generation == generation {
            active.token = None;
        }
    }
}

/// Wraps the caller's handler and records the turn.
struct TurnRecorder<'a> {
    inner: &'a mut dyn ChatStreamHandler,
    response_text: String,
    contexts: Vec<String>,
    conversation_id: Option<String>,
    error: Option<String>,
    key_rejected: bool,
}

impl ChatStreamHandler for TurnRecorder<'_> {
    fn on_token(&mut self, token: &str) {
        self.response_text.push_str(token);
        self.inner.on_token(token);
    }

    fn on_meta(&mut self, meta: &ChatMeta) {
        self.contexts.extend(meta.contexts.iter().cloned());
        if meta.conversation_id.is_some() {
            self.conversation_id = meta.conversation_id.clone();
        }
        self.inner.on_meta(meta);
    }

    fn on_complete(&mut self) {
        self.inner.on_complete();
    }

    fn on_error(&mut self, error: BotdeskError) {
        if matches!(error, BotdeskError::Api { status: 401, .. }) {
            self.key_rejected = true;
        }
        self.error = Some(error.to_string());
        self.inner.on_error(error);
    }
}

/// Sends messages within one conversation.
#[derive(Debug)]
pub struct ChatSession {
    client: ApiClient,
    params: ChatConfig,
    conversation_id: Option<String>,
    canceller: ChatCanceller,
}

impl ChatSession {
    /// Starts a new conversation; the server assigns its id on first send.
    pub fn new(client: ApiClient, params: ChatConfig) -> Self {
        Self {
            client,
            params,
            conversation_id: None,
            canceller: ChatCanceller::default(),
        }
    }

    /// Continues an existing conversation.
    pub fn resume(client: ApiClient, params: ChatConfig, conversation_id: String) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            ..Self::new(client, params)
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Handle that cancels whichever send is running.
    pub fn canceller(&self) -> ChatCanceller {
        self.canceller.clone()
    }

    /// Sends `message` and streams the reply to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`BotdeskError::MissingApiKey`] without touching the network
    /// when no project key is selected. Stream failures are not errors of
    /// this function; they are reported to `handler` and in the returned
    /// [`ChatTurn`].
    pub async fn send(
        &mut self,
        message: &str,
        handler: &mut dyn ChatStreamHandler,
    ) -> Result<ChatTurn> {
        let api_key = self
            .client
            .session()
            .project_api_key()
            .ok_or(BotdeskError::MissingApiKey)?;

        let cancel = CancellationToken::new();
        let generation = self.canceller.replace(cancel.clone());

        let request = ChatRequest::new(message)
            .with_conversation(self.conversation_id.clone())
            .with_params(&self.params);

        let mut recorder = TurnRecorder {
            inner: handler,
            response_text: String::new(),
            contexts: Vec::new(),
            conversation_id: None,
            error: None,
            key_rejected: false,
        };
        let outcome = self
            .client
            .send_chat_message_stream(&request, &api_key, &mut recorder, &cancel)
            .await;
        self.canceller.clear(generation);

        if recorder.key_rejected {
            self.client.session().raise(SessionSignal::ProjectAuthError {
                message: recorder.error.clone().unwrap_or_default(),
            });
        }
        if let Some(id) = recorder.conversation_id.take() {
            self.conversation_id = Some(id);
        }

        tracing::debug!(
            ?outcome,
            chars = recorder.response_text.len(),
            "Chat turn finished"
        );
        Ok(ChatTurn {
            conversation_id: self.conversation_id.clone(),
            response_text: recorder.response_text,
            contexts: recorder.contexts,
            outcome,
            error: recorder.error,
        })
    }
}
