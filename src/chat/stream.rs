//! Streaming chat consumer
//!
//! [`ApiClient::send_chat_message_stream`] POSTs a [`ChatRequest`] to the
//! streaming endpoint and feeds the chunked response through
//! [`LineBuffer`] and [`EventParser`], dispatching to a
//! [`ChatStreamHandler`].
//!
//! Guarantees:
//!
//! - tokens reach the handler in framing order, independent of how the
//!   bytes were chunked on the wire;
//! - exactly one of `on_complete`/`on_error` is called, and nothing after it;
//! - cancellation is reported as `on_complete`, never as `on_error`, and no
//!   token or metadata callback fires once the token is cancelled;
//! - the stream has no request timeout.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat::sse::{EventParser, LineBuffer, StreamAction, MAX_LINE_BYTES};
use crate::chat::types::{ChatMeta, ChatRequest, ChatStreamHandler, StreamOutcome};
use crate::error::BotdeskError;
use crate::http::{ApiClient, API_KEY_HEADER};
use crate::i18n::{extract_detail, MessageKey};

/// Streaming chat endpoint, relative to the API base URL.
pub const CHAT_STREAM_PATH: &str = "/chat/stream";

/// Enforces the terminal-callback rules around a handler.
struct Dispatcher<'a> {
    handler: &'a mut dyn ChatStreamHandler,
    cancel: &'a CancellationToken,
    finished: bool,
}

impl<'a> Dispatcher<'a> {
    fn new(handler: &'a mut dyn ChatStreamHandler, cancel: &'a CancellationToken) -> Self {
        Self {
            handler,
            cancel,
            finished: false,
        }
    }

    fn token(&mut self, text: &str) {
        if !self.finished && !self.cancel.is_cancelled() {
            self.handler.on_token(text);
        }
    }

    fn meta(&mut self, meta: &ChatMeta) {
        if !self.finished && !self.cancel.is_cancelled() {
            self.handler.on_meta(meta);
        }
    }

    fn complete(&mut self) -> StreamOutcome {
        if !self.finished {
            self.finished = true;
            self.handler.on_complete();
        }
        StreamOutcome::Completed
    }

    fn cancelled(&mut self) -> StreamOutcome {
        tracing::debug!("Chat stream cancelled by caller");
        self.complete();
        StreamOutcome::Cancelled
    }

    fn fail(&mut self, error: BotdeskError) -> StreamOutcome {
        if self.cancel.is_cancelled() {
            return self.cancelled();
        }
        if !self.finished {
            self.finished = true;
            tracing::warn!(error = %error, "Chat stream failed");
            self.handler.on_error(error);
        }
        StreamOutcome::Failed
    }

    /// Applies one parsed action; returns the outcome if it ended the stream.
    fn apply(&mut self, action: StreamAction) -> Option<StreamOutcome> {
        if self.cancel.is_cancelled() {
            return Some(self.cancelled());
        }
        match action {
            StreamAction::Token(text) => {
                self.token(&text);
                None
            }
            StreamAction::Meta(meta) => {
                self.meta(&meta);
                None
            }
            StreamAction::Error(message) => Some(self.fail(BotdeskError::Stream(message))),
            StreamAction::Done => Some(self.complete()),
        }
    }
}

impl ApiClient {
    /// Sends `request` to the streaming chat endpoint and delivers the reply
    /// to `handler`.
    ///
    /// The request is authenticated with `api_key` only. All results are
    /// reported through the handler; the returned [`StreamOutcome`] mirrors
    /// which terminal callback fired.
    pub async fn send_chat_message_stream(
        &self,
        request: &ChatRequest,
        api_key: &str,
        handler: &mut dyn ChatStreamHandler,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let mut out = Dispatcher::new(handler, cancel);
        if cancel.is_cancelled() {
            return out.cancelled();
        }

        let builder = self
            .http()
            .post(self.endpoint(CHAT_STREAM_PATH))
            .header(API_KEY_HEADER, api_key)
            .header("Accept", "text/event-stream")
            .json(request);
        let builder = self.with_common_headers(builder);

        tracing::debug!(
            conversation_id = ?request.conversation_id,
            "Opening chat stream"
        );
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return out.cancelled(),
            sent = builder.send() => sent,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Chat stream connection failed");
                let message = self.messages().get(MessageKey::Network).to_string();
                return out.fail(BotdeskError::Network(message));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return out.cancelled(),
                body = response.text() => body.unwrap_or_else(|e| {
                    tracing::debug!(error = %e, "Could not read error body");
                    String::new()
                }),
            };
            let message = self
                .messages()
                .for_response(status.as_u16(), extract_detail(&body).as_deref());
            return out.fail(BotdeskError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes_stream();
        tokio::pin!(bytes);
        let mut lines = LineBuffer::new();
        let mut parser = EventParser::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return out.cancelled(),
                next = bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for line in lines.push(&chunk) {
                        if let Some(action) = parser.feed_line(&line) {
                            if let Some(outcome) = out.apply(action) {
                                return outcome;
                            }
                        }
                    }
                    if lines.pending() > MAX_LINE_BYTES {
                        tracing::warn!(pending = lines.pending(), "Chat stream line too long");
                        let message = self.messages().get(MessageKey::StreamFailed).to_string();
                        return out.fail(BotdeskError::Stream(message));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Chat stream read failed");
                    let message = self.messages().get(MessageKey::StreamFailed).to_string();
                    return out.fail(BotdeskError::Network(message));
                }
                None => {
                    if let Some(rest) = lines.finish() {
                        if let Some(action) = parser.feed_line(&rest) {
                            if let Some(outcome) = out.apply(action) {
                                return outcome;
                            }
                        }
                    }
                    tracing::debug!("Chat stream ended without a terminal marker");
                    return out.complete();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl ChatStreamHandler for Recorder {
        fn on_token(&mut self, token: &str) {
            self.calls.push(format!("token:{}", token));
        }
        fn on_meta(&mut self, meta: &ChatMeta) {
            self.calls.push(format!("meta:{}", meta.contexts.join(",")));
        }
        fn on_complete(&mut self) {
            self.calls.push("complete".to_string());
        }
        fn on_error(&mut self, error: BotdeskError) {
            self.calls.push(format!("error:{}", error));
        }
    }

    #[test]
    fn test_dispatcher_ignores_calls_after_terminal() {
        let cancel = CancellationToken::new();
        let mut recorder = Recorder::default();
        {
            let mut out = Dispatcher::new(&mut recorder, &cancel);
            assert_eq!(out.apply(StreamAction::Done), Some(StreamOutcome::Completed));
            assert_eq!(out.apply(StreamAction::Token("late".to_string())), None);
            out.fail(BotdeskError::Stream("late".to_string()));
            out.complete();
        }
        assert_eq!(recorder.calls, vec!["complete"]);
    }

    #[test]
    fn test_dispatcher_turns_failure_after_cancel_into_completion() {
        let cancel = CancellationToken::new();
        let mut recorder = Recorder::default();
        {
            let mut out = Dispatcher::new(&mut recorder, &cancel);
            out.token("a");
            cancel.cancel();
            out.token("b");
            assert_eq!(
                out.fail(BotdeskError::Network("reset".to_string())),
                StreamOutcome::Cancelled
            );
        }
        assert_eq!(recorder.calls, vec!["token:a", "complete"]);
    }
}
