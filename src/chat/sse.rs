//! Incremental decoding of the chat stream framing
//!
//! The chat endpoint answers with SSE-shaped text: `event: <name>` lines set
//! the kind of the `data: <payload>` lines that follow. Decoding happens in
//! two stages:
//!
//! 1. [`LineBuffer`] turns arbitrarily chunked bytes into complete lines.
//!    The trailing fragment of every chunk is kept until its newline
//!    arrives, so line (and UTF-8 sequence) boundaries never depend on
//!    network chunk boundaries.
//! 2. [`EventParser`] runs the line state machine and yields
//!    [`StreamAction`]s.
//!
//! Parser states are `None`, `Meta`, `Error` and `Done`. `event:` lines move
//! between them; a `data:` line is interpreted under the current state, and
//! under `Meta` or `Error` the state returns to `None` afterwards. `Done` is
//! terminal.

use bytes::BytesMut;
use serde_json::Value;

use crate::chat::types::ChatMeta;

/// Sentinel payload ending the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Object fields marking the end-of-stream timing record.
const TIMING_FIELDS: [&str; 3] = ["response_time", "response_time_ms", "processing_time"];

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

/// Longest unterminated line the stream consumer buffers before giving up.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reassembles lines from a chunked byte stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no `\n`.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped. Only the bytes not
    /// searched by an earlier call are scanned for a terminator.
    ///
    /// # Examples
    ///
    /// ```
    /// use botdesk::chat::sse::LineBuffer;
    ///
    /// let mut lines = LineBuffer::new();
    /// assert!(lines.push(b"data: He").is_empty());
    /// assert_eq!(lines.push(b"llo\ndata: x"), vec!["data: Hello".to_string()]);
    /// assert_eq!(lines.finish(), Some("data: x".to_string()));
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let raw = self.buffer.split_to(pos + 1);
            lines.push(decode_line(&raw[..pos]));
            self.scanned = 0;
        }
        self.scanned = self.buffer.len();
        lines
    }

    /// Bytes of the unterminated line held so far.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the unterminated remainder once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.scanned = 0;
        let raw = self.buffer.split();
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

// ---------------------------------------------------------------------------
// Payload decoding
// ---------------------------------------------------------------------------

/// Interpretation of one `data:` payload outside the `error` state.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    /// A JSON object carrying `contexts`.
    Metadata(ChatMeta),
    /// End-of-stream timing bookkeeping; never shown.
    Timing,
    /// Text to append: a JSON string's value, otherwise the raw payload.
    Token(String),
}

impl DataPayload {
    /// Decodes `payload` into exactly one of the three outcomes.
    ///
    /// # Examples
    ///
    /// ```
    /// use botdesk::chat::sse::DataPayload;
    ///
    /// assert!(matches!(DataPayload::decode(r#"{"contexts":["a"]}"#), DataPayload::Metadata(_)));
    /// assert_eq!(DataPayload::decode(r#"{"response_time":1.2}"#), DataPayload::Timing);
    /// assert_eq!(DataPayload::decode(r#""quoted""#), DataPayload::Token("quoted".into()));
    /// assert_eq!(DataPayload::decode("plain text"), DataPayload::Token("plain text".into()));
    /// ```
    pub fn decode(payload: &str) -> Self {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(object)) if object.contains_key("contexts") => {
                Self::Metadata(ChatMeta::from_object(object))
            }
            Ok(Value::Object(object)) if TIMING_FIELDS.iter().any(|f| object.contains_key(*f)) => {
                Self::Timing
            }
            Ok(Value::String(text)) => Self::Token(text),
            _ => Self::Token(payload.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// EventParser
// ---------------------------------------------------------------------------

/// Current `event:` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    #[default]
    None,
    Meta,
    Error,
    Done,
}

impl EventKind {
    fn from_name(name: &str) -> Self {
        match name {
            "meta" | "metadata" => Self::Meta,
            "error" => Self::Error,
            "done" => Self::Done,
            _ => Self::None,
        }
    }
}

/// What the consumer must do for one line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamAction {
    Token(String),
    Meta(ChatMeta),
    /// A server-reported error; each `data:` line is one complete message.
    Error(String),
    /// Terminal marker (`event: done` or `data: [DONE]`).
    Done,
}

/// Line-level state machine of the chat stream.
#[derive(Debug, Default)]
pub struct EventParser {
    kind: EventKind,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one complete line.
    pub fn feed_line(&mut self, line: &str) -> Option<StreamAction> {
        if line.trim().is_empty() {
            return None;
        }

        if let Some(name) = line.strip_prefix("event:") {
            self.kind = EventKind::from_name(name.trim());
            return (self.kind == EventKind::Done).then_some(StreamAction::Done);
        }

        let raw = line.strip_prefix("data:")?;
        let payload = raw.strip_prefix(' ').unwrap_or(raw);
        if payload.trim() == DONE_SENTINEL {
            return Some(StreamAction::Done);
        }

        match self.kind {
            EventKind::Error => {
                self.kind = EventKind::None;
                Some(StreamAction::Error(payload.to_string()))
            }
            EventKind::Done => None,
            EventKind::Meta => {
                self.kind = EventKind::None;
                match DataPayload::decode(payload) {
                    DataPayload::Metadata(meta) => Some(StreamAction::Meta(meta)),
                    DataPayload::Timing | DataPayload::Token(_) => None,
                }
            }
            EventKind::None => match DataPayload::decode(payload) {
                DataPayload::Metadata(meta) => Some(StreamAction::Meta(meta)),
                DataPayload::Timing => None,
                DataPayload::Token(text) if text.is_empty() => None,
                DataPayload::Token(text) => Some(StreamAction::Token(text)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> Vec<StreamAction> {
        let mut lines = LineBuffer::new();
        let mut parser = EventParser::new();
        let mut actions: Vec<StreamAction> = lines
            .push(input.as_bytes())
            .iter()
            .filter_map(|l| parser.feed_line(l))
            .collect();
        if let Some(rest) = lines.finish() {
            actions.extend(parser.feed_line(&rest));
        }
        actions
    }

    #[test]
    fn test_line_buffer_keeps_partial_utf8_across_chunks() {
        let text = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut lines = LineBuffer::new();
        assert!(lines.push(&text[..split]).is_empty());
        assert_eq!(lines.push(&text[split..]), vec!["data: héllo".to_string()]);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_line_buffer_long_line_in_small_chunks() {
        let payload = "x".repeat(10_000);
        let text = format!("data: {}\ndata: tail\n", payload);
        let mut lines = LineBuffer::new();
        let mut out = Vec::new();
        for chunk in text.as_bytes().chunks(7) {
            out.extend(lines.push(chunk));
            assert!(lines.pending() <= "data: ".len() + payload.len() + 1);
        }
        assert_eq!(out, vec![format!("data: {}", payload), "data: tail".to_string()]);
        assert_eq!(lines.pending(), 0);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_line_buffer_strips_crlf() {
        let mut lines = LineBuffer::new();
        assert_eq!(
            lines.push(b"event: meta\r\ndata: x\r\n"),
            vec!["event: meta".to_string(), "data: x".to_string()]
        );
    }

    #[test]
    fn test_meta_without_event_line_is_metadata() {
        let actions = parse_all("data: {\"contexts\":[\"doc1\"]}\n");
        assert!(matches!(&actions[..], [StreamAction::Meta(m)] if m.contexts == ["doc1"]));
    }

    #[test]
    fn test_tokens_under_meta_are_suppressed_and_state_resets() {
        let actions = parse_all("event: meta\ndata: not metadata\ndata: visible\n");
        assert_eq!(actions, vec![StreamAction::Token("visible".to_string())]);
    }

    #[test]
    fn test_error_event_yields_each_line_as_message() {
        let actions = parse_all("event: error\ndata: quota exceeded\ndata: after\n");
        assert_eq!(
            actions,
            vec![
                StreamAction::Error("quota exceeded".to_string()),
                StreamAction::Token("after".to_string()),
            ]
        );
    }

    #[test]
    fn test_done_event_and_sentinel() {
        assert_eq!(parse_all("event: done\n"), vec![StreamAction::Done]);
        assert_eq!(parse_all("data: [DONE]\n"), vec![StreamAction::Done]);
    }

    #[test]
    fn test_timing_record_is_ignored() {
        assert!(parse_all("data: {\"response_time\": 0.82}\n").is_empty());
    }

    #[test]
    fn test_only_one_leading_space_is_stripped() {
        assert_eq!(
            parse_all("data:  world\n"),
            vec![StreamAction::Token(" world".to_string())]
        );
        assert_eq!(
            parse_all("data:tight\n"),
            vec![StreamAction::Token("tight".to_string())]
        );
    }

    #[test]
    fn test_other_fields_and_comments_ignored() {
        assert!(parse_all(": keep-alive\nid: 7\nretry: 1000\n\n").is_empty());
    }

    #[test]
    fn test_unterminated_final_line_is_parsed() {
        assert_eq!(
            parse_all("data: tail"),
            vec![StreamAction::Token("tail".to_string())]
        );
    }
}
