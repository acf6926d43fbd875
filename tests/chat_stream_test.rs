//! Streaming chat consumer integration tests
//!
//! Whole-body cases use `wiremock`. Cases that depend on network chunk
//! boundaries or on a connection that stays open use the raw chunked server
//! from `common::serve_chunked`.
//!
//! # wiremock body helpers
//!
//! Use `set_body_raw(bytes, "text/event-stream")` for stream bodies;
//! `set_body_string` would force `text/plain`.

mod common;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use botdesk::chat::sse::{EventParser, LineBuffer, StreamAction, MAX_LINE_BYTES};
use botdesk::chat::{ChatRequest, ChatSession, StreamOutcome};
use botdesk::config::ChatConfig;
use botdesk::session::SessionSignal;
use botdesk::BotdeskError;

use common::{
    api_path, client_for, empty_session, serve_chunked, three_chunks, with_project_key, Call,
    RecordingHandler,
};

const EXAMPLE_STREAM: &str = "event: meta\ndata: {\"contexts\":[\"doc1\"]}\n\n\
                              data: Hel\ndata: lo!\n\n\
                              event: done\ndata: [DONE]\n\n";

fn example_calls() -> Vec<Call> {
    vec![
        Call::Meta(vec!["doc1".to_string()]),
        Call::Token("Hel".to_string()),
        Call::Token("lo!".to_string()),
        Call::Complete,
    ]
}

async fn mount_stream(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path(api_path("/chat/stream")))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

async fn stream_body(body: &str) -> (Vec<Call>, StreamOutcome) {
    let server = MockServer::start().await;
    mount_stream(&server, body).await;
    let (client, _) = client_for(&server.uri(), empty_session());

    let mut handler = RecordingHandler::new();
    let outcome = client
        .send_chat_message_stream(
            &ChatRequest::new("Hello"),
            "bk_live",
            &mut handler,
            &CancellationToken::new(),
        )
        .await;
    (handler.calls, outcome)
}

/// Runs the decoder over `chunks` without any network.
fn decode_chunks(chunks: &[&[u8]]) -> Vec<StreamAction> {
    let mut lines = LineBuffer::new();
    let mut parser = EventParser::new();
    let mut actions = Vec::new();
    for chunk in chunks {
        for line in lines.push(chunk) {
            actions.extend(parser.feed_line(&line));
        }
    }
    if let Some(rest) = lines.finish() {
        actions.extend(parser.feed_line(&rest));
    }
    actions
}

// ---------------------------------------------------------------------------
// Example scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_example_stream_whole_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("/chat/stream")))
        .and(header("X-API-Key", "bk_live"))
        .and(body_partial_json(json!({"message": "Hello", "stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(EXAMPLE_STREAM.as_bytes().to_vec(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (client, _) = client_for(&server.uri(), empty_session());

    let mut handler = RecordingHandler::new();
    let outcome = client
        .send_chat_message_stream(
            &ChatRequest::new("Hello"),
            "bk_live",
            &mut handler,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(handler.calls, example_calls());
}

#[tokio::test]
async fn test_example_stream_over_three_network_chunks() {
    let body = EXAMPLE_STREAM.as_bytes();
    // Splits inside the JSON payload, inside a `data:` prefix and between
    // the two `\n` of a blank line.
    let splits = [(10, 40), (27, 52), (45, 48), (1, body.len() - 1)];

    for (first, second) in splits {
        let base = serve_chunked(three_chunks(body, first, second), false).await;
        let (client, _) = client_for(&base, empty_session());

        let mut handler = RecordingHandler::new();
        let outcome = client
            .send_chat_message_stream(
                &ChatRequest::new("Hello"),
                "bk_live",
                &mut handler,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, StreamOutcome::Completed, "split at {first}/{second}");
        assert_eq!(handler.calls, example_calls(), "split at {first}/{second}");
    }
}

#[test]
fn test_every_three_way_split_decodes_identically() {
    let body = EXAMPLE_STREAM.as_bytes();
    let expected = decode_chunks(&[body]);
    // meta, two tokens, then `event: done` and `data: [DONE]`.
    assert_eq!(expected.len(), 5);

    for first in 0..=body.len() {
        for second in first..=body.len() {
            let actions = decode_chunks(&[&body[..first], &body[first..second], &body[second..]]);
            assert_eq!(actions, expected, "split at {first}/{second}");
        }
    }
}

// ---------------------------------------------------------------------------
// Payload routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_contexts_without_event_line_go_to_meta() {
    let (calls, _) =
        stream_body("data: {\"contexts\":[\"a\",\"b\"],\"conversation_id\":\"c-1\"}\n\ndata: Hi\n\n")
            .await;
    assert_eq!(
        calls,
        vec![
            Call::Meta(vec!["a".to_string(), "b".to_string()]),
            Call::Token("Hi".to_string()),
            Call::Complete,
        ]
    );
}

#[tokio::test]
async fn test_json_string_tokens_and_timing_record() {
    let (calls, outcome) =
        stream_body("data: \"Hello \"\ndata: world\ndata: {\"response_time\": 1.5}\ndata: [DONE]\n")
            .await;
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(
        calls,
        vec![
            Call::Token("Hello ".to_string()),
            Call::Token("world".to_string()),
            Call::Complete,
        ]
    );
}

#[tokio::test]
async fn test_stream_without_terminal_marker_completes() {
    let (calls, outcome) = stream_body("data: partial").await;
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(calls, vec![Call::Token("partial".to_string()), Call::Complete]);
}

// ---------------------------------------------------------------------------
// Terminal callbacks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_nothing_after_done() {
    let (calls, outcome) =
        stream_body("data: a\n\nevent: done\ndata: [DONE]\n\ndata: late\nevent: error\ndata: x\n")
            .await;
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(calls, vec![Call::Token("a".to_string()), Call::Complete]);
}

#[tokio::test]
async fn test_nothing_after_done_while_connection_stays_open() {
    let base = serve_chunked(
        vec![
            b"data: a\n\nevent: done\n".to_vec(),
            b"data: late\n\nevent: error\ndata: x\n".to_vec(),
        ],
        true,
    )
    .await;
    let (client, _) = client_for(&base, empty_session());

    let mut handler = RecordingHandler::new();
    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        client.send_chat_message_stream(
            &ChatRequest::new("Hello"),
            "bk_live",
            &mut handler,
            &CancellationToken::new(),
        ),
    )
    .await
    .expect("stream should finish at the done marker");

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(handler.calls, vec![Call::Token("a".to_string()), Call::Complete]);
}

#[tokio::test]
async fn test_error_event_ends_stream_with_on_error() {
    let (calls, outcome) =
        stream_body("data: Hi\n\nevent: error\ndata: Quota exceeded\n\ndata: ignored\n").await;
    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(
        calls,
        vec![
            Call::Token("Hi".to_string()),
            Call::Error("Quota exceeded".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_unterminated_line_over_limit_fails_stream() {
    let mut body = b"data: ok\n\ndata: ".to_vec();
    body.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES + 16));
    let base = serve_chunked(vec![body], true).await;
    let (client, _) = client_for(&base, empty_session());

    let mut handler = RecordingHandler::new();
    let outcome = client
        .send_chat_message_stream(
            &ChatRequest::new("Hello"),
            "bk_live",
            &mut handler,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(
        handler.calls,
        vec![
            Call::Token("ok".to_string()),
            Call::Error("The response stream was interrupted".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_non_success_status_reports_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("/chat/stream")))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"detail": "Rate limit exceeded"})),
        )
        .mount(&server)
        .await;
    let (client, notifier) = client_for(&server.uri(), empty_session());

    let mut handler = RecordingHandler::new();
    let outcome = client
        .send_chat_message_stream(
            &ChatRequest::new("Hello"),
            "bk_live",
            &mut handler,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(handler.calls, vec![Call::Error("Rate limit exceeded".to_string())]);
    // Stream failures go to the handler only.
    assert!(notifier.take().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_stream_completes_without_error() {
    let base = serve_chunked(vec![b"data: Hel\n\n".to_vec()], true).await;
    let (client, _) = client_for(&base, empty_session());

    let cancel = CancellationToken::new();
    let mut handler = RecordingHandler::cancelling(cancel.clone(), 1);
    let outcome = client
        .send_chat_message_stream(&ChatRequest::new("Hello"), "bk_live", &mut handler, &cancel)
        .await;

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(
        handler.calls,
        vec![Call::Token("Hel".to_string()), Call::Complete]
    );
}

#[tokio::test]
async fn test_cancel_before_start_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let (client, _) = client_for(&server.uri(), empty_session());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut handler = RecordingHandler::new();
    let outcome = client
        .send_chat_message_stream(&ChatRequest::new("Hello"), "bk_live", &mut handler, &cancel)
        .await;

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(handler.calls, vec![Call::Complete]);
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_session_requires_project_key() {
    let (client, _) = client_for("http://127.0.0.1:9", empty_session());
    let mut chat = ChatSession::new(client, ChatConfig::default());

    let mut handler = RecordingHandler::new();
    let err = chat.send("Hello", &mut handler).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BotdeskError>(),
        Some(BotdeskError::MissingApiKey)
    ));
    assert!(handler.calls.is_empty());
}

#[tokio::test]
async fn test_chat_session_adopts_conversation_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("/chat/stream")))
        .and(body_partial_json(json!({"message": "first"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            b"data: {\"contexts\":[],\"conversation_id\":42}\n\ndata: Hi\n\ndata: [DONE]\n".to_vec(),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("/chat/stream")))
        .and(body_partial_json(json!({"message": "second", "conversation_id": "42"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"data: Again\n".to_vec(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = empty_session();
    with_project_key(&session, "bk_live");
    let (client, _) = client_for(&server.uri(), session);
    let mut chat = ChatSession::new(client, ChatConfig::default());

    let mut handler = RecordingHandler::new();
    let turn = chat.send("first", &mut handler).await.unwrap();
    assert_eq!(turn.outcome, StreamOutcome::Completed);
    assert_eq!(turn.response_text, "Hi");
    assert_eq!(turn.conversation_id.as_deref(), Some("42"));
    assert_eq!(chat.conversation_id(), Some("42"));

    let mut handler = RecordingHandler::new();
    let turn = chat.send("second", &mut handler).await.unwrap();
    assert_eq!(turn.response_text, "Again");
}

#[tokio::test]
async fn test_chat_session_rejected_key_raises_project_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("/chat/stream")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid API key"})))
        .mount(&server)
        .await;

    let session = empty_session();
    with_project_key(&session, "bk_revoked");
    let mut signals = session.subscribe();
    let (client, _) = client_for(&server.uri(), session.clone());
    let mut chat = ChatSession::new(client, ChatConfig::default());

    let mut handler = RecordingHandler::new();
    let turn = chat.send("Hello", &mut handler).await.unwrap();

    assert_eq!(turn.outcome, StreamOutcome::Failed);
    assert_eq!(turn.error.as_deref(), Some("Invalid API key"));
    assert_eq!(handler.calls, vec![Call::Error("Invalid API key".to_string())]);
    assert!(session.project_api_key().is_none());
    assert_eq!(
        signals.try_recv().unwrap(),
        SessionSignal::ProjectAuthError {
            message: "Invalid API key".to_string()
        }
    );
}
