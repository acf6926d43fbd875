//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use botdesk::chat::{ChatMeta, ChatStreamHandler};
use botdesk::notify::CollectingNotifier;
use botdesk::session::store::MemoryCredentialStore;
use botdesk::session::{ProjectContext, SessionContext, TokenPair};
use botdesk::{ApiClient, BotdeskError};

pub const API_PREFIX: &str = "/api/v1";

/// Empty session backed by memory.
pub fn empty_session() -> Arc<SessionContext> {
    Arc::new(SessionContext::new(Arc::new(MemoryCredentialStore::new())))
}

/// Session with tokens `access`/`refresh` and no project.
pub fn signed_in_session(access: &str, refresh: &str) -> Arc<SessionContext> {
    let session = empty_session();
    session
        .start_session(TokenPair::new(access, refresh), None)
        .expect("memory store never fails");
    session
}

/// Selects project `p-1` with `key`.
pub fn with_project_key(session: &SessionContext, key: &str) {
    session.pin_project(ProjectContext::new("p-1", Some(key.to_string())));
}

/// Client for `server_uri` with the `/api/v1` prefix and a collecting
/// notifier.
pub fn client_for(
    server_uri: &str,
    session: Arc<SessionContext>,
) -> (ApiClient, Arc<CollectingNotifier>) {
    let notifier = Arc::new(CollectingNotifier::new());
    let client = ApiClient::new(
        &format!("{}{}", server_uri, API_PREFIX),
        Duration::from_secs(5),
        session,
    )
    .expect("valid base url")
    .with_notifier(notifier.clone());
    (client, notifier)
}

/// Full request path including the API prefix.
pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

/// Writes `contents` to `config.yaml` inside a fresh temp dir.
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// One observed stream callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Token(String),
    Meta(Vec<String>),
    Complete,
    Error(String),
}

/// Handler that records every callback. Optionally cancels `cancel_on` once
/// `cancel_after` tokens have arrived.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub calls: Vec<Call>,
    pub cancel_on: Option<CancellationToken>,
    pub cancel_after: usize,
    tokens_seen: usize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling(token: CancellationToken, after_tokens: usize) -> Self {
        Self {
            cancel_on: Some(token),
            cancel_after: after_tokens,
            ..Self::default()
        }
    }

    pub fn terminal_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Complete | Call::Error(_)))
            .count()
    }
}

impl ChatStreamHandler for RecordingHandler {
    fn on_token(&mut self, token: &str) {
        self.calls.push(Call::Token(token.to_string()));
        self.tokens_seen += 1;
        if let Some(cancel) = &self.cancel_on {
            if self.tokens_seen >= self.cancel_after {
                cancel.cancel();
            }
        }
    }

    fn on_meta(&mut self, meta: &ChatMeta) {
        self.calls.push(Call::Meta(meta.contexts.clone()));
    }

    fn on_complete(&mut self) {
        self.calls.push(Call::Complete);
    }

    fn on_error(&mut self, error: BotdeskError) {
        self.calls.push(Call::Error(error.to_string()));
    }
}

/// Serves exactly one HTTP request on a local port, answering with a
/// chunked `text/event-stream` body written as the given network chunks.
///
/// Each chunk is flushed separately with a pause in between so the client
/// observes the chunk boundaries. With `hold_open`, the connection stays
/// open after the last chunk until the client goes away.
///
/// Returns the server's base URI (no path).
pub async fn serve_chunked(chunks: Vec<Vec<u8>>, hold_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request(&mut socket).await;

        let head = "HTTP/1.1 200 OK\r\n\
                    Content-Type: text/event-stream\r\n\
                    Transfer-Encoding: chunked\r\n\
                    Connection: close\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for chunk in chunks {
            let mut frame = format!("{:X}\r\n", chunk.len()).into_bytes();
            frame.extend_from_slice(&chunk);
            frame.extend_from_slice(b"\r\n");
            if socket.write_all(&frame).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        if hold_open {
            // Wait for the client to drop the connection.
            let mut buf = [0u8; 64];
            let _ = tokio::time::timeout(Duration::from_secs(10), socket.read(&mut buf)).await;
            return;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
        let _ = socket.flush().await;
    });

    format!("http://{}", addr)
}

/// Reads request headers and a `Content-Length` body.
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);
        let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= end + 4 + length {
            return;
        }
    }
}

/// Splits `body` into three chunks at the given byte offsets.
pub fn three_chunks(body: &[u8], first: usize, second: usize) -> Vec<Vec<u8>> {
    vec![
        body[..first].to_vec(),
        body[first..second].to_vec(),
        body[second..].to_vec(),
    ]
}
