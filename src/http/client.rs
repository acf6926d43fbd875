//! Authenticated REST client with transparent token refresh
//!
//! [`ApiClient`] issues every REST call made by the crate. Each request is
//! decorated with the current credentials:
//!
//! - `Authorization: Bearer <access_token>` when a session exists
//! - `X-API-Key: <key>` when the active project has a key
//! - the tunnel bypass header when the base URL is a tunnel host
//!
//! # 401 handling
//!
//! A 401 is classified by [`classify_unauthorized`]. Project-key failures
//! clear the stored key, raise [`SessionSignal::ProjectAuthError`] and are
//! returned as [`BotdeskError::ProjectKey`]. Session failures on ordinary
//! endpoints are recovered through the shared [`RefreshCoordinator`]: the
//! request is retried exactly once with the new access token. Auth endpoints,
//! retried requests, missing refresh tokens and failed refreshes raise
//! [`SessionSignal::AuthError`] and return [`BotdeskError::Session`].
//!
//! # Other failures
//!
//! Non-success statuses become [`BotdeskError::Api`] and transport failures
//! become [`BotdeskError::Network`]; both carry a catalog-resolved message
//! and are announced through the [`Notifier`] unless the request is silent.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{BotdeskError, Result};
use crate::http::classify::{
    classify_unauthorized, is_auth_endpoint, requires_tunnel_bypass, UnauthorizedKind,
    TUNNEL_BYPASS_HEADER,
};
use crate::http::refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome, RefreshTicket};
use crate::i18n::{extract_detail, MessageCatalog, MessageKey};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::session::{SessionContext, SessionSignal, TokenPair};

/// Header carrying the project API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

const REFRESH_PATH: &str = "/auth/refresh";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A file attached to a multipart request.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Bytes,
    pub mime: Option<String>,
}

/// Request body kept in a re-sendable form so a request can be retried.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart {
        fields: Vec<(String, String)>,
        file: Option<FilePart>,
    },
}

/// Description of one REST call, relative to the API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Silent requests never produce notifications.
    pub silent: bool,
}

impl ApiRequest {
    /// Creates a request. Auth endpoints are silent by default.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let silent = is_auth_endpoint(&path);
        Self {
            method,
            path,
            query: Vec::new(),
            body: RequestBody::Empty,
            silent,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`BotdeskError::Serialization`] if `body` cannot be encoded.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body).map_err(BotdeskError::from)?);
        Ok(self)
    }

    pub fn multipart(mut self, fields: Vec<(String, String)>, file: Option<FilePart>) -> Self {
        self.body = RequestBody::Multipart { fields, file };
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// A non-success response captured for classification.
#[derive(Debug)]
struct Failure {
    status: StatusCode,
    detail: Option<String>,
    body: String,
    sent_api_key: bool,
    sent_token: Option<String>,
}

enum Attempt {
    Success(reqwest::Response),
    Failed(Failure),
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// REST client bound to one platform deployment and one session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    tunnel_bypass: bool,
    session: Arc<SessionContext>,
    refresh: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
    messages: MessageCatalog,
}

impl ApiClient {
    /// Creates a client for `base_url` (which may carry a version prefix such
    /// as `/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns [`BotdeskError::Config`] if `base_url` is not a valid URL or
    /// the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use botdesk::http::ApiClient;
    /// use botdesk::session::SessionContext;
    /// use botdesk::session::store::MemoryCredentialStore;
    ///
    /// let session = Arc::new(SessionContext::new(Arc::new(MemoryCredentialStore::new())));
    /// let client = ApiClient::new("http://localhost:8000/api/v1", Duration::from_secs(30), session);
    /// assert!(client.is_ok());
    /// ```
    pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionContext>) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| BotdeskError::Config(format!("Invalid API base URL: {}", e)))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("botdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BotdeskError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let tunnel_bypass = requires_tunnel_bypass(&parsed);
        if tunnel_bypass {
            tracing::debug!("Tunnel host detected; sending {}", TUNNEL_BYPASS_HEADER);
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            tunnel_bypass,
            session,
            refresh: Arc::new(RefreshCoordinator::new()),
            notifier: Arc::new(TracingNotifier),
            messages: MessageCatalog::default(),
        })
    }

    /// Creates a client from the `api` and `messages` sections of `config`.
    pub fn from_config(config: &Config, session: Arc<SessionContext>) -> Result<Self> {
        Ok(Self::new(&config.api.base_url, config.api.timeout(), session)?
            .with_messages(config.message_catalog()))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = messages;
        self
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for `path`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Adds headers every request carries regardless of credentials.
    pub(crate) fn with_common_headers(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        if self.tunnel_bypass {
            builder.header(TUNNEL_BYPASS_HEADER, "true")
        } else {
            builder
        }
    }

    // -----------------------------------------------------------------------
    // Typed helpers
    // -----------------------------------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    /// Sends `request` and decodes the JSON response body.
    ///
    /// A body that does not match `T` is reported like any other failed
    /// request, with the catalog's generic message.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let silent = request.silent;
        let path = request.path.clone();
        let response = self.send(request).await?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.network_error(silent, e))?;
        serde_json::from_slice(&bytes).map_err(|e| -> anyhow::Error {
            tracing::warn!(error = %e, %path, %status, "Undecodable response body");
            let message = self.messages.get(MessageKey::Unknown).to_string();
            if !silent {
                self.notifier.notify(Notice::error(message.clone()));
            }
            BotdeskError::Api {
                status: status.as_u16(),
                message,
            }
            .into()
        })
    }

    /// Sends `request` and discards the response body.
    pub async fn send_empty(&self, request: ApiRequest) -> Result<()> {
        self.send(request).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Core request cycle
    // -----------------------------------------------------------------------

    /// Sends `request`, recovering from an expired access token at most once.
    ///
    /// # Errors
    ///
    /// See the module documentation for the failure classes.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let failure = match self.attempt(&request, None).await? {
            Attempt::Success(response) => return Ok(response),
            Attempt::Failed(failure) => failure,
        };

        if failure.status != StatusCode::UNAUTHORIZED {
            return Err(self.api_error(&request, &failure));
        }

        let token = self.recover_unauthorized(&request, &failure).await?;
        tracing::debug!(path = %request.path, "Retrying request with refreshed token");

        match self.attempt(&request, Some(&token)).await? {
            Attempt::Success(response) => Ok(response),
            Attempt::Failed(retry_failure) if retry_failure.status == StatusCode::UNAUTHORIZED => {
                Err(self.unrecoverable_unauthorized(&request, &retry_failure))
            }
            Attempt::Failed(retry_failure) => Err(self.api_error(&request, &retry_failure)),
        }
    }

    /// Performs one HTTP exchange. `token_override` replaces the session's
    /// access token (used by the retry).
    async fn attempt(&self, request: &ApiRequest, token_override: Option<&str>) -> Result<Attempt> {
        let token = match token_override {
            Some(t) => Some(t.to_string()),
            None => self.session.access_token(),
        };
        let api_key = self.session.project_api_key();

        let mut builder = self
            .http
            .request(request.method.clone(), self.endpoint(&request.path))
            .timeout(self.timeout)
            .header("Accept", "application/json");
        builder = self.with_common_headers(builder);

        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart { fields, file } => {
                builder.multipart(build_form(fields, file.as_ref())?)
            }
        };

        tracing::debug!(method = %request.method, path = %request.path, "Sending request");
        let response = builder
            .send()
            .await
            .map_err(|e| self.network_error(request.silent, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Attempt::Success(response));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                // Falls back to the catalog message for the status.
                tracing::debug!(error = %e, "Could not read error body");
                String::new()
            }
        };
        tracing::debug!(%status, path = %request.path, "Request failed");
        Ok(Attempt::Failed(Failure {
            status,
            detail: extract_detail(&body),
            body,
            sent_api_key: api_key.is_some(),
            sent_token: token,
        }))
    }

    /// Handles the first 401 of a request. Returns the access token to retry
    /// with, or the error to surface.
    async fn recover_unauthorized(&self, request: &ApiRequest, failure: &Failure) -> Result<String> {
        let kind = classify_unauthorized(&request.path, &failure.body, failure.sent_api_key);
        if kind == UnauthorizedKind::ProjectKey || is_auth_endpoint(&request.path) {
            return Err(self.unrecoverable_unauthorized(request, failure));
        }

        // Another request already refreshed while this one was in flight.
        if let Some(current) = self.session.access_token() {
            if failure.sent_token.as_deref() != Some(current.as_str()) {
                tracing::debug!("Access token changed since request was sent; retrying");
                return Ok(current);
            }
        }

        if self.session.refresh_token().is_none() {
            return Err(self.unrecoverable_unauthorized(request, failure));
        }

        match self.refresh_access_token().await {
            Ok(token) => Ok(token),
            Err(refresh_failure) => {
                tracing::warn!(error = %refresh_failure, "Token refresh failed");
                Err(BotdeskError::Session(self.session_message(failure)).into())
            }
        }
    }

    /// Handles a 401 that will not be retried.
    fn unrecoverable_unauthorized(&self, request: &ApiRequest, failure: &Failure) -> anyhow::Error {
        match classify_unauthorized(&request.path, &failure.body, failure.sent_api_key) {
            UnauthorizedKind::ProjectKey => {
                let message = failure
                    .detail
                    .clone()
                    .unwrap_or_else(|| self.messages.get(MessageKey::InvalidApiKey).to_string());
                self.session.raise(SessionSignal::ProjectAuthError {
                    message: message.clone(),
                });
                if !request.silent {
                    self.notifier.notify(Notice::warning(message.clone()));
                }
                BotdeskError::ProjectKey(message).into()
            }
            UnauthorizedKind::Session => {
                let message = self.session_message(failure);
                self.session.raise(SessionSignal::AuthError {
                    message: message.clone(),
                });
                BotdeskError::Session(message).into()
            }
        }
    }

    fn session_message(&self, failure: &Failure) -> String {
        failure
            .detail
            .clone()
            .unwrap_or_else(|| self.messages.get(MessageKey::SessionExpired).to_string())
    }

    /// Refreshes the access token through the single-flight coordinator.
    ///
    /// Only the leader talks to the server and raises the auth-error signal
    /// on failure; waiters share its outcome.
    async fn refresh_access_token(&self) -> RefreshOutcome {
        match self.refresh.acquire() {
            RefreshTicket::Waiter(waiter) => waiter.wait().await,
            RefreshTicket::Leader(leader) => {
                tracing::info!("Refreshing access token");
                let outcome = self.call_refresh_endpoint().await;
                if let Err(failure) = &outcome {
                    self.session.raise(SessionSignal::AuthError {
                        message: failure.to_string(),
                    });
                }
                leader.resolve(outcome.clone());
                outcome
            }
        }
    }

    async fn call_refresh_endpoint(&self) -> RefreshOutcome {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| RefreshFailure("no refresh token".to_string()))?;

        let builder = self
            .http
            .post(self.endpoint(REFRESH_PATH))
            .timeout(self.timeout)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            });
        let response = self
            .with_common_headers(builder)
            .send()
            .await
            .map_err(|e| RefreshFailure(format!("refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Could not read refresh error body");
                String::new()
            });
            let message = self.messages.for_response(status.as_u16(), extract_detail(&body).as_deref());
            return Err(RefreshFailure(message));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshFailure(format!("invalid refresh response: {}", e)))?;

        let pair = TokenPair::new(
            refreshed.access_token.clone(),
            refreshed.refresh_token.unwrap_or(refresh_token),
        );
        if let Err(e) = self.session.update_tokens(pair) {
            tracing::warn!("Failed to persist refreshed tokens: {}", e);
        }
        Ok(refreshed.access_token)
    }

    fn api_error(&self, request: &ApiRequest, failure: &Failure) -> anyhow::Error {
        let status = failure.status.as_u16();
        let message = self.messages.for_response(status, failure.detail.as_deref());
        if !request.silent {
            self.notifier.notify(Notice::error(message.clone()));
        }
        BotdeskError::Api { status, message }.into()
    }

    fn network_error(&self, silent: bool, error: reqwest::Error) -> anyhow::Error {
        tracing::warn!(error = %error, "Network error");
        let key = if error.is_timeout() {
            MessageKey::GatewayTimeout
        } else {
            MessageKey::Network
        };
        let message = self.messages.get(key).to_string();
        if !silent {
            self.notifier.notify(Notice::error(message.clone()));
        }
        BotdeskError::Network(message).into()
    }
}

fn build_form(
    fields: &[(String, String)],
    file: Option<&FilePart>,
) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    if let Some(file) = file {
        let mut part =
            reqwest::multipart::Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        if let Some(mime) = &file.mime {
            part = part.mime_str(mime).map_err(BotdeskError::Http)?;
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::MemoryCredentialStore;

    fn client(base: &str) -> ApiClient {
        let session = Arc::new(SessionContext::new(Arc::new(MemoryCredentialStore::new())));
        ApiClient::new(base, Duration::from_secs(5), session).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_version_prefix() {
        let c = client("http://localhost:8000/api/v1/");
        assert_eq!(
            c.endpoint("/conversations"),
            "http://localhost:8000/api/v1/conversations"
        );
        assert_eq!(c.endpoint("auth/me"), "http://localhost:8000/api/v1/auth/me");
    }

    #[test]
    fn test_auth_requests_default_to_silent() {
        assert!(ApiRequest::post("/auth/login").silent);
        assert!(!ApiRequest::get("/projects").silent);
        assert!(ApiRequest::get("/projects").silent().silent);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let session = Arc::new(SessionContext::new(Arc::new(MemoryCredentialStore::new())));
        assert!(ApiClient::new("::nope::", Duration::from_secs(5), session).is_err());
    }

    #[test]
    fn test_tunnel_bypass_detected() {
        assert!(client("https://demo.ngrok-free.app/api/v1").tunnel_bypass);
        assert!(!client("https://api.example.com").tunnel_bypass);
    }

    #[test]
    fn test_build_form_with_file() {
        let file = FilePart {
            field: "file".to_string(),
            file_name: "faq.md".to_string(),
            bytes: Bytes::from_static(b"# FAQ"),
            mime: Some("text/markdown".to_string()),
        };
        let fields = vec![("title".to_string(), "FAQ".to_string())];
        assert!(build_form(&fields, Some(&file)).is_ok());
    }
}
