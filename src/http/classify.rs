//! Request/response classification rules
//!
//! Pure functions used by [`crate::http::ApiClient`] to decide how a failed
//! request is handled. Paths are relative to the configured API base URL.

/// Path segments served under the project API key.
const PROJECT_SCOPED_SEGMENTS: [&str; 4] = ["conversations", "chat", "documents", "search"];

/// Auth endpoints that must never trigger a refresh.
const AUTH_ENDPOINTS: [&str; 4] = ["login", "signup", "refresh", "logout"];

const API_KEY_TERMS: [&str; 4] = ["api key", "api_key", "apikey", "x-api-key"];

/// Hosts that put an interstitial page in front of API calls unless the
/// bypass header is present.
const TUNNEL_HOST_SUFFIXES: [&str; 4] = [
    ".ngrok-free.app",
    ".ngrok-free.dev",
    ".ngrok.app",
    ".ngrok.io",
];

/// Header that skips the tunnel interstitial.
pub const TUNNEL_BYPASS_HEADER: &str = "ngrok-skip-browser-warning";

/// Which credential a 401 response rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedKind {
    /// The project API key is bad; clear it, never refresh.
    ProjectKey,
    /// The access token is bad; refresh may help.
    Session,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty())
}

/// Returns `true` for conversation, chat, document and search endpoints.
///
/// # Examples
///
/// ```
/// use botdesk::http::classify::is_project_scoped_path;
///
/// assert!(is_project_scoped_path("/conversations/42/messages"));
/// assert!(is_project_scoped_path("/chat/stream"));
/// assert!(!is_project_scoped_path("/projects/7/api-keys"));
/// ```
pub fn is_project_scoped_path(path: &str) -> bool {
    segments(path).any(|s| PROJECT_SCOPED_SEGMENTS.contains(&s))
}

/// Returns `true` for `/auth/{login,signup,refresh,logout}`.
pub fn is_auth_endpoint(path: &str) -> bool {
    let mut parts = segments(path);
    matches!(
        (parts.next(), parts.next()),
        (Some("auth"), Some(action)) if AUTH_ENDPOINTS.contains(&action)
    )
}

/// Returns `true` if an error body talks about an API key.
pub fn mentions_api_key(body: &str) -> bool {
    let lower = body.to_lowercase();
    API_KEY_TERMS.iter().any(|term| lower.contains(term))
}

/// Decides which credential a 401 rejected.
///
/// A 401 is a project-key failure when the endpoint is project scoped, when
/// the body mentions an API key, or when the request carried `X-API-Key` and
/// the body does not mention a token. Everything else is a session failure.
pub fn classify_unauthorized(path: &str, body: &str, sent_api_key: bool) -> UnauthorizedKind {
    let mentions_token = body.to_lowercase().contains("token");
    if is_project_scoped_path(path) || mentions_api_key(body) || (sent_api_key && !mentions_token)
    {
        UnauthorizedKind::ProjectKey
    } else {
        UnauthorizedKind::Session
    }
}

/// Returns `true` if requests to `url` need [`TUNNEL_BYPASS_HEADER`].
pub fn requires_tunnel_bypass(url: &url::Url) -> bool {
    url.host_str()
        .map(|host| {
            let host = host.to_ascii_lowercase();
            TUNNEL_HOST_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
        })
        .unwrap_or(false)
}
