//! Client-side session and project state
//!
//! [`SessionContext`] holds the minimal state the HTTP client and chat
//! consumer need: the token pair, the signed-in user, and the active project
//! context. It is shared as `Arc<SessionContext>`.
//!
//! Invalidation is signal driven. Components that detect a rejected
//! credential call [`SessionContext::raise`] with a [`SessionSignal`]:
//!
//! - [`SessionSignal::AuthError`] clears the session (tokens and user).
//! - [`SessionSignal::ProjectAuthError`] clears only the project API key.
//!
//! The state change happens before `raise` returns, so every request built
//! afterwards omits the cleared header. Front ends observe signals through
//! [`SessionContext::subscribe`].

pub mod store;

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use store::CredentialStore;

const SIGNAL_CAPACITY: usize = 16;

/// Access/refresh token pair.
///
/// Either both tokens exist or there is no session at all.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Builds a pair only when both halves are present and non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use botdesk::session::TokenPair;
    ///
    /// assert!(TokenPair::from_parts(Some("a".into()), Some("r".into())).is_some());
    /// assert!(TokenPair::from_parts(Some("a".into()), None).is_none());
    /// assert!(TokenPair::from_parts(Some("a".into()), Some(String::new())).is_none());
    /// ```
    pub fn from_parts(access: Option<String>, refresh: Option<String>) -> Option<Self> {
        match (access, refresh) {
            (Some(a), Some(r)) if !a.is_empty() && !r.is_empty() => Some(Self::new(a, r)),
            _ => None,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The signed-in user as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub email: String,
    #[serde(default, alias = "full_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Accepts an identifier sent either as a JSON string or a number.
pub(crate) fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Optional form of [`id_string`].
pub(crate) fn opt_id_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "id_string")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(id)| id))
}

/// Active project and its API key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ProjectContext {
    pub fn new(project_id: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key,
            name: None,
        }
    }
}

impl fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .finish()
    }
}

/// Credential invalidation signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The user session is gone; log in again.
    AuthError { message: String },
    /// The project API key was rejected; pick a project/key again.
    ProjectAuthError { message: String },
}

#[derive(Debug, Default)]
struct SessionState {
    tokens: Option<TokenPair>,
    user: Option<UserProfile>,
    project: Option<ProjectContext>,
}

/// Shared session/project state with persistence and signalling.
#[derive(Debug)]
pub struct SessionContext {
    store: Arc<dyn CredentialStore>,
    state: RwLock<SessionState>,
    signals: broadcast::Sender<SessionSignal>,
}

impl SessionContext {
    /// Creates an empty context backed by `store`. Nothing is loaded.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            store,
            state: RwLock::new(SessionState::default()),
            signals,
        }
    }

    /// Creates a context and loads any persisted state from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn restore(store: Arc<dyn CredentialStore>) -> Result<Self> {
        let ctx = Self::new(store);
        {
            let tokens = ctx.store.load_tokens()?;
            // A user without a session is stale; drop it.
            let user = match tokens {
                Some(_) => ctx.store.load_user()?,
                None => None,
            };
            let project = ctx.store.load_project()?;

            let mut state = ctx.write();
            state.tokens = tokens;
            state.user = user;
            state.project = project;
        }
        tracing::debug!(
            authenticated = ctx.is_authenticated(),
            has_project = ctx.project().is_some(),
            "Restored session state"
        );
        Ok(ctx)
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.read().tokens.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().tokens.is_some()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn project(&self) -> Option<ProjectContext> {
        self.read().project.clone()
    }

    /// The active project's API key, if one is selected and non-empty.
    pub fn project_api_key(&self) -> Option<String> {
        self.read()
            .project
            .as_ref()
            .and_then(|p| p.api_key.clone())
            .filter(|k| !k.is_empty())
    }

    /// Installs a fresh session after login.
    pub fn start_session(&self, tokens: TokenPair, user: Option<UserProfile>) -> Result<()> {
        self.store.save_tokens(&tokens)?;
        match &user {
            Some(u) => self.store.save_user(u)?,
            None => self.store.clear_user()?,
        }
        let mut state = self.write();
        state.tokens = Some(tokens);
        state.user = user;
        tracing::info!("Session started");
        Ok(())
    }

    /// Replaces the token pair after a successful refresh.
    ///
    /// The in-memory pair is updated even if persisting it fails.
    pub fn update_tokens(&self, tokens: TokenPair) -> Result<()> {
        self.write().tokens = Some(tokens.clone());
        self.store.save_tokens(&tokens)
    }

    pub fn set_user(&self, user: UserProfile) -> Result<()> {
        self.store.save_user(&user)?;
        self.write().user = Some(user);
        Ok(())
    }

    /// Selects and persists the active project.
    pub fn set_project(&self, project: ProjectContext) -> Result<()> {
        self.store.save_project(&project)?;
        tracing::info!(project_id = %project.project_id, "Active project selected");
        self.write().project = Some(project);
        Ok(())
    }

    /// Selects the active project for this process only.
    pub fn pin_project(&self, project: ProjectContext) {
        tracing::debug!(project_id = %project.project_id, "Pinned project from configuration");
        self.write().project = Some(project);
    }

    /// Drops tokens and user, in memory and in the store.
    ///
    /// Store failures are logged; the in-memory state is cleared regardless.
    pub fn clear_session(&self) {
        {
            let mut state = self.write();
            state.tokens = None;
            state.user = None;
        }
        if let Err(e) = self.store.clear_tokens() {
            tracing::warn!("Failed to clear stored tokens: {}", e);
        }
        if let Err(e) = self.store.clear_user() {
            tracing::warn!("Failed to clear stored user: {}", e);
        }
        tracing::info!("Session cleared");
    }

    /// Drops the project API key, keeping the project selection.
    pub fn clear_project_key(&self) {
        let remaining = {
            let mut state = self.write();
            if let Some(project) = state.project.as_mut() {
                project.api_key = None;
            }
            state.project.clone()
        };
        let result = match &remaining {
            Some(project) => self.store.save_project(project),
            None => self.store.clear_project(),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist cleared project key: {}", e);
        }
        tracing::info!("Project API key cleared");
    }

    /// Drops the project selection entirely.
    pub fn clear_project(&self) -> Result<()> {
        self.write().project = None;
        self.store.clear_project()
    }

    /// Subscribes to invalidation signals.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Applies `signal` to the state, then broadcasts it.
    pub fn raise(&self, signal: SessionSignal) {
        match &signal {
            SessionSignal::AuthError { message } => {
                tracing::warn!(%message, "auth-error: clearing session");
                self.clear_session();
            }
            SessionSignal::ProjectAuthError { message } => {
                tracing::warn!(%message, "project-auth-error: clearing project API key");
                self.clear_project_key();
            }
        }
        // No subscribers is fine.
        let _ = self.signals.send(signal);
    }
}
