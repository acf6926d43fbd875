//! Credential persistence
//!
//! The session layer persists three records through a [`CredentialStore`]:
//! the token pair, the signed-in user profile, and the active project
//! context. Two implementations are provided:
//!
//! - [`MemoryCredentialStore`] keeps everything in process memory.
//! - [`KeyringCredentialStore`] keeps the token pair and user profile as JSON
//!   secrets in the OS native keyring (Keychain on macOS, Secret Service on
//!   Linux, Windows Credential Manager on Windows), and the project context
//!   as a plain JSON file in the per-user data directory.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BotdeskError, Result};
use crate::session::{ProjectContext, TokenPair, UserProfile};

/// Injected persistence for session and project state.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    fn load_tokens(&self) -> Result<Option<TokenPair>>;
    fn save_tokens(&self, tokens: &TokenPair) -> Result<()>;
    fn clear_tokens(&self) -> Result<()>;

    fn load_user(&self) -> Result<Option<UserProfile>>;
    fn save_user(&self, user: &UserProfile) -> Result<()>;
    fn clear_user(&self) -> Result<()>;

    fn load_project(&self) -> Result<Option<ProjectContext>>;
    fn save_project(&self, project: &ProjectContext) -> Result<()>;
    fn clear_project(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    tokens: Option<TokenPair>,
    user: Option<UserProfile>,
    project: Option<ProjectContext>,
}

/// Process-local credential store.
///
/// # Examples
///
/// ```
/// use botdesk::session::store::{CredentialStore, MemoryCredentialStore};
/// use botdesk::session::TokenPair;
///
/// let store = MemoryCredentialStore::new();
/// store.save_tokens(&TokenPair::new("access", "refresh")).unwrap();
/// assert!(store.load_tokens().unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<MemoryState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| BotdeskError::Store("memory store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_tokens(&self) -> Result<Option<TokenPair>> {
        self.with_state(|s| s.tokens.clone())
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.with_state(|s| s.tokens = Some(tokens.clone()))
    }

    fn clear_tokens(&self) -> Result<()> {
        self.with_state(|s| s.tokens = None)
    }

    fn load_user(&self) -> Result<Option<UserProfile>> {
        self.with_state(|s| s.user.clone())
    }

    fn save_user(&self, user: &UserProfile) -> Result<()> {
        self.with_state(|s| s.user = Some(user.clone()))
    }

    fn clear_user(&self) -> Result<()> {
        self.with_state(|s| s.user = None)
    }

    fn load_project(&self) -> Result<Option<ProjectContext>> {
        self.with_state(|s| s.project.clone())
    }

    fn save_project(&self, project: &ProjectContext) -> Result<()> {
        self.with_state(|s| s.project = Some(project.clone()))
    }

    fn clear_project(&self) -> Result<()> {
        self.with_state(|s| s.project = None)
    }
}

// ---------------------------------------------------------------------------
// KeyringCredentialStore
// ---------------------------------------------------------------------------

/// Keyring record for the token pair.
///
/// Both fields are optional on disk so that a half-written record can be
/// detected and discarded instead of producing a partial session.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

const TOKENS_ACCOUNT: &str = "session-tokens";
const USER_ACCOUNT: &str = "session-user";

/// Keyring-backed credential store.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    project_file: PathBuf,
}

impl KeyringCredentialStore {
    /// Creates a store using keyring service `service` and the given project
    /// context file.
    pub fn new(service: impl Into<String>, project_file: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            project_file: project_file.into(),
        }
    }

    /// Creates a store whose project file lives in the platform data
    /// directory (e.g. `~/.local/share/botdesk/project.json`).
    ///
    /// # Errors
    ///
    /// Returns [`BotdeskError::Store`] if no home directory can be resolved.
    pub fn with_default_paths(service: impl Into<String>) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "botdesk").ok_or_else(|| {
            BotdeskError::Store("could not determine a data directory".to_string())
        })?;
        Ok(Self::new(service, dirs.data_dir().join("project.json")))
    }

    pub fn project_file(&self) -> &Path {
        &self.project_file
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account).map_err(|e| BotdeskError::Keyring(e).into())
    }

    fn read_secret(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(BotdeskError::Keyring(e).into()),
        }
    }

    fn write_secret(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .map_err(BotdeskError::Keyring)?;
        Ok(())
    }

    fn delete_secret(&self, account: &str) -> Result<()> {
        match self.entry(account)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(BotdeskError::Keyring(e).into()),
        }
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load_tokens(&self) -> Result<Option<TokenPair>> {
        let Some(json) = self.read_secret(TOKENS_ACCOUNT)? else {
            return Ok(None);
        };
        let stored: StoredTokens = serde_json::from_str(&json)?;
        match TokenPair::from_parts(stored.access_token, stored.refresh_token) {
            Some(pair) => Ok(Some(pair)),
            None => {
                tracing::warn!("Discarding partial session record from keyring");
                self.delete_secret(TOKENS_ACCOUNT)?;
                Ok(None)
            }
        }
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        let stored = StoredTokens {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token.clone()),
            saved_at: Some(Utc::now()),
        };
        self.write_secret(TOKENS_ACCOUNT, &serde_json::to_string(&stored)?)
    }

    fn clear_tokens(&self) -> Result<()> {
        self.delete_secret(TOKENS_ACCOUNT)
    }

    fn load_user(&self) -> Result<Option<UserProfile>> {
        match self.read_secret(USER_ACCOUNT)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_user(&self, user: &UserProfile) -> Result<()> {
        self.write_secret(USER_ACCOUNT, &serde_json::to_string(user)?)
    }

    fn clear_user(&self) -> Result<()> {
        self.delete_secret(USER_ACCOUNT)
    }

    fn load_project(&self) -> Result<Option<ProjectContext>> {
        match std::fs::read_to_string(&self.project_file) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BotdeskError::Io(e).into()),
        }
    }

    fn save_project(&self, project: &ProjectContext) -> Result<()> {
        if let Some(parent) = self.project_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.project_file, serde_json::to_string_pretty(project)?)?;
        Ok(())
    }

    fn clear_project(&self) -> Result<()> {
        match std::fs::remove_file(&self.project_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BotdeskError::Io(e).into()),
        }
    }
}
