/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `auth` - login, signup, logout, whoami
- `project` - project selection and API keys
- `chat` - streaming chat REPL and one-shot messages
- `conversations` - conversation history
- `documents` - knowledge-base documents and search
- `notifications` - account notifications

Handlers share one [`ApiClient`] built by [`connect`]. Failed requests are
printed by [`TerminalNotifier`]; credential invalidation is reported by
[`SignalReporter`] after each command.
*/

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{BotdeskError, Result};
use crate::http::ApiClient;
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::session::store::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
use crate::session::{ProjectContext, SessionContext, SessionSignal};

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod documents;
pub mod notifications;
pub mod project;

/// Prints notices to stderr.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        let line = match notice.level {
            NoticeLevel::Warning => notice.message.yellow(),
            NoticeLevel::Error => notice.message.red(),
        };
        eprintln!("{}", line);
    }
}

/// Drains session signals and prints what the user has to do next.
#[derive(Debug)]
pub struct SignalReporter {
    signals: broadcast::Receiver<SessionSignal>,
}

impl SignalReporter {
    pub fn new(session: &SessionContext) -> Self {
        Self {
            signals: session.subscribe(),
        }
    }

    /// Prints every signal raised since the last call.
    pub fn report(&mut self) {
        loop {
            match self.signals.try_recv() {
                Ok(signal) => eprintln!("{}", describe_signal(&signal).yellow()),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Session signals dropped");
                }
                Err(_) => break,
            }
        }
    }
}

/// One-line hint for a session signal.
pub fn describe_signal(signal: &SessionSignal) -> String {
    match signal {
        SessionSignal::AuthError { message } => {
            format!("Signed out: {}. Run `botdesk login` to sign in again.", message)
        }
        SessionSignal::ProjectAuthError { .. } => {
            "The project API key was cleared. Run `botdesk project use <ID> --api-key <KEY>` \
             to select a valid key."
                .to_string()
        }
    }
}

/// Opens the credential store named by `config.storage`.
pub fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCredentialStore::new())),
        "keyring" => Ok(Arc::new(KeyringCredentialStore::with_default_paths(
            config.storage.service.clone(),
        )?)),
        other => Err(BotdeskError::Config(format!("Unknown storage backend: {}", other)).into()),
    }
}

/// Restores the session and builds the client used by every command.
///
/// A project configured through `project.project_id`/`project.api_key`
/// (or their environment overrides) takes precedence over the stored
/// selection for this process.
pub fn connect(config: &Config) -> Result<ApiClient> {
    let session = Arc::new(SessionContext::restore(open_store(config)?)?);
    if let Some(project_id) = &config.project.project_id {
        session.pin_project(ProjectContext::new(
            project_id.clone(),
            config.project.api_key.clone(),
        ));
    }
    Ok(ApiClient::from_config(config, session)?.with_notifier(Arc::new(TerminalNotifier)))
}

/// Reads one line from the terminal.
pub fn prompt_line(label: &str) -> Result<String> {
    let mut rl = rustyline::DefaultEditor::new()?;
    let line = rl.readline(label)?;
    Ok(line.trim().to_string())
}

/// Returns `value` or prompts for it.
pub fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => prompt_line(label),
    }
}

/// Returns `value` or reads it with hidden input. Secrets are never trimmed.
pub fn secret_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Ok(dialoguer::Password::new().with_prompt(label).interact()?),
    }
}

/// Local-time rendering for tables.
pub fn format_time(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Shortens `text` to `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Pretty-prints `value` as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(BotdeskError::Serialization)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json).map_err(BotdeskError::Io)?;
    Ok(())
}

/// The active project id, or an explicit override.
pub fn resolve_project(client: &ApiClient, explicit: Option<String>) -> Result<String> {
    explicit
        .or_else(|| client.session().project().map(|p| p.project_id))
        .ok_or_else(|| {
            BotdeskError::Config(
                "No project selected; pass --project or run `botdesk project use`".to_string(),
            )
            .into()
        })
}
