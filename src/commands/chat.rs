//! Interactive chat mode handler.
//!
//! Runs a readline-based loop that streams each reply to the terminal as it
//! arrives. Ctrl-C while a reply is streaming cancels that reply only; at
//! the prompt it ends the session.

use std::io::Write;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::chat::{
    ChatCanceller, ChatMeta, ChatRequest, ChatSession, ChatStreamHandler, StreamOutcome,
};
use crate::commands::SignalReporter;
use crate::config::Config;
use crate::error::{BotdeskError, Result};
use crate::http::ApiClient;

/// Prints stream callbacks to the terminal.
#[derive(Debug, Default)]
struct TerminalPrinter {
    sources: usize,
}

impl ChatStreamHandler for TerminalPrinter {
    fn on_token(&mut self, token: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", token);
        let _ = stdout.flush();
    }

    fn on_meta(&mut self, meta: &ChatMeta) {
        self.sources += meta.contexts.len();
    }

    fn on_complete(&mut self) {
        println!();
        if self.sources > 0 {
            println!("{}", format!("[{} source passages]", self.sources).dimmed());
        }
    }

    fn on_error(&mut self, error: BotdeskError) {
        println!();
        eprintln!("{}", format!("Error: {}", error).red());
    }
}

/// Cancels the active stream on every Ctrl-C until aborted.
fn spawn_interrupt_listener(canceller: ChatCanceller) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if canceller.cancel() {
                eprintln!("{}", "(cancelled)".yellow());
            }
        }
    })
}

/// Start chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (chat parameters)
/// * `client` - Connected API client
/// * `conversation` - Conversation to continue, if any
/// * `message` - Send this message and exit instead of running the REPL
/// * `no_stream` - Use the non-streaming endpoint
pub async fn run_chat(
    config: &Config,
    client: &ApiClient,
    conversation: Option<String>,
    message: Option<String>,
    no_stream: bool,
) -> Result<()> {
    let mut session = match conversation {
        Some(id) => ChatSession::resume(client.clone(), config.chat.clone(), id),
        None => ChatSession::new(client.clone(), config.chat.clone()),
    };
    let mut signals = SignalReporter::new(client.session());

    if let Some(message) = message {
        let result = send_one(&mut session, client, config, &message, no_stream).await;
        signals.report();
        return result;
    }

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner(client, session.conversation_id());

    loop {
        let prompt = format!("{} ", ">>".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if matches!(trimmed, "/exit" | "/quit") {
                    break;
                }
                if trimmed == "/new" {
                    session = ChatSession::new(client.clone(), config.chat.clone());
                    println!("{}", "Started a new conversation.".green());
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                let result = send_one(&mut session, client, config, trimmed, no_stream).await;
                signals.report();
                if let Err(e) = result {
                    eprintln!("{}", format!("Error: {}", e).red());
                    if matches!(
                        e.downcast_ref::<BotdeskError>(),
                        Some(BotdeskError::MissingApiKey)
                    ) {
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(id) = session.conversation_id() {
        println!("Conversation: {}", id.cyan());
    }
    Ok(())
}

async fn send_one(
    session: &mut ChatSession,
    client: &ApiClient,
    config: &Config,
    message: &str,
    no_stream: bool,
) -> Result<()> {
    if no_stream {
        let request = ChatRequest::new(message)
            .with_conversation(session.conversation_id().map(str::to_string))
            .with_params(&config.chat);
        let response = client.send_chat_message(&request).await?;
        println!("{}", response.response);
        if let Some(id) = response.conversation_id {
            *session = ChatSession::resume(client.clone(), config.chat.clone(), id);
        }
        return Ok(());
    }

    let interrupt = spawn_interrupt_listener(session.canceller());
    let mut printer = TerminalPrinter::default();
    let turn = session.send(message, &mut printer).await;
    interrupt.abort();

    // Stream failures were already printed by the handler.
    let turn = turn?;
    if turn.outcome == StreamOutcome::Cancelled {
        tracing::debug!(chars = turn.response_text.len(), "Reply cut short");
    }
    Ok(())
}

fn print_welcome_banner(client: &ApiClient, conversation: Option<&str>) {
    println!("{}", "botdesk chat".bold());
    if let Some(project) = client.session().project() {
        let label = project.name.unwrap_or(project.project_id);
        println!("Project:      {}", label.cyan());
    }
    if let Some(id) = conversation {
        println!("Conversation: {}", id.cyan());
    }
    println!(
        "{}",
        "Type /new for a new conversation, /exit to quit. Ctrl-C stops a reply.".dimmed()
    );
    println!();
}
