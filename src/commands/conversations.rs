//! `conversations` subcommands

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::cli::ConversationCommand;
use crate::commands::{format_time, print_json, truncate};
use crate::error::Result;
use crate::http::ApiClient;

/// Handle conversation commands
pub async fn handle_conversations(client: &ApiClient, command: ConversationCommand) -> Result<()> {
    match command {
        ConversationCommand::List { limit, json } => {
            let conversations = client.list_conversations(limit).await?;
            if json {
                return print_json(&conversations);
            }
            if conversations.is_empty() {
                println!("{}", "No conversations found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row![
                "ID".bold(),
                "Title".bold(),
                "Messages".bold(),
                "Last Updated".bold()
            ]);
            for conversation in conversations {
                let messages = conversation
                    .message_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(row![
                    conversation.id.cyan(),
                    truncate(conversation.title.as_deref().unwrap_or("(untitled)"), 40),
                    messages,
                    format_time(conversation.updated_at.or(conversation.created_at))
                ]);
            }

            println!("\nConversations:");
            table.printstd();
            println!();
            println!(
                "Use {} to continue one.",
                "botdesk chat --conversation <ID>".cyan()
            );
        }
        ConversationCommand::Show { id } => {
            let messages = client.get_messages(&id).await?;
            if messages.is_empty() {
                println!("{}", "No messages.".yellow());
                return Ok(());
            }
            for message in messages {
                let speaker = match message.role.as_str() {
                    "user" => "you".cyan().bold(),
                    "assistant" => "bot".green().bold(),
                    other => other.normal().bold(),
                };
                println!(
                    "{} {}",
                    speaker,
                    format_time(message.created_at).dimmed()
                );
                println!("{}\n", message.content);
            }
        }
        ConversationCommand::Delete { id } => {
            client.delete_conversation(&id).await?;
            println!("{}", format!("Deleted conversation {}", id).green());
        }
    }

    Ok(())
}
