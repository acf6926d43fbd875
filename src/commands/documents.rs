//! `documents` subcommands

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::cli::DocumentCommand;
use crate::commands::{format_time, print_json, truncate};
use crate::error::Result;
use crate::http::ApiClient;

/// Handle document commands
pub async fn handle_documents(client: &ApiClient, command: DocumentCommand) -> Result<()> {
    match command {
        DocumentCommand::List { json } => {
            let documents = client.list_documents().await?;
            if json {
                return print_json(&documents);
            }
            if documents.is_empty() {
                println!("{}", "No documents uploaded.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row![
                "ID".bold(),
                "Title".bold(),
                "Status".bold(),
                "Chunks".bold(),
                "Uploaded".bold()
            ]);
            for document in documents {
                let chunks = document
                    .chunk_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(row![
                    document.id.cyan(),
                    truncate(document.display_name(), 40),
                    document.status.as_deref().unwrap_or("-"),
                    chunks,
                    format_time(document.created_at)
                ]);
            }
            table.printstd();
        }
        DocumentCommand::Upload { path, title } => {
            let document = client
                .upload_document_file(&path, title.as_deref())
                .await?;
            println!(
                "{}",
                format!("Uploaded {} as {}", path.display(), document.id).green()
            );
            if let Some(status) = &document.status {
                println!("Status: {}", status);
            }
        }
        DocumentCommand::Delete { id } => {
            client.delete_document(&id).await?;
            println!("{}", format!("Deleted document {}", id).green());
        }
        DocumentCommand::Search { query, top_k } => {
            let hits = client.search_documents(&query, top_k).await?;
            if hits.is_empty() {
                println!("{}", "No matches.".yellow());
                return Ok(());
            }
            for (rank, hit) in hits.iter().enumerate() {
                let score = hit
                    .score
                    .map(|s| format!("{:.3}", s))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{} {}",
                    format!("#{}", rank + 1).cyan().bold(),
                    format!("score {}", score).dimmed()
                );
                println!("{}\n", truncate(hit.content.trim(), 400));
            }
        }
    }

    Ok(())
}
