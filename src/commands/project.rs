//! `project` subcommands

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::cli::ProjectCommand;
use crate::commands::{format_time, print_json, resolve_project, truncate};
use crate::error::Result;
use crate::http::ApiClient;

/// Handle project commands
pub async fn handle_project(client: &ApiClient, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::List { json } => {
            let projects = client.list_projects().await?;
            if json {
                return print_json(&projects);
            }
            if projects.is_empty() {
                println!("{}", "No projects found.".yellow());
                return Ok(());
            }

            let active = client.session().project().map(|p| p.project_id);
            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row![
                "".bold(),
                "ID".bold(),
                "Name".bold(),
                "Description".bold(),
                "Created".bold()
            ]);
            for project in projects {
                let marker = if active.as_deref() == Some(project.id.as_str()) {
                    "*".green()
                } else {
                    "".normal()
                };
                table.add_row(row![
                    marker,
                    project.id.cyan(),
                    project.name,
                    truncate(project.description.as_deref().unwrap_or("-"), 40),
                    format_time(project.created_at)
                ]);
            }
            table.printstd();
        }
        ProjectCommand::Use {
            project_id,
            api_key,
        } => {
            let has_key = api_key.is_some();
            client.use_project(&project_id, api_key).await?;
            println!("{}", format!("Active project: {}", project_id).green());
            if !has_key {
                println!(
                    "{}",
                    "No API key given; chat and documents need one (--api-key).".yellow()
                );
            }
        }
        ProjectCommand::Create { name, description } => {
            let project = client
                .create_project(&name, description.as_deref())
                .await?;
            println!(
                "{}",
                format!("Created project {} ({})", project.name, project.id).green()
            );
        }
        ProjectCommand::Delete { project_id } => {
            client.delete_project(&project_id).await?;
            println!("{}", format!("Deleted project {}", project_id).green());
        }
        ProjectCommand::Keys { project, json } => {
            let project_id = resolve_project(client, project)?;
            let keys = client.list_api_keys(&project_id).await?;
            if json {
                return print_json(&keys);
            }
            if keys.is_empty() {
                println!("{}", "No API keys issued.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row![
                "ID".bold(),
                "Name".bold(),
                "Prefix".bold(),
                "Active".bold(),
                "Created".bold(),
                "Last Used".bold()
            ]);
            for key in keys {
                let active = if key.is_active {
                    "yes".green()
                } else {
                    "revoked".red()
                };
                table.add_row(row![
                    key.id.cyan(),
                    key.name.as_deref().unwrap_or("-"),
                    key.prefix.as_deref().unwrap_or("-"),
                    active,
                    format_time(key.created_at),
                    format_time(key.last_used_at)
                ]);
            }
            table.printstd();
        }
        ProjectCommand::CreateKey {
            project,
            name,
            use_key,
        } => {
            let project_id = resolve_project(client, project)?;
            let created = client.create_api_key(&project_id, name.as_deref()).await?;
            println!("{}", format!("Created API key {}", created.id).green());
            println!("{}", created.key.bold());
            println!(
                "{}",
                "Store this key now; it will not be shown again.".yellow()
            );
            if use_key {
                client.use_project(&project_id, Some(created.key)).await?;
                println!("{}", format!("Active project: {}", project_id).green());
            }
        }
        ProjectCommand::RevokeKey { key_id, project } => {
            let project_id = resolve_project(client, project)?;
            client.revoke_api_key(&project_id, &key_id).await?;
            println!("{}", format!("Revoked API key {}", key_id).green());
        }
    }

    Ok(())
}
