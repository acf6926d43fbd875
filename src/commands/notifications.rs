//! `notifications` subcommands

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::cli::NotificationCommand;
use crate::commands::{format_time, print_json, truncate};
use crate::error::Result;
use crate::http::ApiClient;

/// Handle notification commands
pub async fn handle_notifications(
    client: &ApiClient,
    command: NotificationCommand,
) -> Result<()> {
    match command {
        NotificationCommand::List { unread, json } => {
            let notifications = client.list_notifications(unread).await?;
            if json {
                return print_json(&notifications);
            }
            if notifications.is_empty() {
                println!("{}", "No notifications.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row![
                "ID".bold(),
                "".bold(),
                "Message".bold(),
                "Received".bold()
            ]);
            for notification in notifications {
                let state = if notification.is_read {
                    "".normal()
                } else {
                    "new".yellow()
                };
                let text = match &notification.title {
                    Some(title) => format!("{}: {}", title, notification.message),
                    None => notification.message.clone(),
                };
                table.add_row(row![
                    notification.id.cyan(),
                    state,
                    truncate(&text, 60),
                    format_time(notification.created_at)
                ]);
            }
            table.printstd();
        }
        NotificationCommand::Read { id, all } => {
            match (id, all) {
                (_, true) => {
                    client.mark_all_notifications_read().await?;
                    println!("{}", "All notifications marked as read.".green());
                }
                (Some(id), false) => {
                    client.mark_notification_read(&id).await?;
                    println!("{}", format!("Marked {} as read.", id).green());
                }
                // clap requires one of the two.
                (None, false) => {}
            }
        }
    }

    Ok(())
}
