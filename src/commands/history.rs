//! Session history command handler

use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{ParlanceError, Result};
use crate::history::{group_by_recency, HistoryIndex};
use crate::persistence::{ConversationUpdate, PersistenceService, SqliteStore};
use chrono::Local;
use colored::Colorize;
use prettytable::{format, Table};
use std::sync::Arc;

/// Handle history subcommands
pub async fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store: Arc<dyn PersistenceService> = Arc::new(SqliteStore::new()?);
    let user_id = config.session.user_id.as_str();
    let index = HistoryIndex::new(Arc::clone(&store), user_id);

    match command {
        HistoryCommand::List { limit, archived } => {
            let mut summaries = index.list(archived).await?;
            summaries.truncate(limit);

            if summaries.is_empty() {
                println!("{}", "No saved sessions.".yellow());
                return Ok(());
            }

            for (bucket, entries) in group_by_recency(summaries, Local::now()) {
                println!("\n{}", bucket.to_string().bold());

                let mut table = Table::new();
                table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
                table.add_row(prettytable::row![
                    "ID".bold(),
                    "Title".bold(),
                    "Messages".bold(),
                    "Last Updated".bold()
                ]);

                for summary in entries {
                    let id_short: String = summary.id.chars().take(8).collect();
                    let title = summary.title.unwrap_or_else(|| "(untitled)".to_string());
                    let updated = summary
                        .updated_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string();
                    table.add_row(prettytable::row![
                        id_short.cyan(),
                        title,
                        summary.message_count,
                        updated
                    ]);
                }
                table.printstd();
            }
            println!();
            println!(
                "Use {} to continue a session.",
                "parlance chat --resume <ID>".cyan()
            );
        }
        HistoryCommand::Search { query } => {
            let hits = index.search(&query).await?;
            if hits.is_empty() {
                println!("{}", format!("No sessions match \"{}\".", query).yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row!["ID".bold(), "Title".bold(), "Match".bold()]);
            for hit in hits {
                let id_short: String = hit.session_id.chars().take(8).collect();
                let title = hit.session_title.unwrap_or_else(|| "(untitled)".to_string());
                let excerpt: String = hit.matched_message.chars().take(60).collect();
                table.add_row(prettytable::row![id_short.cyan(), title, excerpt]);
            }
            table.printstd();
        }
        HistoryCommand::Delete { id } => {
            // Listed ids are shortened; accept an unambiguous prefix
            let id = index.resolve_id(&id).await?;
            store.delete_conversation(&id, user_id).await?;
            println!("{}", format!("Deleted session {}", id).green());
        }
        HistoryCommand::Archive { id } => {
            let id = index.resolve_id(&id).await?;
            let session = store
                .get_conversation(&id, user_id)
                .await?
                .ok_or_else(|| ParlanceError::Storage(format!("session not found: {}", id)))?;

            let archived = !session.archived;
            store
                .update_conversation(
                    &id,
                    user_id,
                    ConversationUpdate {
                        archived: Some(archived),
                        ..Default::default()
                    },
                )
                .await?;

            let verb = if archived { "Archived" } else { "Unarchived" };
            println!("{}", format!("{} session {}", verb, id).green());
        }
    }

    Ok(())
}
