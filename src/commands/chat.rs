//! Interactive chat mode handler
//!
//! Instantiates the provider and persistence, creates a
//! `SessionController`, and runs a readline loop that streams tokens to
//! the terminal as they land. Ctrl-C during a stream cancels it,
//! keeping whatever arrived; Ctrl-C at the prompt is ignored.

use crate::auth::credentials_for;
use crate::config::Config;
use crate::error::Result;
use crate::history::HistoryIndex;
use crate::persistence::{PersistenceService, SqliteStore};
use crate::providers::create_provider;
use crate::session::{SendOutcome, SessionController};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `resume` - Optional id of a saved session to continue
pub async fn run_chat(config: Config, resume: Option<String>) -> Result<()> {
    let credentials = credentials_for(&config.provider.provider_type);
    let provider = create_provider(&config, credentials)?;
    let persistence: Arc<dyn PersistenceService> = Arc::new(SqliteStore::new()?);

    let controller = Arc::new(
        SessionController::new(
            provider.clone(),
            Arc::clone(&persistence),
            config.session.user_id.clone(),
            config.session.agent_id.clone(),
        )
        .with_autosave_delay(Duration::from_secs(config.session.autosave_seconds)),
    );

    if let Some(id) = resume {
        // The history listing shortens ids; accept an unambiguous prefix
        let index =
            HistoryIndex::new(Arc::clone(&persistence), config.session.user_id.as_str());
        let id = index.resolve_id(&id).await?;
        controller.resume(&id).await?;
        println!(
            "{}",
            format!("Resumed session with {} messages.", controller.messages().len()).cyan()
        );
        for message in controller.messages() {
            println!("{}: {}", message.role.to_string().bold(), message.content);
        }
    }

    println!(
        "Chatting with {} ({}). {} to quit, {} for a fresh session.",
        provider.name().bold(),
        config.provider.provider_type,
        "/quit".cyan(),
        "/new".cyan()
    );

    let mut rl = DefaultEditor::new().map_err(|e| anyhow::anyhow!("readline init failed: {e}"))?;

    loop {
        match rl.readline(&"you> ".green().to_string()) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "/quit" | "/exit" => break,
                    "/new" => {
                        controller.create_new_session().await;
                        println!("{}", "Started a fresh session.".cyan());
                        continue;
                    }
                    _ => {}
                }

                stream_turn(&controller, line).await?;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C at the prompt: stay in the loop
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                return Err(anyhow::anyhow!("readline failed: {e}"));
            }
        }
    }

    controller.flush_save().await;
    println!("{}", "Session saved. Goodbye.".cyan());
    Ok(())
}

/// Runs one send, racing the stream against Ctrl-C
async fn stream_turn(controller: &Arc<SessionController>, line: &str) -> Result<()> {
    print!("{} ", "agent>".blue());
    let _ = std::io::stdout().flush();

    let cancel = CancellationToken::new();
    let send = controller.send_message_observed(line, cancel.clone(), |token| {
        print!("{}", token);
        let _ = std::io::stdout().flush();
    });
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            result = &mut send => break result?,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            }
        }
    };
    println!();

    match outcome {
        SendOutcome::Completed => {}
        SendOutcome::Cancelled => {
            println!("{}", "(cancelled)".yellow());
        }
        SendOutcome::Errored(error) => {
            eprintln!("{}", format!("Error: {}", error).red());
        }
        SendOutcome::Rejected => {
            println!("{}", "Still busy with the previous message.".yellow());
        }
    }
    Ok(())
}
