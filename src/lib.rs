//! Parlance - streaming conversation sessions for AI providers
//!
//! This library provides the core of a streaming chat application:
//! provider adapters that turn vendor wire protocols into one event
//! vocabulary, a session controller that applies those events to a
//! deduplicating message store, and persistence with debounced
//! auto-save and history browsing.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `providers`: provider abstraction and streaming adapters
//!   (OpenAI-style SSE, Anthropic-style SSE, Ollama-style NDJSON)
//! - `session`: messages, tool calls, the message store, and the
//!   session controller state machine
//! - `persistence`: the storage contract and its SQLite backend
//! - `history`: read-side listing, search, and recency bucketing
//! - `auth`: credential lookup for authenticated providers
//! - `config`: configuration loading and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use parlance::config::Config;
//! use parlance::persistence::SqliteStore;
//! use parlance::providers::create_provider;
//! use parlance::session::SessionController;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", None)?;
//!     config.validate()?;
//!
//!     let credentials = parlance::auth::credentials_for(&config.provider.provider_type);
//!     let provider = create_provider(&config, credentials)?;
//!     let persistence = Arc::new(SqliteStore::new()?);
//!
//!     let controller = SessionController::new(provider, persistence, "local", "assistant");
//!     controller.send_message("hello", CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod persistence;
pub mod providers;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{ParlanceError, Result};
pub use session::{ChatMessage, MessageStore, Role, SessionController};

#[cfg(test)]
pub mod test_utils;
