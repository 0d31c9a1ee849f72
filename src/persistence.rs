//! Session persistence
//!
//! The session layer talks to storage through the [`PersistenceService`]
//! trait; [`SqliteStore`] is the concrete backend. Every statement is
//! scoped to a user id, so one database can hold several users'
//! sessions without leaking across them.

use crate::error::{ParlanceError, Result};
use crate::session::ChatMessage;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A stored conversation session
///
/// Either the live session (mutable while streaming) or a historical
/// snapshot (immutable once loaded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub archived: bool,
}

/// Bodiless projection of a session, used for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub archived: bool,
}

/// One search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub session_id: String,
    pub session_title: Option<String>,
    /// Content of the first message matching the query
    pub matched_message: String,
}

/// Partial update applied to a stored session
///
/// `None` fields are left untouched; `updated_at` always advances.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub archived: Option<bool>,
}

/// Storage contract the session layer depends on
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// Creates an empty conversation and returns its id
    async fn create_conversation(
        &self,
        user_id: &str,
        agent_id: &str,
        title: Option<String>,
    ) -> Result<String>;

    /// Fetches a session by id, scoped to the user
    async fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<Session>>;

    /// Applies a partial update and returns the updated session
    async fn update_conversation(
        &self,
        id: &str,
        user_id: &str,
        update: ConversationUpdate,
    ) -> Result<Session>;

    /// Deletes a session; deleting a missing id is not an error
    async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<()>;

    /// Full-text search over titles and message bodies
    ///
    /// Hits come back in backing-store rank order; callers must not
    /// re-rank them.
    async fn search_conversations(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Lists summaries, newest `updated_at` first
    async fn get_conversations(
        &self,
        user_id: &str,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<ConversationSummary>>;
}

/// SQLite-backed persistence
///
/// Opens a fresh connection per call; the session layer issues one
/// statement at a time, so connection reuse buys nothing here.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Creates a store in the user's data directory
    ///
    /// The `PARLANCE_HISTORY_DB` environment variable overrides the
    /// database path, which keeps test databases out of the real data
    /// dir.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("PARLANCE_HISTORY_DB") {
            if !override_path.is_empty() {
                return Self::new_with_path(override_path);
            }
        }

        let proj_dirs = ProjectDirs::from("dev", "parlance", "parlance")
            .ok_or_else(|| ParlanceError::Storage("could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("failed to create data directory")
            .map_err(|e| ParlanceError::Storage(e.to_string()))?;

        Self::new_with_path(data_dir.join("sessions.db"))
    }

    /// Creates a store at an explicit database path
    ///
    /// # Examples
    ///
    /// ```
    /// use parlance::persistence::SqliteStore;
    ///
    /// let store = SqliteStore::new_with_path("/tmp/parlance_test.db").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create parent directory for database")
                .map_err(|e| ParlanceError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                messages JSON NOT NULL
            )",
            [],
        )
        .context("failed to create tables")
        .map_err(|e| ParlanceError::Storage(e.to_string()))?;
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("failed to open database")
            .map_err(|e| ParlanceError::Storage(e.to_string()).into())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Session, String)> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let agent_id: String = row.get(2)?;
    let title: Option<String> = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    let archived: bool = row.get(6)?;
    let messages_json: String = row.get(7)?;

    Ok((
        Session {
            id,
            user_id,
            agent_id,
            title,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            messages: Vec::new(),
            archived,
        },
        messages_json,
    ))
}

#[async_trait]
impl PersistenceService for SqliteStore {
    async fn create_conversation(
        &self,
        user_id: &str,
        agent_id: &str,
        title: Option<String>,
    ) -> Result<String> {
        let conn = self.open()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO conversations (id, user_id, agent_id, title, created_at, updated_at, archived, messages)
             VALUES (?, ?, ?, ?, ?, ?, 0, '[]')",
            params![id, user_id, agent_id, title, now, now],
        )
        .context("failed to insert conversation")
        .map_err(|e| ParlanceError::Storage(e.to_string()))?;

        Ok(id)
    }

    async fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<Session>> {
        let conn = self.open()?;
        let result = conn
            .query_row(
                "SELECT id, user_id, agent_id, title, created_at, updated_at, archived, messages
                 FROM conversations WHERE id = ? AND user_id = ?",
                params![id, user_id],
                row_to_session,
            )
            .optional()
            .context("failed to query conversation")
            .map_err(|e| ParlanceError::Storage(e.to_string()))?;

        match result {
            Some((mut session, messages_json)) => {
                session.messages = serde_json::from_str(&messages_json)
                    .context("failed to deserialize messages")
                    .map_err(|e| ParlanceError::Storage(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn update_conversation(
        &self,
        id: &str,
        user_id: &str,
        update: ConversationUpdate,
    ) -> Result<Session> {
        {
            let conn = self.open()?;
            let now = Utc::now().to_rfc3339();

            if let Some(title) = &update.title {
                conn.execute(
                    "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ? AND user_id = ?",
                    params![title, now, id, user_id],
                )
                .context("failed to update title")
                .map_err(|e| ParlanceError::Storage(e.to_string()))?;
            }

            if let Some(messages) = &update.messages {
                let messages_json = serde_json::to_string(messages)
                    .context("failed to serialize messages")
                    .map_err(|e| ParlanceError::Storage(e.to_string()))?;
                conn.execute(
                    "UPDATE conversations SET messages = ?, updated_at = ? WHERE id = ? AND user_id = ?",
                    params![messages_json, now, id, user_id],
                )
                .context("failed to update messages")
                .map_err(|e| ParlanceError::Storage(e.to_string()))?;
            }

            if let Some(archived) = update.archived {
                conn.execute(
                    "UPDATE conversations SET archived = ?, updated_at = ? WHERE id = ? AND user_id = ?",
                    params![archived, now, id, user_id],
                )
                .context("failed to update archived flag")
                .map_err(|e| ParlanceError::Storage(e.to_string()))?;
            }
        }

        self.get_conversation(id, user_id)
            .await?
            .ok_or_else(|| ParlanceError::Storage(format!("conversation not found: {}", id)).into())
    }

    async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM conversations WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )
        .context("failed to delete conversation")
        .map_err(|e| ParlanceError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn search_conversations(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let conn = self.open()?;
        let pattern = format!("%{}%", query);

        let mut stmt = stmt_or_storage_err(
            &conn,
            "SELECT id, title, messages FROM conversations
             WHERE user_id = ? AND (title LIKE ? OR messages LIKE ?)
             ORDER BY updated_at DESC LIMIT ?",
        )?;

        let rows = stmt
            .query_map(params![user_id, pattern, pattern, limit as i64], |row| {
                let id: String = row.get(0)?;
                let title: Option<String> = row.get(1)?;
                let messages_json: String = row.get(2)?;
                Ok((id, title, messages_json))
            })
            .context("failed to run search")
            .map_err(|e| ParlanceError::Storage(e.to_string()))?;

        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for row in rows.flatten() {
            let (id, title, messages_json) = row;
            let messages: Vec<ChatMessage> =
                serde_json::from_str(&messages_json).unwrap_or_default();
            let matched = messages
                .iter()
                .find(|m| m.content.to_lowercase().contains(&needle))
                .map(|m| m.content.clone())
                .unwrap_or_default();
            hits.push(SearchHit {
                session_id: id,
                session_title: title,
                matched_message: matched,
            });
        }
        Ok(hits)
    }

    async fn get_conversations(
        &self,
        user_id: &str,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<ConversationSummary>> {
        let conn = self.open()?;
        let sql = if include_archived {
            "SELECT id, user_id, agent_id, title, created_at, updated_at, archived, messages
             FROM conversations WHERE user_id = ?
             ORDER BY updated_at DESC LIMIT ?"
        } else {
            "SELECT id, user_id, agent_id, title, created_at, updated_at, archived, messages
             FROM conversations WHERE user_id = ? AND archived = 0
             ORDER BY updated_at DESC LIMIT ?"
        };

        let mut stmt = stmt_or_storage_err(&conn, sql)?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                let (session, messages_json) = row_to_session(row)?;
                // Summaries only need a count; avoid the full message parse
                let message_count = serde_json::from_str::<serde_json::Value>(&messages_json)
                    .ok()
                    .and_then(|v| v.as_array().map(|a| a.len()))
                    .unwrap_or(0);
                Ok(ConversationSummary {
                    id: session.id,
                    user_id: session.user_id,
                    agent_id: session.agent_id,
                    title: session.title,
                    created_at: session.created_at,
                    updated_at: session.updated_at,
                    message_count,
                    archived: session.archived,
                })
            })
            .context("failed to query conversations")
            .map_err(|e| ParlanceError::Storage(e.to_string()))?;

        Ok(rows.flatten().collect())
    }
}

fn stmt_or_storage_err<'a>(conn: &'a Connection, sql: &str) -> Result<rusqlite::Statement<'a>> {
    conn.prepare(sql)
        .context("failed to prepare statement")
        .map_err(|e| ParlanceError::Storage(e.to_string()).into())
}
