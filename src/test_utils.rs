//! Test utilities for Parlance
//!
//! Deterministic fakes for exercising the session layer without a
//! network or a database: a provider that plays back a scripted event
//! sequence and an in-memory persistence backend.

use crate::error::{ParlanceError, Result};
use crate::persistence::{
    ConversationSummary, ConversationUpdate, PersistenceService, SearchHit, Session,
};
use crate::providers::{EventStream, Provider, StreamEvent, StreamRequest};
use crate::session::ChatMessage;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Provider that plays back a fixed event sequence
///
/// Honors cancellation between events exactly like the real adapters:
/// once the request token is cancelled, nothing further is emitted.
pub struct ScriptedProvider {
    script: Vec<StreamEvent>,
    cancel_after: Option<usize>,
    event_delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Creates a provider that emits the given events in order
    pub fn new(script: Vec<StreamEvent>) -> Self {
        Self {
            script,
            cancel_after: None,
            event_delay: None,
        }
    }

    /// Cancels the request token after emitting `count` events
    ///
    /// Simulates the user interrupting mid-stream at a deterministic
    /// point.
    pub fn cancel_after(mut self, count: usize) -> Self {
        self.cancel_after = Some(count);
        self
    }

    /// Sleeps between events, keeping the stream in flight long enough
    /// for a test to act while it runs
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream(&self, request: StreamRequest) -> Result<EventStream> {
        let script = self.script.clone();
        let cancel_after = self.cancel_after;
        let event_delay = self.event_delay;
        let cancel = request.cancel.clone();

        let (tx, stream) = EventStream::channel();
        tokio::spawn(async move {
            for (index, event) in script.into_iter().enumerate() {
                if cancel_after == Some(index) {
                    cancel.cancel();
                }
                if cancel.is_cancelled() {
                    return;
                }
                if let Some(delay) = event_delay {
                    tokio::time::sleep(delay).await;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory persistence backend
///
/// Stores sessions in a map and mimics the SQLite backend's contract,
/// including per-user scoping. Can be switched into a failing mode to
/// exercise error paths.
#[derive(Default)]
pub struct MemoryPersistence {
    sessions: Mutex<HashMap<String, Session>>,
    create_count: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryPersistence {
    /// Creates an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call return a storage error
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Inserts a session directly, returning its id
    pub fn seed_session(
        &self,
        user_id: &str,
        agent_id: &str,
        messages: Vec<ChatMessage>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.lock().insert(
            id.clone(),
            Session {
                id: id.clone(),
                user_id: user_id.to_string(),
                agent_id: agent_id.to_string(),
                title: None,
                created_at: now,
                updated_at: now,
                messages,
                archived: false,
            },
        );
        id
    }

    /// All stored sessions, newest `updated_at` first
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.lock().values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Number of `create_conversation` calls observed
    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failing(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ParlanceError::Storage("simulated storage failure".into()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceService for MemoryPersistence {
    async fn create_conversation(
        &self,
        user_id: &str,
        agent_id: &str,
        title: Option<String>,
    ) -> Result<String> {
        self.check_failing()?;
        self.create_count.fetch_add(1, Ordering::SeqCst);
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.lock().insert(
            id.clone(),
            Session {
                id: id.clone(),
                user_id: user_id.to_string(),
                agent_id: agent_id.to_string(),
                title,
                created_at: now,
                updated_at: now,
                messages: Vec::new(),
                archived: false,
            },
        );
        Ok(id)
    }

    async fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<Session>> {
        self.check_failing()?;
        Ok(self
            .lock()
            .get(id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn update_conversation(
        &self,
        id: &str,
        user_id: &str,
        update: ConversationUpdate,
    ) -> Result<Session> {
        self.check_failing()?;
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| ParlanceError::Storage(format!("conversation not found: {}", id)))?;

        if let Some(title) = update.title {
            session.title = Some(title);
        }
        if let Some(messages) = update.messages {
            session.messages = messages;
        }
        if let Some(archived) = update.archived {
            session.archived = archived;
        }
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<()> {
        self.check_failing()?;
        let mut sessions = self.lock();
        if sessions.get(id).is_some_and(|s| s.user_id == user_id) {
            sessions.remove(id);
        }
        Ok(())
    }

    async fn search_conversations(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_failing()?;
        let needle = query.to_lowercase();
        let mut hits: Vec<(chrono::DateTime<Utc>, SearchHit)> = Vec::new();
        for session in self.lock().values() {
            if session.user_id != user_id {
                continue;
            }
            let title_matches = session
                .title
                .as_deref()
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false);
            let matched = session
                .messages
                .iter()
                .find(|m| m.content.to_lowercase().contains(&needle));
            if title_matches || matched.is_some() {
                hits.push((
                    session.updated_at,
                    SearchHit {
                        session_id: session.id.clone(),
                        session_title: session.title.clone(),
                        matched_message: matched.map(|m| m.content.clone()).unwrap_or_default(),
                    },
                ));
            }
        }
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits.into_iter().map(|(_, hit)| hit).take(limit).collect())
    }

    async fn get_conversations(
        &self,
        user_id: &str,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<ConversationSummary>> {
        self.check_failing()?;
        let mut summaries: Vec<ConversationSummary> = self
            .lock()
            .values()
            .filter(|s| s.user_id == user_id && (include_archived || !s.archived))
            .map(|s| ConversationSummary {
                id: s.id.clone(),
                user_id: s.user_id.clone(),
                agent_id: s.agent_id.clone(),
                title: s.title.clone(),
                created_at: s.created_at,
                updated_at: s.updated_at,
                message_count: s.messages.len(),
                archived: s.archived,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}
