//! Session controller: the state machine driving a live conversation
//!
//! One controller owns one live session. It feeds user messages to a
//! streaming provider, applies the resulting events to the message
//! store in producer order, guards against overlapping operations, and
//! debounces persistence writes.

use crate::error::{ParlanceError, Result};
use crate::persistence::{ConversationUpdate, PersistenceService};
use crate::providers::{PromptMessage, Provider, StreamEvent, StreamRequest};
use crate::session::message::{derive_title, new_message_id, ChatMessage};
use crate::session::store::MessageStore;
use crate::session::tool_calls::ToolCallState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default auto-save debounce delay
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(30);

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stream in flight; the live session accepts sends
    Idle,
    /// A provider stream is being consumed
    StreamingActive,
    /// A historical snapshot is being fetched
    LoadingHistorical,
    /// A historical snapshot is on display; the store is read-only
    ViewingHistorical,
}

/// How a `send_message` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream ran to completion
    Completed,
    /// The stream was cancelled; partial content is preserved
    Cancelled,
    /// The provider surfaced a stream error
    Errored(String),
    /// The controller was busy; nothing changed
    Rejected,
}

/// How a `load_historical` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The snapshot is now on display
    Loaded,
    /// A stream or another load was in flight; nothing changed
    Rejected,
}

struct Inner {
    state: SessionState,
    store: MessageStore,
    session_id: String,
    cancel: CancellationToken,
    pending_save: Option<JoinHandle<()>>,
}

impl Inner {
    fn reset_session(&mut self) {
        self.store.clear();
        self.session_id = new_message_id();
        self.state = SessionState::Idle;
        if let Some(handle) = self.pending_save.take() {
            handle.abort();
        }
    }

    fn disarm_autosave(&mut self) {
        if let Some(handle) = self.pending_save.take() {
            handle.abort();
        }
    }
}

/// Drives one live conversation session
///
/// All methods take `&self`; the controller is safe to share behind an
/// `Arc` so a signal handler can cancel a stream another task is
/// consuming. Internal locks are never held across an await.
pub struct SessionController {
    provider: Arc<dyn Provider>,
    persistence: Arc<dyn PersistenceService>,
    inner: Mutex<Inner>,
    /// Backend id of the saved conversation, assigned on first save
    remote_id: Arc<tokio::sync::Mutex<Option<String>>>,
    autosave_delay: Duration,
    user_id: String,
    agent_id: String,
}

impl SessionController {
    /// Creates a controller with an empty live session
    pub fn new(
        provider: Arc<dyn Provider>,
        persistence: Arc<dyn PersistenceService>,
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            persistence,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                store: MessageStore::new(),
                session_id: new_message_id(),
                cancel: CancellationToken::new(),
                pending_save: None,
            }),
            remote_id: Arc::new(tokio::sync::Mutex::new(None)),
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
            user_id: user_id.into(),
            agent_id: agent_id.into(),
        }
    }

    /// Overrides the auto-save debounce delay
    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Snapshot of the current transcript
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().store.messages().to_vec()
    }

    /// Id of the live session (regenerated by `create_new_session`)
    pub fn session_id(&self) -> String {
        self.lock().session_id.clone()
    }

    /// Discards the current transcript and starts a fresh live session
    ///
    /// Leaves historical mode, disarms the auto-save timer, and forgets
    /// the backend conversation id so the next save creates a new
    /// record.
    pub async fn create_new_session(&self) {
        self.lock().reset_session();
        *self.remote_id.lock().await = None;
    }

    /// Sends a user message and consumes the provider stream to the end
    ///
    /// Rejected as a no-op while a stream or a historical load is in
    /// flight. From `ViewingHistorical` the snapshot is discarded first
    /// and a fresh live session begins.
    ///
    /// The supplied token cancels the stream; cancellation preserves
    /// whatever content has already arrived.
    pub async fn send_message(&self, text: &str, cancel: CancellationToken) -> Result<SendOutcome> {
        self.send_message_observed(text, cancel, |_| {}).await
    }

    /// Like [`send_message`](Self::send_message), invoking `on_token`
    /// for every token as it is applied to the store
    pub async fn send_message_observed(
        &self,
        text: &str,
        cancel: CancellationToken,
        mut on_token: impl FnMut(&str) + Send,
    ) -> Result<SendOutcome> {
        // Admission and the StreamingActive transition happen under one
        // guard, so two concurrent sends can never both pass the busy
        // check.
        let (was_viewing, prompt) = {
            let mut inner = self.lock();
            let was_viewing = match inner.state {
                SessionState::StreamingActive | SessionState::LoadingHistorical => {
                    tracing::debug!("send rejected: controller busy in {:?}", inner.state);
                    return Ok(SendOutcome::Rejected);
                }
                SessionState::ViewingHistorical => {
                    // Discard the snapshot; this send starts a fresh
                    // live session.
                    inner.reset_session();
                    true
                }
                SessionState::Idle => false,
            };
            inner.state = SessionState::StreamingActive;
            inner.cancel = cancel.clone();
            inner.store.upsert(ChatMessage::user(text));
            let prompt = inner
                .store
                .messages()
                .iter()
                .map(|m| PromptMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect::<Vec<_>>();
            (was_viewing, prompt)
        };
        if was_viewing {
            // Forget the backend record so the next save creates a new
            // one; StreamingActive already excludes other senders.
            *self.remote_id.lock().await = None;
        }
        self.arm_autosave();

        // Fresh assistant message before the first token: a partial
        // failure can never corrupt a previously completed message.
        let assistant_id = {
            let mut inner = self.lock();
            let message = ChatMessage::agent_streaming(self.agent_id.clone());
            let id = message.id.clone();
            inner.store.upsert(message);
            id
        };

        let request = StreamRequest::with_cancel(prompt, cancel.clone());
        let mut stream = match self.provider.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("provider stream setup failed: {}", error);
                self.finalize_assistant(&assistant_id, Some(&error));
                self.arm_autosave();
                return Ok(SendOutcome::Errored(error));
            }
        };

        let mut outcome = SendOutcome::Completed;
        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Start => {}
                StreamEvent::Token(token) => {
                    on_token(&token);
                    {
                        let mut inner = self.lock();
                        if let Some(message) = inner.store.get_mut(&assistant_id) {
                            message.content.push_str(&token);
                        }
                    }
                    self.arm_autosave();
                }
                StreamEvent::ToolUseStart(request) => {
                    {
                        let mut inner = self.lock();
                        if let Some(message) = inner.store.get_mut(&assistant_id) {
                            let mut call =
                                ToolCallState::pending(request.id, request.name, request.parameters);
                            call.begin();
                            message.tool_calls.push(call);
                        }
                    }
                    self.arm_autosave();
                }
                StreamEvent::Error(error) => {
                    outcome = SendOutcome::Errored(error);
                    break;
                }
                StreamEvent::End => break,
            }
        }

        if cancel.is_cancelled() && outcome == SendOutcome::Completed {
            outcome = SendOutcome::Cancelled;
        }

        let error = match &outcome {
            SendOutcome::Errored(e) => Some(e.clone()),
            _ => None,
        };
        self.finalize_assistant(&assistant_id, error.as_deref());
        self.arm_autosave();

        Ok(outcome)
    }

    /// Cancels the in-flight stream, if any
    ///
    /// Idempotent and always accepted; with no stream in flight it does
    /// nothing.
    pub fn cancel(&self) {
        self.lock().cancel.cancel();
    }

    /// Loads a historical session snapshot for viewing
    ///
    /// Rejected as a no-op while a stream or another load is in flight.
    /// On success the store holds the snapshot in server order and the
    /// controller enters `ViewingHistorical`. On failure the controller
    /// returns to `Idle` with the previous transcript untouched and the
    /// error is recoverable.
    pub async fn load_historical(&self, id: &str) -> Result<LoadOutcome> {
        {
            let mut inner = self.lock();
            match inner.state {
                SessionState::StreamingActive | SessionState::LoadingHistorical => {
                    tracing::debug!("historical load rejected: controller busy");
                    return Ok(LoadOutcome::Rejected);
                }
                _ => inner.state = SessionState::LoadingHistorical,
            }
            // Historical mode never auto-saves
            inner.disarm_autosave();
        }

        match self.persistence.get_conversation(id, &self.user_id).await {
            Ok(Some(session)) => {
                let mut inner = self.lock();
                inner.store.replace_all(session.messages);
                inner.state = SessionState::ViewingHistorical;
                Ok(LoadOutcome::Loaded)
            }
            Ok(None) => {
                self.lock().state = SessionState::Idle;
                Err(ParlanceError::HistoricalLoad(format!("session not found: {}", id)).into())
            }
            Err(e) => {
                self.lock().state = SessionState::Idle;
                Err(ParlanceError::HistoricalLoad(e.to_string()).into())
            }
        }
    }

    /// Resumes a saved session as the live session
    ///
    /// Unlike [`load_historical`](Self::load_historical) the loaded
    /// transcript becomes mutable and future saves update the same
    /// backend record.
    pub async fn resume(&self, id: &str) -> Result<()> {
        {
            let inner = self.lock();
            if inner.state != SessionState::Idle {
                return Err(ParlanceError::SessionBusy(
                    "resume requires an idle controller".into(),
                )
                .into());
            }
        }

        let session = self
            .persistence
            .get_conversation(id, &self.user_id)
            .await?
            .ok_or_else(|| ParlanceError::HistoricalLoad(format!("session not found: {}", id)))?;

        {
            let mut inner = self.lock();
            inner.store.replace_all(session.messages);
            inner.state = SessionState::Idle;
        }
        *self.remote_id.lock().await = Some(session.id);
        Ok(())
    }

    /// Forces an immediate best-effort save
    ///
    /// Used by the chat surface on exit so the debounce window cannot
    /// swallow the final messages. Failures are logged and swallowed,
    /// as with the debounced path.
    pub async fn flush_save(&self) {
        let snapshot = {
            let mut inner = self.lock();
            inner.disarm_autosave();
            if inner.state == SessionState::ViewingHistorical || inner.store.is_empty() {
                return;
            }
            (derive_title(inner.store.messages()), inner.store.messages().to_vec())
        };
        let (title, messages) = snapshot;
        save_snapshot(
            Arc::clone(&self.persistence),
            Arc::clone(&self.remote_id),
            self.user_id.clone(),
            self.agent_id.clone(),
            title,
            messages,
        )
        .await;
    }

    fn finalize_assistant(&self, id: &str, error: Option<&str>) {
        let mut inner = self.lock();
        if let Some(message) = inner.store.get_mut(id) {
            if let Some(error) = error {
                if !message.content.is_empty() {
                    message.content.push('\n');
                }
                message.content.push_str(&format!("[stream error: {}]", error));
            }
            message.streaming = false;
        }
        inner.state = SessionState::Idle;
    }

    /// (Re)arms the debounced save timer with a fresh store snapshot
    fn arm_autosave(&self) {
        let snapshot = {
            let mut inner = self.lock();
            if inner.state == SessionState::ViewingHistorical {
                return;
            }
            inner.disarm_autosave();
            (derive_title(inner.store.messages()), inner.store.messages().to_vec())
        };
        let (title, messages) = snapshot;

        let persistence = Arc::clone(&self.persistence);
        let remote_id = Arc::clone(&self.remote_id);
        let user_id = self.user_id.clone();
        let agent_id = self.agent_id.clone();
        let delay = self.autosave_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            save_snapshot(persistence, remote_id, user_id, agent_id, title, messages).await;
        });
        self.lock().pending_save = Some(handle);
    }
}

/// Writes one store snapshot through the persistence service
///
/// Creates the backend conversation on the first save and records its
/// id for later updates. Failures are logged at warn and swallowed; a
/// missed save never disturbs the live session.
async fn save_snapshot(
    persistence: Arc<dyn PersistenceService>,
    remote_id: Arc<tokio::sync::Mutex<Option<String>>>,
    user_id: String,
    agent_id: String,
    title: String,
    messages: Vec<ChatMessage>,
) {
    // The lock is held across the create so two overlapping saves
    // cannot both create a backend record.
    let mut guard = remote_id.lock().await;
    let id = match guard.as_ref() {
        Some(id) => id.clone(),
        None => match persistence
            .create_conversation(&user_id, &agent_id, Some(title.clone()))
            .await
        {
            Ok(id) => {
                *guard = Some(id.clone());
                id
            }
            Err(e) => {
                tracing::warn!("auto-save failed to create conversation: {}", e);
                return;
            }
        },
    };

    let update = ConversationUpdate {
        title: Some(title),
        messages: Some(messages),
        archived: None,
    };
    if let Err(e) = persistence.update_conversation(&id, &user_id, update).await {
        tracing::warn!("auto-save failed: {}", e);
    }
}
