//! Chat message types for session transcripts
//!
//! This module defines the message structure held by the message store,
//! along with the role enum and title derivation for auto-saved sessions.

use crate::session::tool_calls::ToolCallState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a derived session title
const MAX_TITLE_LEN: usize = 48;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message typed by the user
    User,
    /// A message produced by the assistant agent
    Agent,
    /// Framing or instruction text injected by the application
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A single message in a conversation transcript
///
/// Messages are identified by an opaque id that is unique within a
/// session; the message store merges by id, so re-delivering a message
/// with the same id replaces the earlier copy in place.
///
/// `streaming` is transient: it is `true` only while a provider stream
/// is still appending tokens to this message and must be cleared when
/// the stream ends, errors, or is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Opaque unique identifier within the session
    pub id: String,
    /// Author role
    pub role: Role,
    /// Message text (may grow while `streaming` is true)
    pub content: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Identifier of the agent that produced this message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
    /// Whether a provider stream is still appending to this message
    #[serde(default)]
    pub streaming: bool,
    /// Tool calls attached to this message, in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallState>,
}

impl ChatMessage {
    /// Creates a new user message with a fresh id
    ///
    /// # Examples
    ///
    /// ```
    /// use parlance::session::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(!msg.streaming);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            source_agent: None,
            streaming: false,
            tool_calls: Vec::new(),
        }
    }

    /// Creates a new agent message with a fresh id
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::Agent,
            content: content.into(),
            created_at: Utc::now(),
            source_agent: None,
            streaming: false,
            tool_calls: Vec::new(),
        }
    }

    /// Creates an empty agent message in streaming state
    ///
    /// The session controller creates one of these with a fresh id before
    /// the first token of a provider stream arrives, so a partial failure
    /// can never corrupt a previously completed message.
    pub fn agent_streaming(source_agent: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::Agent,
            content: String::new(),
            created_at: Utc::now(),
            source_agent: Some(source_agent.into()),
            streaming: true,
            tool_calls: Vec::new(),
        }
    }

    /// Creates a new system message with a fresh id
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::System,
            content: content.into(),
            created_at: Utc::now(),
            source_agent: None,
            streaming: false,
            tool_calls: Vec::new(),
        }
    }
}

/// Generate a fresh opaque message id
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Derive a session title from the first user message
///
/// Titles are generated, not user-supplied: the first user message is
/// collapsed to a single line and truncated. Falls back to a fixed
/// placeholder when no user message exists yet.
///
/// # Examples
///
/// ```
/// use parlance::session::{derive_title, ChatMessage};
///
/// let messages = vec![ChatMessage::user("Plan my week")];
/// assert_eq!(derive_title(&messages), "Plan my week");
/// ```
pub fn derive_title(messages: &[ChatMessage]) -> String {
    let first_user = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");

    if first_user.is_empty() {
        return "New conversation".to_string();
    }

    let one_line = first_user.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_title(&one_line, MAX_TITLE_LEN)
}

/// Truncates a title to a maximum length, adding ellipsis if truncated
fn truncate_title(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut truncated = s.chars().take(max_len - 3).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
