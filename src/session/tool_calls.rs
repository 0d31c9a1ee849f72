//! Tool-call lifecycle tracking
//!
//! A tool call is a delegated action requested by the model mid-stream.
//! Its lifecycle is a small finite-state machine:
//!
//! ```text
//! Pending -> Running -> { Completed, Error }
//! ```
//!
//! No transition skips `Running`, and terminal states are frozen: once a
//! call is `Completed` or `Error`, further updates to the same id are
//! ignored rather than merged.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    /// Requested but not yet started
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully (terminal)
    Completed,
    /// Finished with an error (terminal)
    Error,
}

impl ToolCallStatus {
    /// Returns true for `Completed` and `Error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Finite-state record of a single delegated action's lifecycle
///
/// Owned exclusively by the message it is attached to; never shared
/// across messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallState {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool being invoked
    pub name: String,
    /// Opaque structured arguments
    pub parameters: serde_json::Value,
    /// Current lifecycle status
    pub status: ToolCallStatus,
    /// Result payload, present once terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl ToolCallState {
    /// Creates a new tool call in `Pending` state
    ///
    /// # Examples
    ///
    /// ```
    /// use parlance::session::{ToolCallState, ToolCallStatus};
    ///
    /// let call = ToolCallState::pending("call_1", "search_tasks", serde_json::json!({}));
    /// assert_eq!(call.status, ToolCallStatus::Pending);
    /// ```
    pub fn pending(
        id: impl Into<String>,
        name: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters,
            status: ToolCallStatus::Pending,
            result: None,
        }
    }

    /// Creates a tool call already observed `Running`
    ///
    /// Used when the stream reports the call only once execution has
    /// begun; the `Pending` step is collapsed transparently.
    pub fn running(
        id: impl Into<String>,
        name: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters,
            status: ToolCallStatus::Running,
            result: None,
        }
    }

    /// Moves `Pending -> Running`
    ///
    /// Returns true if the transition was applied. A call already
    /// `Running` stays `Running` (idempotent); terminal calls are left
    /// untouched.
    pub fn begin(&mut self) -> bool {
        match self.status {
            ToolCallStatus::Pending => {
                self.status = ToolCallStatus::Running;
                true
            }
            ToolCallStatus::Running => true,
            _ => false,
        }
    }

    /// Marks the call completed with a result
    ///
    /// A call still `Pending` passes through `Running` before reaching
    /// the terminal state, so `Completed` is never exposed without a
    /// prior `Running`. Updates to an already-terminal call are ignored;
    /// returns whether the update was accepted.
    pub fn complete(&mut self, result: serde_json::Value) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.begin();
        self.status = ToolCallStatus::Completed;
        self.result = Some(result);
        true
    }

    /// Marks the call failed with an error payload
    ///
    /// Same transition rules as [`complete`](Self::complete).
    pub fn fail(&mut self, error: serde_json::Value) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.begin();
        self.status = ToolCallStatus::Error;
        self.result = Some(error);
        true
    }
}
