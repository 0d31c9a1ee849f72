//! Conversation session core
//!
//! Message and tool-call types, the deduplicating message store, and
//! the controller state machine that ties them to a streaming provider.

pub mod controller;
pub mod message;
pub mod store;
pub mod tool_calls;

pub use controller::{
    LoadOutcome, SendOutcome, SessionController, SessionState, DEFAULT_AUTOSAVE_DELAY,
};
pub use message::{derive_title, new_message_id, ChatMessage, Role};
pub use store::MessageStore;
pub use tool_calls::{ToolCallState, ToolCallStatus};
