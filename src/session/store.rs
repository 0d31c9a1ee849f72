//! Ordered, deduplicated message collection for one session
//!
//! The store is a merge-by-id collection: ingesting the same message id
//! twice replaces the earlier copy in place instead of appending a
//! duplicate. This is what makes streaming ingestion safe to re-apply
//! for every delta.

use crate::session::message::ChatMessage;

/// Ordered, deduplicated collection of chat messages for one session
///
/// Invariants:
/// - message ids form a set (no two live messages share an id)
/// - iteration order is insertion order, except that [`replace_all`]
///   imposes the order supplied by the caller (the server-provided order
///   on historical loads)
///
/// [`replace_all`]: MessageStore::replace_all
///
/// # Examples
///
/// ```
/// use parlance::session::{ChatMessage, MessageStore};
///
/// let mut store = MessageStore::new();
/// let msg = ChatMessage::user("hello");
/// store.upsert(msg.clone());
/// store.upsert(msg);
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts at the end if the id is absent, otherwise replaces the
    /// existing message in place, preserving its position
    ///
    /// Idempotent: applying the same message twice leaves the store
    /// identical to applying it once.
    pub fn upsert(&mut self, message: ChatMessage) {
        match self.position(&message.id) {
            Some(idx) => self.messages[idx] = message,
            None => self.messages.push(message),
        }
    }

    /// Convenience alias for [`upsert`](Self::upsert) when the id is
    /// known to be new
    pub fn append(&mut self, message: ChatMessage) {
        self.upsert(message);
    }

    /// Atomically replaces the entire contents
    ///
    /// Used only on historical loads; the supplied order wins. Should
    /// the input itself carry duplicate ids, the last occurrence wins
    /// and takes the first occurrence's position, so the id-set
    /// invariant holds for any input.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        let mut deduped: Vec<ChatMessage> = Vec::with_capacity(messages.len());
        for message in messages {
            match deduped.iter().position(|m| m.id == message.id) {
                Some(idx) => deduped[idx] = message,
                None => deduped.push(message),
            }
        }
        self.messages = deduped;
    }

    /// Removes all messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Returns the message with the given id, if present
    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Returns a mutable reference to the message with the given id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Returns all messages in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the store holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}
