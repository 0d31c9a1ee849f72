//! Base provider trait and streaming types
//!
//! This module defines the `Provider` trait that all language-model
//! adapters implement, along with the stream event vocabulary the rest
//! of the crate consumes. Vendor wire protocols (SSE framing, NDJSON
//! lines, field names) are hidden entirely behind [`StreamEvent`];
//! callers never branch on adapter identity.

use crate::error::Result;
use crate::session::message::Role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel capacity for provider event streams
///
/// Small on purpose: backpressure keeps the producing task from running
/// far ahead of the consumer between suspension points.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// A prompt message handed to a provider adapter
///
/// This is the flattened, provider-facing view of the transcript.
/// System-role entries are adapter-specific framing: some adapters keep
/// them in the message list, others lift them into a dedicated request
/// field (see [`split_system_prompt`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Author role
    pub role: Role,
    /// Message text
    pub content: String,
}

impl PromptMessage {
    /// Creates a user prompt message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an agent prompt message
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
        }
    }

    /// Creates a system prompt message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A tool invocation announced by the model mid-stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool being invoked
    pub name: String,
    /// Opaque structured arguments
    pub parameters: serde_json::Value,
}

/// One unit of output from a language-model provider
///
/// The sequence produced for one request is finite and not restartable:
/// a new `stream` call must be issued to retry. Every upstream failure
/// mode is expressed as an `Error` event, never as a raised fault.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The provider has accepted the request and will begin emitting
    Start,
    /// A partial-response text fragment, in producer order
    Token(String),
    /// The model has begun a tool invocation
    ToolUseStart(ToolCallRequest),
    /// Irrecoverable upstream failure; terminates the sequence
    Error(String),
    /// Normal end of the sequence; never emitted after cancellation
    End,
}

/// A streaming request to a provider adapter
///
/// The cancellation token is a one-way signal checked by the adapter
/// between event productions: once cancelled, no further events are
/// emitted and the producing task stops within one scheduling tick.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Transcript to complete, oldest first
    pub messages: Vec<PromptMessage>,
    /// Cooperative cancellation signal
    pub cancel: CancellationToken,
}

impl StreamRequest {
    /// Creates a request with a fresh, never-cancelled token
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self {
            messages,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a request driven by the given cancellation token
    pub fn with_cancel(messages: Vec<PromptMessage>, cancel: CancellationToken) -> Self {
        Self { messages, cancel }
    }
}

/// A finite, pull-based sequence of [`StreamEvent`]s
///
/// Backed by a bounded channel fed from the adapter's parsing task. The
/// consumer suspends between events, yielding control to the host loop
/// so rendering and cancellation input stay responsive.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    /// Creates a channel pair: the sender side feeds the stream
    ///
    /// # Examples
    ///
    /// ```
    /// use parlance::providers::{EventStream, StreamEvent};
    ///
    /// # tokio_test::block_on(async {
    /// let (tx, mut stream) = EventStream::channel();
    /// tx.send(StreamEvent::Start).await.unwrap();
    /// drop(tx);
    /// assert_eq!(stream.next_event().await, Some(StreamEvent::Start));
    /// assert_eq!(stream.next_event().await, None);
    /// # });
    /// ```
    pub fn channel() -> (mpsc::Sender<StreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (tx, Self { rx })
    }

    /// Receives the next event, or `None` once the producer is done
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

/// Provider trait for language-model backends
///
/// Each adapter wraps one vendor's streaming API and exposes exactly one
/// capability: given a transcript, produce a lazy, cancellable sequence
/// of partial-response events.
///
/// # Errors
///
/// `stream` returns `Err` only for local request-construction problems
/// (bad configuration, unparseable base URL). Upstream failures during
/// streaming are delivered in-band as [`StreamEvent::Error`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Begins streaming a completion for the given request
    async fn stream(&self, request: StreamRequest) -> Result<EventStream>;

    /// Short human-readable adapter name for logging
    fn name(&self) -> &'static str;
}

/// Splits system messages out of a transcript
///
/// Returns the concatenated system text (if any) and the remaining
/// non-system messages in order. Adapters whose wire format carries a
/// dedicated `system` field use this at the call boundary; the message
/// store itself never performs this normalization.
///
/// # Examples
///
/// ```
/// use parlance::providers::{split_system_prompt, PromptMessage};
///
/// let messages = vec![
///     PromptMessage::system("Be brief."),
///     PromptMessage::user("hi"),
/// ];
/// let (system, rest) = split_system_prompt(&messages);
/// assert_eq!(system.as_deref(), Some("Be brief."));
/// assert_eq!(rest.len(), 1);
/// ```
pub fn split_system_prompt(
    messages: &[PromptMessage],
) -> (Option<String>, Vec<PromptMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut rest = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == Role::System {
            system_parts.push(message.content.as_str());
        } else {
            rest.push(message.clone());
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, rest)
}

/// Accumulates raw response bytes and yields complete frames
///
/// HTTP chunk boundaries carry no relation to frame boundaries, so
/// splitting happens on bytes before any UTF-8 decoding: a multi-byte
/// character arriving split across two network chunks is reassembled
/// instead of dropped. Only whole frames are ever decoded.
pub(crate) struct FrameBuffer {
    bytes: Vec<u8>,
    delimiter: &'static [u8],
}

impl FrameBuffer {
    /// Buffer for SSE bodies; frames end at a blank line
    pub(crate) fn sse() -> Self {
        Self {
            bytes: Vec::new(),
            delimiter: b"\n\n",
        }
    }

    /// Buffer for NDJSON bodies; frames end at a newline
    pub(crate) fn lines() -> Self {
        Self {
            bytes: Vec::new(),
            delimiter: b"\n",
        }
    }

    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Pops the next complete frame, decoded as UTF-8
    ///
    /// Returns `None` until a full delimiter has arrived; trailing
    /// bytes, including a partial multi-byte character, stay buffered
    /// for the next chunk.
    pub(crate) fn next_frame(&mut self) -> Option<String> {
        let pos = self
            .bytes
            .windows(self.delimiter.len())
            .position(|window| window == self.delimiter)?;
        let frame = String::from_utf8_lossy(&self.bytes[..pos]).into_owned();
        self.bytes.drain(..pos + self.delimiter.len());
        Some(frame)
    }
}
