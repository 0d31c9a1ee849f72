//! OpenAI-style chat-completions streaming adapter
//!
//! Speaks the `POST /chat/completions` SSE protocol: the response body
//! is a `text/event-stream` of `data: {json}` chunks terminated by a
//! `data: [DONE]` sentinel. System messages stay in the message list;
//! this dialect has no separate system field.

use crate::auth::CredentialProvider;
use crate::config::OpenAiConfig;
use crate::error::Result;
use crate::providers::base::{
    EventStream, FrameBuffer, PromptMessage, Provider, StreamEvent, StreamRequest,
    ToolCallRequest,
};
use crate::session::message::Role;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// HTTP request timeout for the initial connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of an upstream error body carried into an error event
const ERROR_BODY_EXCERPT: usize = 200;

/// OpenAI-style streaming provider
pub struct OpenAiProvider {
    config: OpenAiConfig,
    credentials: Arc<dyn CredentialProvider>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new adapter from configuration
    pub fn new(config: OpenAiConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(&self, request: StreamRequest) -> Result<EventStream> {
        let body = build_request_body(&self.config.model, &request.messages);
        let mut http = self
            .client
            .post(self.completions_url())
            .header("Accept", "text/event-stream")
            .json(&body);

        // Anonymous operation when no credential is available
        if let Some(token) = self.credentials.bearer_token() {
            http = http.bearer_auth(token);
        }

        let (tx, stream) = EventStream::channel();
        let cancel = request.cancel.clone();
        tokio::spawn(async move {
            run_stream(http, tx, cancel).await;
        });

        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Builds the chat-completions request body
///
/// System messages are passed through in the list; the agent role maps
/// to this dialect's `assistant`.
fn build_request_body(model: &str, messages: &[PromptMessage]) -> serde_json::Value {
    let wire_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": wire_role(m.role),
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": model,
        "messages": wire_messages,
        "stream": true,
    })
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Agent => "assistant",
        Role::System => "system",
    }
}

/// Drives the HTTP request and forwards parsed events
///
/// Runs inside a spawned task. The cancellation token is checked
/// between every event emission; after cancellation nothing further is
/// sent, in particular no `End`.
async fn run_stream(
    http: reqwest::RequestBuilder,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let response = match http.send().await {
        Ok(r) => r,
        Err(e) => {
            forward(&tx, &cancel, StreamEvent::Error(format!("request failed: {}", e))).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
        forward(
            &tx,
            &cancel,
            StreamEvent::Error(format!("upstream returned {}: {}", status, excerpt)),
        )
        .await;
        return;
    }

    if !forward(&tx, &cancel, StreamEvent::Start).await {
        return;
    }

    let mut byte_stream = response.bytes_stream();
    let mut buffer = FrameBuffer::sse();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = byte_stream.next() => chunk,
        };

        let Some(chunk) = chunk else { break };
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                forward(&tx, &cancel, StreamEvent::Error(format!("stream interrupted: {}", e)))
                    .await;
                return;
            }
        };

        buffer.extend(&bytes);

        // SSE events are separated by blank lines (`\n\n`).
        while let Some(block) = buffer.next_frame() {
            for data in sse_data_lines(&block) {
                if data == "[DONE]" {
                    forward(&tx, &cancel, StreamEvent::End).await;
                    return;
                }
                for event in parse_chunk(&data) {
                    if !forward(&tx, &cancel, event).await {
                        return;
                    }
                }
            }
        }
    }

    // Body ended without the [DONE] sentinel; treat as a normal end.
    forward(&tx, &cancel, StreamEvent::End).await;
}

/// Sends an event unless cancellation has been observed
///
/// Returns false when the event was not delivered (cancelled or the
/// consumer dropped the stream) and production should stop.
async fn forward(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

/// Extracts `data:` field values from one SSE event block
fn sse_data_lines(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Parses one `data:` JSON payload into stream events
///
/// Unparseable chunks are dropped with a warning rather than aborting
/// the stream; the upstream may interleave housekeeping payloads.
fn parse_chunk(data: &str) -> Vec<StreamEvent> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("dropping unparseable stream chunk: {}", e);
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                events.push(StreamEvent::Token(content));
            }
        }
        for call in choice.delta.tool_calls.unwrap_or_default() {
            // Only the first fragment of a call carries the name; later
            // fragments stream argument text and are not lifecycle events.
            if let Some(function) = call.function {
                if let Some(name) = function.name {
                    let parameters = function
                        .arguments
                        .as_deref()
                        .and_then(|a| serde_json::from_str(a).ok())
                        .unwrap_or(serde_json::Value::Null);
                    events.push(StreamEvent::ToolUseStart(ToolCallRequest {
                        id: call.id.unwrap_or_default(),
                        name,
                        parameters,
                    }));
                }
            }
        }
    }
    events
}
