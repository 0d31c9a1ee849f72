//! Anthropic-style messages streaming adapter
//!
//! Speaks the `POST /v1/messages` SSE protocol: typed events such as
//! `message_start`, `content_block_delta`, and `message_stop`. Unlike
//! the OpenAI dialect, system messages do not travel in the message
//! list; they are merged into a top-level `system` parameter at this
//! call boundary.

use crate::auth::CredentialProvider;
use crate::config::AnthropicConfig;
use crate::error::Result;
use crate::providers::base::{
    split_system_prompt, EventStream, FrameBuffer, PromptMessage, Provider, StreamEvent,
    StreamRequest, ToolCallRequest,
};
use crate::session::message::Role;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_EXCERPT: usize = 200;

/// The messages API requires an explicit completion token cap
const MAX_TOKENS: u32 = 4096;

/// Anthropic-style streaming provider
pub struct AnthropicProvider {
    config: AnthropicConfig,
    credentials: Arc<dyn CredentialProvider>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a new adapter from configuration
    pub fn new(config: AnthropicConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(&self, request: StreamRequest) -> Result<EventStream> {
        let body = build_request_body(&self.config.model, &request.messages);
        let mut http = self
            .client
            .post(self.messages_url())
            .header("Accept", "text/event-stream")
            .header("anthropic-version", self.config.version.as_str())
            .json(&body);

        // This dialect authenticates with an API-key header; absence of
        // a credential means anonymous operation.
        if let Some(token) = self.credentials.bearer_token() {
            http = http.header("x-api-key", token);
        }

        let (tx, stream) = EventStream::channel();
        let cancel = request.cancel.clone();
        tokio::spawn(async move {
            run_stream(http, tx, cancel).await;
        });

        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

/// Builds the messages request body
///
/// System messages are lifted out of the transcript into the `system`
/// parameter; the remaining messages map agent -> `assistant`.
fn build_request_body(model: &str, messages: &[PromptMessage]) -> serde_json::Value {
    let (system, rest) = split_system_prompt(messages);

    let wire_messages: Vec<serde_json::Value> = rest
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": wire_role(m.role),
                "content": m.content,
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": wire_messages,
        "stream": true,
    });
    if let Some(system) = system {
        body["system"] = serde_json::Value::String(system);
    }
    body
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        // System entries are removed by split_system_prompt before this
        // mapping runs.
        Role::Agent | Role::System => "assistant",
    }
}

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

        while let Some(block) = buffer.next_frame() {
            for data in sse_data_lines(&block) {
                match parse_event(&data) {
                    Some(StreamEvent::End) => {
                        forward(&tx, &cancel, StreamEvent::End).await;
                        return;
                    }
                    Some(event) => {
                        let terminal = matches!(event, StreamEvent::Error(_));
                        if !forward(&tx, &cancel, event).await || terminal {
                            return;
                        }
                    }
                    None => {}
                }
            }
        }
    }

    // Body ended without message_stop; treat as a normal end.
    forward(&tx, &cancel, StreamEvent::End).await;
}

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

fn sse_data_lines(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    content_block: Option<WireContentBlock>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

/// Maps one typed wire event onto the stream vocabulary
///
/// Events with no bearing on the transcript (`ping`, `content_block_stop`,
/// `message_delta`) map to `None`.
fn parse_event(data: &str) -> Option<StreamEvent> {
    let event: WireEvent = match serde_json::from_str(data) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("dropping unparseable stream event: {}", e);
            return None;
        }
    };

    match event.kind.as_str() {
        "message_start" => Some(StreamEvent::Start),
        "content_block_delta" => {
            let delta = event.delta?;
            if delta.kind.as_deref() == Some("text_delta") {
                delta.text.filter(|t| !t.is_empty()).map(StreamEvent::Token)
            } else {
                None
            }
        }
        "content_block_start" => {
            let block = event.content_block?;
            if block.kind == "tool_use" {
                Some(StreamEvent::ToolUseStart(ToolCallRequest {
                    id: block.id.unwrap_or_default(),
                    name: block.name.unwrap_or_default(),
                    parameters: block.input,
                }))
            } else {
                None
            }
        }
        "message_stop" => Some(StreamEvent::End),
        "error" => {
            let message = event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown upstream error".to_string());
            Some(StreamEvent::Error(message))
        }
        _ => None,
    }
}
