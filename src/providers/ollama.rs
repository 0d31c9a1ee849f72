//! Ollama-style NDJSON streaming adapter for local models
//!
//! Speaks the `POST /api/chat` protocol: the response body is a stream
//! of newline-delimited JSON objects, each carrying a message fragment,
//! with `"done": true` on the final line. Local servers take no
//! credentials; the adapter never sends an auth header.

use crate::config::OllamaConfig;
use crate::error::Result;
use crate::providers::base::{
    EventStream, FrameBuffer, PromptMessage, Provider, StreamEvent, StreamRequest,
};
use crate::session::message::Role;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_EXCERPT: usize = 200;

/// Ollama-style streaming provider
pub struct OllamaProvider {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new adapter from configuration
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.host.trim_end_matches('/'))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn stream(&self, request: StreamRequest) -> Result<EventStream> {
        let body = build_request_body(&self.config.model, &request.messages);
        let http = self.client.post(self.chat_url()).json(&body);

        let (tx, stream) = EventStream::channel();
        let cancel = request.cancel.clone();
        tokio::spawn(async move {
            run_stream(http, tx, cancel).await;
        });

        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

/// Builds the chat request body; system messages stay in the list
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
    let mut buffer = FrameBuffer::lines();

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

        while let Some(line) = buffer.next_frame() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_line(line) {
                LineOutcome::Token(token) => {
                    if !forward(&tx, &cancel, StreamEvent::Token(token)).await {
                        return;
                    }
                }
                LineOutcome::Done => {
                    forward(&tx, &cancel, StreamEvent::End).await;
                    return;
                }
                LineOutcome::Error(message) => {
                    forward(&tx, &cancel, StreamEvent::Error(message)).await;
                    return;
                }
                LineOutcome::Skip => {}
            }
        }
    }

    // Body ended without a done marker; treat as a normal end.
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

#[derive(Debug, Deserialize)]
struct WireLine {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum LineOutcome {
    Token(String),
    Done,
    Error(String),
    Skip,
}

/// Classifies one NDJSON line
fn parse_line(line: &str) -> LineOutcome {
    let wire: WireLine = match serde_json::from_str(line) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("dropping unparseable stream line: {}", e);
            return LineOutcome::Skip;
        }
    };

    if let Some(error) = wire.error {
        return LineOutcome::Error(error);
    }
    if let Some(content) = wire.message.and_then(|m| m.content) {
        if !content.is_empty() {
            // A token can share a line with the done marker; the token
            // wins and End follows when the body finishes.
            return LineOutcome::Token(content);
        }
    }
    if wire.done {
        return LineOutcome::Done;
    }
    LineOutcome::Skip
}
