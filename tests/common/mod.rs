//! Shared helpers for integration tests

use async_trait::async_trait;
use parlance::error::Result;
use parlance::persistence::SqliteStore;
use parlance::providers::{EventStream, Provider, StreamEvent, StreamRequest};
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_store() -> (SqliteStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("sessions.db");
    let store = SqliteStore::new_with_path(db_path).expect("failed to create sqlite store");
    (store, tmp)
}

/// Provider that plays back a fixed event sequence
///
/// Honors cancellation between events exactly like the real adapters:
/// once the request token is cancelled, nothing further is emitted. An
/// optional inter-event delay keeps the stream in flight long enough
/// for a test to act while it runs.
pub struct ScriptedProvider {
    script: Vec<StreamEvent>,
    event_delay: Option<Duration>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(script: Vec<StreamEvent>) -> Self {
        Self {
            script,
            event_delay: None,
        }
    }

    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    pub fn hello() -> Self {
        Self::new(vec![
            StreamEvent::Start,
            StreamEvent::Token("Hel".to_string()),
            StreamEvent::Token("lo!".to_string()),
            StreamEvent::End,
        ])
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream(&self, request: StreamRequest) -> Result<EventStream> {
        let script = self.script.clone();
        let event_delay = self.event_delay;
        let cancel = request.cancel.clone();

        let (tx, stream) = EventStream::channel();
        tokio::spawn(async move {
            for event in script {
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
