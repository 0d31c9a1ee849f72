//! Streaming provider adapters
//!
//! Each adapter translates one vendor wire protocol into the common
//! [`StreamEvent`] vocabulary. The rest of the crate only ever sees the
//! [`Provider`] trait and the event stream it yields.

pub mod anthropic;
pub mod base;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use base::{
    split_system_prompt, EventStream, PromptMessage, Provider, StreamEvent, StreamRequest,
    ToolCallRequest,
};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::auth::CredentialProvider;
use crate::config::Config;
use crate::error::{ParlanceError, Result};
use std::sync::Arc;

/// Creates the provider named by the configuration
///
/// # Arguments
///
/// * `config` - Application configuration selecting the provider type
/// * `credentials` - Credential source handed to adapters that authenticate
///
/// # Errors
///
/// Returns `ParlanceError::Config` for an unknown provider type.
pub fn create_provider(
    config: &Config,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<Arc<dyn Provider>> {
    match config.provider.provider_type.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            config.provider.openai.clone(),
            credentials,
        )?)),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            config.provider.anthropic.clone(),
            credentials,
        )?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            config.provider.ollama.clone(),
        )?)),
        other => Err(ParlanceError::Config(format!("unknown provider type: {}", other)).into()),
    }
}
