//! Text completion used by the answer composer.
//!
//! The composer only sees [`CompletionBackend`]; the production
//! implementation is [`ChatClient`], which talks to any OpenAI-compatible
//! chat-completions endpoint.

pub mod chat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::CompletionConfig;

pub use chat::ChatClient;

/// Sampling parameters sent with every completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub stop: Option<Vec<String>>,
}

impl Default for DecodingParams {
    #[inline]
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

impl From<&CompletionConfig> for DecodingParams {
    #[inline]
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            stream: false,
            stop: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub params: DecodingParams,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Full completion text for `request`
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
