#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{CompletionBackend, CompletionRequest};
use crate::RagError;
use crate::config::CompletionConfig;
use crate::http::{RetryPolicy, build_agent, send_with_retry};

/// Blocking client for `POST {base_url}/chat/completions`
#[derive(Debug, Clone)]
pub struct ChatClient {
    url: Url,
    api_key_env: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_completion_tokens: u32,
    stream: bool,
    stop: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let url = config
            .chat_completions_url()
            .context("Failed to build chat completions URL from config")?;

        let timeout = config.timeout();
        let retry = RetryPolicy::default().with_budget(timeout);
        Ok(Self {
            url,
            api_key_env: config.api_key_env.clone(),
            agent: build_agent(retry.attempt_timeout(timeout)),
            retry,
            timeout,
        })
    }

    /// Replace the retry policy. Attempts and backoff still share the
    /// configured timeout unless `retry` carries its own budget.
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        let retry = match retry.budget {
            Some(_) => retry,
            None => retry.with_budget(self.timeout),
        };
        self.agent = build_agent(retry.attempt_timeout(self.timeout));
        self.retry = retry;
        self
    }

    /// Reads the API key from the configured environment variable
    fn api_key(&self) -> Result<String> {
        match env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(anyhow::anyhow!(
                "API key environment variable {} is not set",
                self.api_key_env
            )),
        }
    }

    #[inline]
    pub fn complete_blocking(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self.api_key()?;
        let params = &request.params;

        let body = ChatRequest {
            model: &params.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: params.temperature,
            top_p: params.top_p,
            max_completion_tokens: params.max_tokens,
            stream: params.stream,
            stop: params.stop.as_deref(),
        };

        let request_json =
            serde_json::to_string(&body).context("Failed to serialize chat request")?;
        let authorization = format!("Bearer {}", api_key);

        debug!(
            "Requesting completion from {} with model {}",
            self.url, params.model
        );

        let response_text = send_with_retry(self.retry, self.url.as_str(), || {
            self.agent
                .post(self.url.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", authorization.as_str())
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat response contained no completion")?;

        info!("Received completion ({} chars)", content.len());
        Ok(content)
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    async fn complete(&self, request: &CompletionRequest) -> crate::Result<String> {
        let client = self.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || client.complete_blocking(&request))
            .await
            .map_err(|e| RagError::Completion(format!("Completion task failed: {}", e)))?
            .map_err(|e| RagError::Completion(format!("{:#}", e)))
    }
}
