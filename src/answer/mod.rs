//! Question answering on top of retrieval.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::completion::{CompletionBackend, CompletionRequest, DecodingParams};
use crate::retrieval::QueryRouter;
use crate::{RagError, Result};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const DEGRADED_PREFIX: &str =
    "I encountered an error while processing your request. Error details: ";

pub struct AnswerComposer {
    router: Arc<QueryRouter>,
    completion: Arc<dyn CompletionBackend>,
    params: DecodingParams,
    timeout: Duration,
}

impl AnswerComposer {
    #[inline]
    pub fn new(
        router: Arc<QueryRouter>,
        completion: Arc<dyn CompletionBackend>,
        params: DecodingParams,
        timeout: Duration,
    ) -> Self {
        Self {
            router,
            completion,
            params,
            timeout,
        }
    }

    #[inline]
    pub fn router(&self) -> &Arc<QueryRouter> {
        &self.router
    }

    /// Answer `query` from the retrieved context. Never fails: a
    /// completion error becomes a readable degraded answer.
    #[inline]
    pub async fn answer(&self, query: &str) -> String {
        let context = self.router.retrieve(query).await;
        debug!("Retrieved context ({} chars)", context.len());

        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: build_prompt(&context, query),
            params: self.params.clone(),
        };

        match self.complete(&request).await {
            Ok(answer) => {
                info!("Answered query ({} chars)", answer.len());
                answer
            }
            Err(e) => {
                error!("Completion failed: {}", e);
                degraded_answer(&e)
            }
        }
    }

    /// Outer bound on one completion. The chat client already fits its
    /// retries inside the same timeout; this also covers other backends.
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        tokio::time::timeout(self.timeout, self.completion.complete(request))
            .await
            .map_err(|_| {
                RagError::Completion(format!("Timed out after {:?}", self.timeout))
            })?
    }
}

/// Instruction prompt with the context and question inserted verbatim
#[inline]
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are an intelligent AI assistant for a User Management System. \
Your goal is to answer questions based strictly on the provided context.

Context (Relevant Users):
{context}

Question: {query}

Instructions:
1. Analyze the context to find the answer.
2. If the answer is found, provide a clear and concise response.
3. If the answer is NOT in the context, explicitly state that you cannot find the information in the database. Do not hallucinate.
4. When listing users, include their roles.

Answer:"
    )
}

#[inline]
pub fn degraded_answer(error: &RagError) -> String {
    format!("{}{}", DEGRADED_PREFIX, error)
}
