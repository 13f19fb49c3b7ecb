use super::*;
use crate::retrieval::tests::{FakeBackend, FakeStore, sample_users};
use crate::retrieval::{IndexManager, NO_DATA_SENTINEL, RecordStore, SimilarityBackend};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every request and replies from a script
#[derive(Default)]
struct FakeCompletion {
    requests: Mutex<Vec<CompletionRequest>>,
    reply: Option<String>,
    delay: Option<Duration>,
}

impl FakeCompletion {
    fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            ..Self::default()
        }
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("completion should have been called")
    }
}

#[async_trait]
impl CompletionBackend for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| RagError::Completion("upstream returned 503".to_string()))
    }
}

fn composer(store: FakeStore, completion: Arc<FakeCompletion>) -> AnswerComposer {
    let manager = Arc::new(IndexManager::new(
        Arc::new(store) as Arc<dyn RecordStore>,
        Arc::new(FakeBackend::default()) as Arc<dyn SimilarityBackend>,
        Duration::from_secs(2),
    ));
    let router = Arc::new(QueryRouter::new(manager, 5));
    AnswerComposer::new(
        router,
        completion,
        DecodingParams::default(),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn list_admins_prompt_carries_context_and_question() {
    let completion = Arc::new(FakeCompletion::replying("Alice (admin) and Carol (admin)."));
    let composer = composer(FakeStore::with_records(sample_users()), Arc::clone(&completion));
    composer.router().manager().rebuild().await;

    let answer = composer.answer("list admins").await;
    assert_eq!(answer, "Alice (admin) and Carol (admin).");

    let request = completion.last_request();
    assert_eq!(request.system_prompt, "You are a helpful assistant.");

    let context = composer.router().retrieve("list admins").await;
    let prompt = &request.user_prompt;
    assert!(prompt.contains(&format!("Context (Relevant Users):\n{}\n\nQuestion: list admins", context)));
    assert!(prompt.contains("Role: admin"));
    assert!(prompt.contains("cannot find the information in the database"));
    assert!(prompt.contains("Do not hallucinate"));
    assert!(prompt.contains("include their roles"));
    assert!(prompt.trim_end().ends_with("Answer:"));
}

#[tokio::test]
async fn decoding_parameters_are_fixed() {
    let completion = Arc::new(FakeCompletion::replying("ok"));
    let composer = composer(FakeStore::with_records(sample_users()), Arc::clone(&completion));

    composer.answer("who is Bob?").await;

    let params = completion.last_request().params;
    assert_eq!(params.model, "llama-3.1-8b-instant");
    assert!((params.temperature - 0.5).abs() < f32::EPSILON);
    assert!((params.top_p - 1.0).abs() < f32::EPSILON);
    assert_eq!(params.max_tokens, 1024);
    assert!(!params.stream);
    assert!(params.stop.is_none());
}

#[tokio::test]
async fn completion_failure_degrades_gracefully() {
    let completion = Arc::new(FakeCompletion::default());
    let composer = composer(FakeStore::with_records(sample_users()), completion);

    let answer = composer.answer("list admins").await;
    assert!(answer.starts_with(
        "I encountered an error while processing your request. Error details: "
    ));
    assert!(answer.contains("upstream returned 503"));
}

#[tokio::test]
async fn completion_timeout_degrades_gracefully() {
    let completion = Arc::new(FakeCompletion {
        reply: Some("too late".to_string()),
        delay: Some(Duration::from_secs(30)),
        ..FakeCompletion::default()
    });
    let manager = Arc::new(IndexManager::new(
        Arc::new(FakeStore::with_records(sample_users())),
        Arc::new(FakeBackend::default()),
        Duration::from_secs(2),
    ));
    let composer = AnswerComposer::new(
        Arc::new(QueryRouter::new(manager, 5)),
        completion,
        DecodingParams::default(),
        Duration::from_millis(20),
    );

    let answer = composer.answer("list admins").await;
    assert!(answer.starts_with("I encountered an error"));
    assert!(answer.contains("Timed out"));
}

#[tokio::test]
async fn empty_store_sentinel_is_passed_verbatim() {
    let completion = Arc::new(FakeCompletion::replying(
        "I cannot find the information in the database.",
    ));
    let composer = composer(FakeStore::default(), Arc::clone(&completion));

    composer.answer("who is the CTO?").await;

    let prompt = completion.last_request().user_prompt;
    assert!(prompt.contains(&format!("Context (Relevant Users):\n{}\n", NO_DATA_SENTINEL)));
}

#[test]
fn prompt_inserts_query_verbatim() {
    let prompt = build_prompt("ctx", "  Who has {braces} & \"quotes\"?  ");
    assert!(prompt.contains("Question:   Who has {braces} & \"quotes\"?  \n"));
    assert!(prompt.starts_with("You are an intelligent AI assistant for a User Management System."));
}

#[test]
fn degraded_message_includes_error_detail() {
    let message = degraded_answer(&RagError::Completion("quota exceeded".to_string()));
    assert_eq!(
        message,
        "I encountered an error while processing your request. Error details: Completion error: quota exceeded"
    );
}
