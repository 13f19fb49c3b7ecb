#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for the production wiring: SQLite records, Ollama
//! embeddings into LanceDB, and an OpenAI-compatible chat backend, with
//! both remote services played by mock servers.

use serde_json::{Value, json};
use serial_test::serial;
use std::env;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use user_rag::commands::Pipeline;
use user_rag::config::{CompletionConfig, Config, OllamaConfig};
use user_rag::database::NewUser;
use user_rag::retrieval::{IndexState, RebuildOutcome};

const KEY_ENV: &str = "USER_RAG_PIPELINE_TEST_KEY";
const VOCABULARY: [&str; 6] = ["admin", "security", "platform", "alice", "bob", "carol"];

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = VOCABULARY
        .iter()
        .map(|word| lower.matches(word).count() as f32)
        .collect();
    vector.push(1.0);
    vector
}

/// Answers `/api/embed` with keyword-count vectors for each input
fn embed_response(request: &Request) -> ResponseTemplate {
    let body: Value = match request.body_json() {
        Ok(body) => body,
        Err(_) => return ResponseTemplate::new(400),
    };
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .map(|inputs| {
            inputs
                .iter()
                .filter_map(Value::as_str)
                .map(keyword_vector)
                .collect()
        })
        .unwrap_or_default();
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "nomic-embed-text:latest",
        "embeddings": embeddings
    }))
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

struct TestEnvironment {
    _temp_dir: TempDir,
    ollama: MockServer,
    chat: MockServer,
    config: Config,
}

async fn setup() -> TestEnvironment {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let ollama = MockServer::start().await;
    let chat = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(embed_response)
        .mount(&ollama)
        .await;

    let address = ollama.address();
    let config = Config {
        ollama: OllamaConfig {
            protocol: "http".to_string(),
            host: address.ip().to_string(),
            port: address.port(),
            ..OllamaConfig::default()
        },
        completion: CompletionConfig {
            base_url: format!("{}/v1", chat.uri()),
            api_key_env: KEY_ENV.to_string(),
            timeout_secs: 5,
            ..CompletionConfig::default()
        },
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    // SAFETY: every test in this file runs under #[serial]
    unsafe { env::set_var(KEY_ENV, "pipeline-key") };

    TestEnvironment {
        _temp_dir: temp_dir,
        ollama,
        chat,
        config,
    }
}

async fn seed(pipeline: &Pipeline) {
    let users = [
        NewUser::new("Alice", "alice@example.com")
            .with_role("admin")
            .with_bio("Runs the platform team"),
        NewUser::new("Bob", "bob@example.com"),
        NewUser::new("Carol", "carol@example.com")
            .with_role("admin")
            .with_bio("Security lead"),
    ];
    for user in users {
        pipeline
            .database
            .create_user(user)
            .await
            .expect("Failed to create user");
    }
}

#[tokio::test]
#[serial]
async fn answers_from_ranked_context_after_rebuild() {
    let env = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer pipeline-key"))
        .and(body_string_contains("Found relevant Users"))
        .and(body_string_contains("Question: Who leads security?"))
        .respond_with(chat_reply("Carol is the security lead."))
        .expect(1)
        .mount(&env.chat)
        .await;

    let pipeline = Pipeline::open(&env.config)
        .await
        .expect("Failed to open pipeline");
    seed(&pipeline).await;

    let outcome = pipeline.manager.rebuild().await;
    assert_eq!(outcome, RebuildOutcome::Ready { documents: 3 });
    assert_eq!(pipeline.manager.state(), IndexState::Ready);

    let answer = pipeline.composer.answer("Who leads security?").await;
    assert_eq!(answer, "Carol is the security lead.");
}

#[tokio::test]
#[serial]
async fn ranked_context_puts_closest_record_first() {
    let env = setup().await;

    let pipeline = Pipeline::open(&env.config)
        .await
        .expect("Failed to open pipeline");
    seed(&pipeline).await;
    assert_eq!(
        pipeline.manager.rebuild().await,
        RebuildOutcome::Ready { documents: 3 }
    );

    let context = pipeline.router.retrieve("security").await;
    assert!(context.starts_with("Found relevant Users:"));

    let first = context
        .split("--- Result ")
        .nth(1)
        .expect("at least one ranked result");
    assert!(first.contains("User Name: Carol"));
}

#[tokio::test]
#[serial]
async fn cold_start_answers_from_linear_scan() {
    let env = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("User records:"))
        .respond_with(chat_reply("There are three users."))
        .expect(1)
        .mount(&env.chat)
        .await;

    let pipeline = Pipeline::open(&env.config)
        .await
        .expect("Failed to open pipeline");
    seed(&pipeline).await;
    assert_eq!(pipeline.manager.state(), IndexState::Absent);

    let answer = pipeline.composer.answer("How many users are there?").await;
    assert_eq!(answer, "There are three users.");

    // The cold query started a background rebuild
    assert!(pipeline.manager.rebuild_attempts() >= 1);
}

#[tokio::test]
#[serial]
async fn empty_store_sends_no_data_context() {
    let env = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("No user data available."))
        .respond_with(chat_reply("I don't know."))
        .expect(1)
        .mount(&env.chat)
        .await;

    let pipeline = Pipeline::open(&env.config)
        .await
        .expect("Failed to open pipeline");

    assert_eq!(pipeline.manager.rebuild().await, RebuildOutcome::Empty);
    let answer = pipeline.composer.answer("Who are the admins?").await;
    assert_eq!(answer, "I don't know.");
}

#[tokio::test]
#[serial]
async fn rejected_completion_degrades_to_error_text() {
    let env = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&env.chat)
        .await;

    let pipeline = Pipeline::open(&env.config)
        .await
        .expect("Failed to open pipeline");
    seed(&pipeline).await;

    let answer = pipeline.composer.answer("Who are the admins?").await;
    assert!(answer.starts_with("I encountered an error while processing your request."));
    assert!(answer.contains("401"));
}

#[tokio::test]
#[serial]
async fn unreachable_embedder_keeps_fallback_working() {
    let env = setup().await;
    env.ollama.reset().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&env.ollama)
        .await;

    let pipeline = Pipeline::open(&env.config)
        .await
        .expect("Failed to open pipeline");
    seed(&pipeline).await;

    let outcome = pipeline.manager.rebuild().await;
    assert!(matches!(outcome, RebuildOutcome::Failed { .. }));
    assert_eq!(pipeline.manager.state(), IndexState::Absent);

    let context = pipeline.router.retrieve("admin").await;
    assert!(context.starts_with("User records:"));
    assert!(context.contains("User Name: Alice"));
}
