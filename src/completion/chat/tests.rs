use super::*;
use crate::completion::DecodingParams;
use serial_test::serial;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY_ENV: &str = "USER_RAG_TEST_CHAT_KEY";

fn test_config(server: &MockServer) -> CompletionConfig {
    CompletionConfig {
        base_url: format!("{}/openai/v1", server.uri()),
        api_key_env: TEST_KEY_ENV.to_string(),
        timeout_secs: 5,
        ..CompletionConfig::default()
    }
}

fn test_client(server: &MockServer) -> ChatClient {
    ChatClient::new(&test_config(server))
        .expect("Failed to create chat client")
        .with_retry_policy(
            RetryPolicy::default()
                .with_attempts(2)
                .with_base_delay(Duration::from_millis(1)),
        )
}

fn request() -> CompletionRequest {
    CompletionRequest {
        system_prompt: "You are a helpful assistant.".to_string(),
        user_prompt: "Who is an admin?".to_string(),
        params: DecodingParams::default(),
    }
}

fn set_key(value: &str) {
    // SAFETY: tests touching this variable run under #[serial]
    unsafe { env::set_var(TEST_KEY_ENV, value) };
}

fn clear_key() {
    // SAFETY: tests touching this variable run under #[serial]
    unsafe { env::remove_var(TEST_KEY_ENV) };
}

#[tokio::test]
#[serial]
async fn sends_openai_compatible_request() {
    let server = MockServer::start().await;
    set_key("secret-key");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("Authorization", "Bearer secret-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama-3.1-8b-instant",
            "temperature": 0.5,
            "top_p": 1.0,
            "max_completion_tokens": 1024,
            "stream": false,
            "stop": null,
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "Who is an admin?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Alice is an admin."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = test_client(&server)
        .complete(&request())
        .await
        .expect("completion should succeed");
    assert_eq!(answer, "Alice is an admin.");

    clear_key();
}

#[tokio::test]
#[serial]
async fn missing_api_key_is_a_completion_error() {
    let server = MockServer::start().await;
    clear_key();

    let result = test_client(&server).complete(&request()).await;
    match result {
        Err(RagError::Completion(message)) => assert!(message.contains(TEST_KEY_ENV)),
        other => panic!("expected completion error, got {:?}", other),
    }
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
#[serial]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    set_key("bad-key");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client(&server).complete(&request()).await;
    assert!(matches!(result, Err(RagError::Completion(_))));

    clear_key();
}

#[tokio::test]
#[serial]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    set_key("secret-key");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let result = test_client(&server).complete(&request()).await;
    assert!(matches!(result, Err(RagError::Completion(_))));

    clear_key();
}

#[tokio::test]
#[serial]
async fn empty_choices_are_an_error() {
    let server = MockServer::start().await;
    set_key("secret-key");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .mount(&server)
        .await;

    let result = test_client(&server).complete(&request()).await;
    match result {
        Err(RagError::Completion(message)) => assert!(message.contains("no completion")),
        other => panic!("expected completion error, got {:?}", other),
    }

    clear_key();
}

#[tokio::test]
#[serial]
async fn retries_stay_inside_configured_timeout() {
    let server = MockServer::start().await;
    set_key("secret-key");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = CompletionConfig {
        timeout_secs: 1,
        ..test_config(&server)
    };
    let client = ChatClient::new(&config)
        .expect("Failed to create chat client")
        .with_retry_policy(
            RetryPolicy::default()
                .with_attempts(3)
                .with_base_delay(Duration::from_millis(1)),
        );

    let started = std::time::Instant::now();
    let result = client.complete(&request()).await;

    assert!(matches!(result, Err(RagError::Completion(_))));
    assert!(started.elapsed() < Duration::from_millis(1500));

    clear_key();
}

#[test]
fn attempts_share_the_configured_timeout() {
    let config = CompletionConfig {
        timeout_secs: 30,
        ..CompletionConfig::default()
    };
    let client = ChatClient::new(&config).expect("Failed to create chat client");
    assert_eq!(client.retry.budget, Some(Duration::from_secs(30)));
    assert_eq!(
        client.retry.attempt_timeout(config.timeout()),
        Duration::from_secs(10)
    );
}

#[test]
fn url_is_derived_from_base_url() {
    let config = CompletionConfig {
        base_url: "https://api.example.com/v1/".to_string(),
        ..CompletionConfig::default()
    };
    let client = ChatClient::new(&config).expect("Failed to create chat client");
    assert_eq!(client.url.as_str(), "https://api.example.com/v1/chat/completions");
}
