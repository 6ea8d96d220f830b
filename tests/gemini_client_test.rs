use std::time::Duration;

use menubot::{GeminiClient, GeminiConfig, GenerationError, Generator, Locale, RetryPolicy, RetryingGenerator};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/test-model:generateContent";

fn config(server: &MockServer) -> GeminiConfig {
    GeminiConfig {
        api_url: format!("{}{}", server.uri(), ENDPOINT),
        api_key: "test-key".to_string(),
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::none(),
    }
}

fn reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ], "role": "model" } }
        ]
    })
}

#[test_log::test(tokio::test)]
async fn test_generate_sends_envelope_and_extracts_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(query_param("key", "test-key"))
        .and(body_json(json!({"contents": [{"parts": [{"text": "What is cheap?"}]}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("Es Teh Manis\nAir Mineral")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config(&server)).unwrap();
    let text = client.generate("What is cheap?", Locale::En).await.unwrap();
    assert_eq!(text, "Es Teh Manis<br>Air Mineral");
}

#[test_log::test(tokio::test)]
async fn test_missing_candidates_returns_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config(&server)).unwrap();
    assert_eq!(client.generate("x", Locale::Id).await.unwrap(), "Tidak ada rekomendasi.");
    assert_eq!(client.generate("x", Locale::En).await.unwrap(), "No recommendation available.");
}

#[test_log::test(tokio::test)]
async fn test_non_json_body_returns_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config(&server)).unwrap();
    assert_eq!(client.generate("x", Locale::Id).await.unwrap(), "Tidak ada rekomendasi.");
}

#[test_log::test(tokio::test)]
async fn test_error_status_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config(&server)).unwrap();
    let err = client.generate("x", Locale::Id).await.unwrap_err();
    match &err {
        GenerationError::Status { status, body } => {
            assert_eq!(*status, 400);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.is_retryable());
}

#[test_log::test(tokio::test)]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("late")).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.timeout = Duration::from_millis(100);
    let client = GeminiClient::new(&config).unwrap();
    let err = client.generate("x", Locale::Id).await.unwrap_err();
    assert!(matches!(err, GenerationError::Timeout), "got {:?}", err);
    assert!(err.is_retryable());
}

#[test_log::test(tokio::test)]
async fn test_retry_recovers_from_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("recovered")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config(&server)).unwrap();
    let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50));
    let generator = RetryingGenerator::new(client, policy);
    assert_eq!(generator.generate("x", Locale::En).await.unwrap(), "recovered");
}

#[test_log::test(tokio::test)]
async fn test_missing_api_key_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("never")))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.api_key = String::new();
    let client = GeminiClient::new(&config).unwrap();
    let err = client.generate("x", Locale::En).await.unwrap_err();
    assert!(matches!(err, GenerationError::Config(_)));
}

#[test_log::test(tokio::test)]
async fn test_network_error_does_not_reveal_api_key() {
    // Grab a free port, then close it so the connection is refused.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = GeminiConfig {
        api_url: format!("http://127.0.0.1:{}/generate", port),
        api_key: "SECRET-KEY-123".to_string(),
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::none(),
    };

    let client = GeminiClient::new(&config).unwrap();
    let err = client.generate("x", Locale::Id).await.unwrap_err();
    assert!(matches!(err, GenerationError::Network(_)), "unexpected error: {:?}", err);
    assert!(err.is_retryable());
    assert!(!err.to_string().contains("SECRET-KEY-123"));
    assert!(!format!("{:?}", err).contains("SECRET-KEY-123"));
}
