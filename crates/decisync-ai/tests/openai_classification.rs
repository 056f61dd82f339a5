//! Classifier running against a simulated OpenAI-compatible endpoint.

use std::sync::Arc;
use std::time::Duration;

use decisync_ai::{GeneratorConfig, OpenAiGenerator, OutcomeClassifier, TextGenerator};
use decisync_core::{ErrorKind, Outcome};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator_for(server: &MockServer) -> OpenAiGenerator {
    OpenAiGenerator::new(GeneratorConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        model: "test-gen".to_string(),
        timeout: Duration::from_secs(5),
    })
    .expect("generator")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn request_uses_strict_json_mode_and_low_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-gen",
            "response_format": {"type": "json_object"},
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"outcome":"Granted","confidence":0.88,"reasoning":"service connection granted"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = OutcomeClassifier::new(Arc::new(generator_for(&server)));
    let result = classifier
        .classify("23-0001", None, "The claim is granted.")
        .await;
    assert_eq!(result.outcome, Outcome::Granted);
    assert_eq!(result.confidence, 0.88);

    let requests = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
    let temperature = body["temperature"].as_f64().expect("temperature");
    assert!(temperature <= 0.2, "temperature {temperature}");
}

#[tokio::test]
async fn non_json_reply_degrades_to_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("I think it was denied.")))
        .mount(&server)
        .await;

    let classifier = OutcomeClassifier::new(Arc::new(generator_for(&server)));
    let result = classifier.classify("23-0002", None, "text").await;
    assert_eq!(result.outcome, Outcome::Unknown);
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn upstream_failure_degrades_to_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let generator = generator_for(&server);
    let err = generator
        .generate_json("prompt", 0.1)
        .await
        .expect_err("500 surfaces from the generator");
    assert_eq!(err.kind, ErrorKind::Generation);
    assert_eq!(err.status, 500);

    let classifier = OutcomeClassifier::new(Arc::new(generator));
    let result = classifier.classify("23-0003", None, "text").await;
    assert_eq!(result.outcome, Outcome::Unknown);
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn unreachable_generator_degrades_to_unknown() {
    let generator = OpenAiGenerator::new(GeneratorConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .expect("generator");
    let classifier = OutcomeClassifier::new(Arc::new(generator));
    let result = classifier.classify("23-0004", None, "text").await;
    assert_eq!(result, decisync_ai::Classification::unknown());
}
