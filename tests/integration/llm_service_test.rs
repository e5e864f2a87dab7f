// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use adpulse::domain::services::llm_service::{OpenAiTextGenerator, TextGenerator};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator(server: &MockServer) -> OpenAiTextGenerator {
    OpenAiTextGenerator::new(
        "test-key".to_string(),
        "gpt-4o-mini".to_string(),
        format!("{}/v1/", server.uri()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_completion_returns_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "{\"totalActiveAds\": 3, \"confidence\": \"high\"}"}}
            ],
            "usage": {"prompt_tokens": 120, "completion_tokens": 14, "total_tokens": 134}
        })))
        .mount(&server)
        .await;

    let (content, usage) = generator(&server)
        .complete_with_usage("count the ads")
        .await
        .unwrap();

    assert!(content.contains("totalActiveAds"));
    assert_eq!(usage.total_tokens, 134);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][1]["content"], "count the ads");
}

#[tokio::test]
async fn test_api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = generator(&server).complete("count the ads").await.unwrap_err();
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_malformed_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    assert!(generator(&server).complete("count the ads").await.is_err());
}
