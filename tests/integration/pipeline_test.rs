// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{ad_library_page, target, CannedGenerator, Pipeline};
use adpulse::domain::models::alert::AlertKind;
use adpulse::domain::models::job::Job;
use adpulse::domain::repositories::target_repository::TargetRepository;
use adpulse::domain::services::extraction_service::ExtractionTier;
use adpulse::domain::services::llm_service::TextGenerator;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn job(target_id: &str) -> Job {
    Job::new(Uuid::new_v4(), target_id, 0, 2, super::helpers::start_time())
}

#[tokio::test]
async fn test_due_batch_records_growth_and_notifies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ads/library/"))
        .and(query_param("view_all_page_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ad_library_page("Acme Shoes", 65)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ads/library/"))
        .and(query_param("view_all_page_id", "43"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ad_library_page("Quiet Co", 12)))
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(&server.uri(), vec![target("42", 40), target("43", 12)]);
    let targets = pipeline.targets.find_active().await.unwrap();
    pipeline.planner.schedule_day(&targets).await.unwrap();

    let report = pipeline.processor.process_next().await.unwrap().unwrap();

    assert_eq!(report.succeeded, 2);
    let kinds: Vec<AlertKind> = report.alerts.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AlertKind::Growth, AlertKind::HighActivity]);
    // only the high-severity growth alert is forwarded
    let messages = pipeline.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("[growth] Acme Shoes"));

    let stored = pipeline.targets.find_by_id("42").await.unwrap().unwrap();
    let latest = stored.history.last().unwrap();
    assert_eq!(latest.active_count, 65);
    assert_eq!(latest.delta, 25);
    assert_eq!(latest.percent_change, 62.5);
}

#[tokio::test]
async fn test_rate_limit_pauses_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "45"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ad_library_page("Acme", 41)))
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(&server.uri(), vec![target("42", 40)]);

    let result = pipeline.processor.process_job_with_retry(job("42")).await;

    assert!(result.is_success());
    assert_eq!(result.attempts, 2);
    assert_eq!(result.current, 41);
    // blocking backoff of 30s, then the rest of the 45s circuit pause
    assert!(pipeline.clock.total_slept() >= Duration::from_secs(45));
    assert!(!pipeline.circuit.is_open());
    assert_eq!(pipeline.monitor.snapshot().events_in_window, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_captcha_wall_fails_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><div class=\"g-recaptcha\"></div></html>"),
        )
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(&server.uri(), vec![target("42", 40)]);

    let result = pipeline.processor.process_job_with_retry(job("42")).await;

    assert!(!result.is_success());
    assert_eq!(result.attempts, 2);
    assert!(!result.recorded);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert!(pipeline.circuit.is_open());
    assert_eq!(pipeline.circuit.status().consecutive_failures, 2);

    let stored = pipeline.targets.find_by_id("42").await.unwrap().unwrap();
    assert_eq!(stored.history.len(), 1);
}

#[tokio::test]
async fn test_unstructured_page_uses_model_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><div>Ad library for page 77, active campaigns listed below</div>\
             <script>window.__library={\"active\":\"see listing\",\"page\":\"77\"}</script>\
             </body></html>",
        ))
        .mount(&server)
        .await;

    let generator = CannedGenerator::new(
        "```json\n{\"totalActiveAds\": 12, \"advertiserName\": \"Acme\", \"confidence\": \"high\"}\n```",
    );
    let pipeline = Pipeline::with_generator(
        &server.uri(),
        vec![target("77", 0)],
        Some(generator.clone() as Arc<dyn TextGenerator>),
    );

    let result = pipeline.processor.process_job_with_retry(job("77")).await;

    assert!(result.is_success());
    assert_eq!(result.current, 12);
    assert_eq!(result.tier, Some(ExtractionTier::Ai));
    assert_eq!(result.page_name, "Acme");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_structured_page_never_calls_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ad_library_page("Acme", 9)))
        .mount(&server)
        .await;

    let generator = CannedGenerator::new("{}");
    let pipeline = Pipeline::with_generator(
        &server.uri(),
        vec![target("42", 9)],
        Some(generator.clone() as Arc<dyn TextGenerator>),
    );

    let result = pipeline.processor.process_job_with_retry(job("42")).await;

    assert_eq!(result.tier, Some(ExtractionTier::Pattern));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_cached_result_skips_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ad_library_page("Acme", 30)))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(&server.uri(), vec![target("42", 30)]);

    let first = pipeline.processor.process_job_with_retry(job("42")).await;
    pipeline.clock.advance(Duration::from_secs(600));
    let second = pipeline.processor.process_job_with_retry(job("42")).await;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.current, 30);
}
