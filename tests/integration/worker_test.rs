// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{ad_library_page, target, Pipeline};
use adpulse::domain::repositories::target_repository::TargetRepository;
use chrono::{TimeZone, Utc};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn upstream(count: u32) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ad_library_page("Acme", count)))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_tick_schedules_day_and_drains_due_batches() {
    let server = upstream(20).await;
    let targets = (1..=5).map(|i| target(&i.to_string(), 20)).collect();
    let pipeline = Pipeline::new(&server.uri(), targets);
    let worker = pipeline.worker();

    // 07:00: only the 06:00 batch is due (batch size 2, two hours apart)
    let first = worker.tick().await.unwrap();
    assert_eq!(first.scheduled_batches, 3);
    assert_eq!(first.processed_batches, 1);
    assert_eq!(first.succeeded, 2);

    // nothing new is due and the day is already scheduled
    let idle = worker.tick().await.unwrap();
    assert_eq!(idle.scheduled_batches, 0);
    assert_eq!(idle.processed_batches, 0);

    pipeline
        .clock
        .set(Utc.with_ymd_and_hms(2025, 3, 2, 11, 0, 0).unwrap());
    let later = worker.tick().await.unwrap();
    assert_eq!(later.processed_batches, 2);
    assert_eq!(later.succeeded, 3);
}

#[tokio::test]
async fn test_new_day_gets_a_fresh_schedule() {
    let server = upstream(20).await;
    let pipeline = Pipeline::new(&server.uri(), vec![target("42", 20)]);
    let worker = pipeline.worker();

    worker.tick().await.unwrap();
    pipeline
        .clock
        .set(Utc.with_ymd_and_hms(2025, 3, 3, 6, 30, 0).unwrap());
    let next_day = worker.tick().await.unwrap();

    assert_eq!(next_day.scheduled_batches, 1);
    assert_eq!(next_day.processed_batches, 1);

    let stored = pipeline.targets.find_by_id("42").await.unwrap().unwrap();
    // yesterday's seed plus one sample per processed day
    assert_eq!(stored.history.len(), 3);
}

#[tokio::test]
async fn test_inactive_targets_are_not_scheduled() {
    let server = upstream(20).await;
    let mut paused = target("99", 20);
    paused.active = false;
    let pipeline = Pipeline::new(&server.uri(), vec![target("42", 20), paused]);
    let worker = pipeline.worker();

    let summary = worker.tick().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.as_str().contains("view_all_page_id=42"));
}
