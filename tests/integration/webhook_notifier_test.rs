// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use adpulse::domain::services::notification_service::Notifier;
use adpulse::infrastructure::services::webhook_notifier::{
    WebhookNotifier, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use adpulse::utils::clock::{Clock, ManualClock};
use adpulse::utils::errors::NotificationError;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 2, 7, 0, 0).unwrap(),
    ))
}

#[tokio::test]
async fn test_webhook_delivery_is_signed() {
    let clock = clock();
    let timestamp = clock.now().timestamp();
    let message = "[growth] Acme grew from 40 to 65 active ads (+62.5%)";
    let body = format!(
        r#"{{"recipient_id":"ops-team","message":"{}","timestamp":{}}}"#,
        message, timestamp
    );

    let server = MockServer::start().await;
    let notifier =
        WebhookNotifier::new(format!("{}/hook", server.uri()), "test_secret", clock).unwrap();
    let signature = format!("sha256={}", notifier.sign(&body, timestamp).unwrap());

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header(SIGNATURE_HEADER, signature.as_str()))
        .and(header(TIMESTAMP_HEADER, timestamp.to_string().as_str()))
        .and(body_string(body.clone()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    notifier.send("ops-team", message).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let payload: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(payload["recipient_id"], "ops-team");
    assert_eq!(payload["timestamp"], timestamp);
}

#[tokio::test]
async fn test_webhook_rejection_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri(), "test_secret", clock()).unwrap();

    let err = notifier.send("ops-team", "hello").await.unwrap_err();
    assert!(matches!(err, NotificationError::Rejected(503)));
}
