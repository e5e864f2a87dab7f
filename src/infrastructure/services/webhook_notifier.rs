// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::services::notification_service::Notifier;
use crate::utils::clock::Clock;
use crate::utils::errors::NotificationError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-AdPulse-Signature";
pub const TIMESTAMP_HEADER: &str = "X-AdPulse-Timestamp";

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    recipient_id: &'a str,
    message: &'a str,
    timestamp: i64,
}

/// 通过签名 webhook 投递告警的通知实现
///
/// 请求体为 JSON，签名为 `HMAC-SHA256(secret, "{timestamp}.{body}")` 的十六进制编码。
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: String,
    clock: Arc<dyn Clock>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        secret: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            secret: secret.into(),
            clock,
        })
    }

    /// 为请求体生成签名
    pub fn sign(&self, body: &str, timestamp: i64) -> Result<String, NotificationError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| NotificationError::Delivery(format!("invalid signing key: {}", e)))?;
        mac.update(format!("{}.{}", timestamp, body).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), NotificationError> {
        let timestamp = self.clock.now().timestamp();
        let body = serde_json::to_string(&NotificationPayload {
            recipient_id,
            message,
            timestamp,
        })
        .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        let signature = self.sign(&body, timestamp)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={}", signature))
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }

        debug!(recipient_id, "Webhook notification delivered");
        Ok(())
    }
}
