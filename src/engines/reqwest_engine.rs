// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::engines::traits::{FetchError, FetchRequest, FetchResponse, Fetcher};

/// 基于 reqwest 的目标抓取器
///
/// 所有请求共用一个连接池客户端；信号量限制同时在途的请求数，
/// 超出的请求按先进先出顺序排队等待。
pub struct ReqwestFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl ReqwestFetcher {
    /// 创建抓取器
    ///
    /// # 参数
    ///
    /// * `max_concurrency` - 同时在途请求上限
    /// * `default_timeout` - 请求未指定时使用的超时
    pub fn new(max_concurrency: usize, default_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .cookie_store(true)
            .build()?;
        let max_concurrency = max_concurrency.max(1);
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        })
    }

    /// 当前在途请求数
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }

        let start = Instant::now();
        let response = self
            .client
            .get(&request.url)
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_ascii_lowercase(), v_str.to_string());
            }
        }

        let body = response.text().await?;

        Ok(FetchResponse {
            status_code,
            body,
            headers: response_headers,
            final_url,
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Network(format!("fetch pool closed: {}", e)))?;

        let result = self.send(request).await;
        match &result {
            Ok(response) => {
                debug!(
                    status = response.status_code,
                    elapsed_ms = response.response_time_ms,
                    "Fetched {}",
                    request.url
                );
                counter!("adpulse_fetch_total", "outcome" => "response").increment(1);
            }
            Err(e) => {
                debug!("Fetch of {} failed: {}", request.url, e);
                counter!("adpulse_fetch_total", "outcome" => e.outcome()).increment(1);
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
