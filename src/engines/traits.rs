// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// 抓取错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 非成功状态码
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// 连接、读取等网络错误
    #[error("Network error: {0}")]
    Network(String),
}

impl FetchError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 超时、网络错误、5xx 与 408 可重试，其余 4xx 不可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::HttpStatus(code) => *code >= 500 || *code == 408,
        }
    }

    /// 指标标签
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::Network(_) => "network",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 请求头
    pub headers: HashMap<String, String>,
    /// 超时时间
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// 抓取响应
///
/// 非 2xx 状态同样以响应形式返回，由防检测守卫先行判定是否被拦截
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应内容
    pub body: String,
    /// 响应头，键为小写
    pub headers: HashMap<String, String>,
    /// 跟随重定向后的最终URL
    pub final_url: String,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// 按名称读取响应头，不区分大小写
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 解析 `Retry-After`，支持秒数和 HTTP 日期两种格式
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        let raw = self.header("retry-after")?.trim();
        if let Ok(secs) = raw.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
        Some(at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO))
    }

    /// 非成功状态转换为 [`FetchError::HttpStatus`]
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::HttpStatus(self.status_code))
        }
    }
}

/// 抓取器特质
///
/// 本层不做重试，重试策略由队列处理器负责
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 执行一次 GET 请求
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// 根据模板生成目标URL
///
/// 模板中的 `{page_id}` 与 `{country}` 会被替换为编码后的值
pub fn target_url(template: &str, page_id: &str, region: &str) -> Result<Url, url::ParseError> {
    let encode = |v: &str| url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>();
    let rendered = template
        .replace("{page_id}", &encode(page_id))
        .replace("{country}", &encode(region));
    Url::parse(&rendered)
}
