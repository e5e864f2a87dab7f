// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::settings::GuardSettings;
use crate::domain::models::blocking::{
    BlockingClassification, BlockingEvent, BlockingKind, Severity,
};
use crate::engines::blocking_monitor::BlockingMonitor;
use crate::engines::circuit_breaker::{CircuitBreaker, CircuitStatus};
use crate::engines::traits::FetchResponse;
use crate::utils::clock::Clock;

const DEFAULT_IDENTITIES: &[(&str, &str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "en-US,en;q=0.9",
        "\"Windows\"",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "en-GB,en;q=0.9",
        "\"macOS\"",
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "en-US,en;q=0.8",
        "\"Windows\"",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        "en-US,en;q=0.9",
        "\"macOS\"",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "en-US,en;q=0.7",
        "\"Linux\"",
    ),
];

const CAPTCHA_SIGNATURES: &[&str] = &[
    "g-recaptcha",
    "hcaptcha",
    "captcha-container",
    "security check",
    "/login/?next=",
    "/checkpoint/",
];

/// 请求身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
}

impl RequestIdentity {
    /// 该身份对应的完整请求头
    pub fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), self.user_agent.clone());
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), self.accept_language.clone());
        headers.insert("Cache-Control".to_string(), "no-cache".to_string());
        headers.insert("Sec-Fetch-Dest".to_string(), "document".to_string());
        headers.insert("Sec-Fetch-Mode".to_string(), "navigate".to_string());
        headers.insert("Sec-Fetch-Site".to_string(), "none".to_string());
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
        if self.user_agent.contains("Chrome") {
            headers.insert("Sec-CH-UA-Platform".to_string(), self.platform.clone());
        }
        headers
    }
}

/// 守卫配置
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub base_delay: Duration,
    pub failure_step: Duration,
    pub max_failure_delay: Duration,
    pub jitter: Duration,
    /// 严重（critical/high）拦截时熔断打开时长
    pub critical_open: Duration,
    /// 中等拦截时熔断打开时长
    pub medium_open: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            failure_step: Duration::from_millis(1000),
            max_failure_delay: Duration::from_millis(10_000),
            jitter: Duration::from_millis(1000),
            critical_open: Duration::from_secs(300),
            medium_open: Duration::from_secs(30),
        }
    }
}

impl From<&GuardSettings> for GuardConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            failure_step: Duration::from_millis(settings.failure_step_ms),
            max_failure_delay: Duration::from_millis(settings.max_failure_delay_ms),
            jitter: Duration::from_millis(settings.jitter_ms),
            critical_open: Duration::from_secs(settings.critical_open_secs),
            medium_open: Duration::from_secs(settings.medium_open_secs),
        }
    }
}

/// 单次请求的配置
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub identity: RequestIdentity,
    pub headers: HashMap<String, String>,
    /// 请求前的等待时长
    pub delay: Duration,
}

/// 防检测守卫
///
/// 轮换请求身份、控制请求节奏、判定响应是否被拦截，并独占熔断器的状态修改。
pub struct AntiDetectionGuard {
    identities: Vec<RequestIdentity>,
    cursor: AtomicUsize,
    config: GuardConfig,
    circuit: Arc<CircuitBreaker>,
    monitor: Arc<BlockingMonitor>,
    clock: Arc<dyn Clock>,
}

impl AntiDetectionGuard {
    pub fn new(
        config: GuardConfig,
        identities: Vec<RequestIdentity>,
        circuit: Arc<CircuitBreaker>,
        monitor: Arc<BlockingMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let identities = if identities.is_empty() {
            Self::default_identities()
        } else {
            identities
        };
        Self {
            identities,
            cursor: AtomicUsize::new(0),
            config,
            circuit,
            monitor,
            clock,
        }
    }

    /// 根据配置创建，自定义 User-Agent 列表为空时使用内置身份
    pub fn from_settings(
        settings: &GuardSettings,
        circuit: Arc<CircuitBreaker>,
        monitor: Arc<BlockingMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let identities = settings
            .user_agents
            .iter()
            .filter(|ua| !ua.trim().is_empty())
            .map(|ua| RequestIdentity {
                user_agent: ua.trim().to_string(),
                accept_language: "en-US,en;q=0.9".to_string(),
                platform: "\"Windows\"".to_string(),
            })
            .collect();
        Self::new(settings.into(), identities, circuit, monitor, clock)
    }

    pub fn default_identities() -> Vec<RequestIdentity> {
        DEFAULT_IDENTITIES
            .iter()
            .map(|(ua, lang, platform)| RequestIdentity {
                user_agent: ua.to_string(),
                accept_language: lang.to_string(),
                platform: platform.to_string(),
            })
            .collect()
    }

    pub fn current_identity(&self) -> RequestIdentity {
        let idx = self.cursor.load(Ordering::Relaxed) % self.identities.len();
        self.identities[idx].clone()
    }

    /// 切换到下一个身份
    pub fn rotate_identity(&self) -> RequestIdentity {
        let next = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let identity = self.identities[next % self.identities.len()].clone();
        debug!("Rotated request identity to {}", identity.user_agent);
        identity
    }

    /// 获取下一次请求的配置
    ///
    /// `delay = max(base, 监控建议间隔) + min(连续失败数 × step, cap) + jitter`
    pub fn get_config(&self) -> RequestConfig {
        let identity = self.current_identity();
        let failures = self.circuit.status().consecutive_failures;
        let base = self.config.base_delay.max(self.monitor.recommended_delay());
        let penalty = self
            .config
            .failure_step
            .saturating_mul(failures)
            .min(self.config.max_failure_delay);
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };

        RequestConfig {
            headers: identity.headers(),
            identity,
            delay: base + penalty + jitter,
        }
    }

    /// 熔断器打开期间挂起，返回等待时长
    pub async fn wait_until_clear(&self) -> Duration {
        self.circuit.wait_until_closed().await
    }

    /// 等待熔断器关闭并完成节奏等待后返回请求配置
    ///
    /// 节奏等待期间熔断器可能被其他任务打开，此时重新等待
    pub async fn gate(&self) -> RequestConfig {
        loop {
            self.circuit.wait_until_closed().await;
            let config = self.get_config();
            self.clock.sleep(config.delay).await;
            if !self.circuit.is_open() {
                // identity may have rotated while sleeping
                let identity = self.current_identity();
                return RequestConfig {
                    headers: identity.headers(),
                    identity,
                    delay: config.delay,
                };
            }
        }
    }

    /// 判定响应是否被拦截
    pub fn classify(&self, response: &FetchResponse) -> Option<BlockingClassification> {
        let classification = |kind: BlockingKind, retry_after: Option<Duration>, reason: String| {
            Some(BlockingClassification {
                kind,
                severity: kind.severity(),
                retry_after,
                reason,
            })
        };

        match response.status_code {
            429 => {
                return classification(
                    BlockingKind::RateLimit,
                    response.retry_after(self.clock.now()),
                    "HTTP 429".to_string(),
                )
            }
            403 | 451 => {
                return classification(
                    BlockingKind::IpBlocked,
                    Some(self.config.critical_open),
                    format!("HTTP {}", response.status_code),
                )
            }
            _ => {}
        }

        if let Some(reason) = Self::captcha_signature(response) {
            return classification(BlockingKind::Captcha, None, reason);
        }

        if matches!(response.status_code, 418 | 999) {
            return classification(
                BlockingKind::Unknown,
                None,
                format!("HTTP {}", response.status_code),
            );
        }

        None
    }

    fn captcha_signature(response: &FetchResponse) -> Option<String> {
        if let Ok(url) = Url::parse(&response.final_url) {
            let path = url.path().to_ascii_lowercase();
            if path.starts_with("/login") || path.starts_with("/checkpoint") {
                return Some(format!("redirected to {}", url.path()));
            }
        }

        let body = response.body.to_ascii_lowercase();
        CAPTCHA_SIGNATURES
            .iter()
            .find(|sig| body.contains(*sig))
            .map(|sig| format!("body contains {}", sig))
    }

    /// 根据严重程度决定熔断打开时长
    pub fn open_duration(&self, classification: &BlockingClassification) -> Duration {
        match classification.severity {
            Severity::Critical | Severity::High => self.config.critical_open,
            Severity::Medium => self
                .config
                .medium_open
                .max(classification.retry_after.unwrap_or(Duration::ZERO)),
            Severity::Low | Severity::None => self.config.medium_open / 2,
        }
    }

    /// 观察一次响应
    ///
    /// 被拦截时记录事件、轮换身份并打开熔断器，每次判定只打开一次；
    /// 成功响应会关闭熔断器。
    pub fn observe(
        &self,
        response: &FetchResponse,
        target_id: Option<&str>,
    ) -> Option<BlockingClassification> {
        let Some(classification) = self.classify(response) else {
            if response.is_success() {
                self.circuit.record_success();
            }
            return None;
        };

        warn!(
            target_id = target_id.unwrap_or("-"),
            kind = %classification.kind,
            severity = %classification.severity,
            "Blocked by upstream: {}",
            classification.reason
        );
        self.monitor.record(BlockingEvent::from_classification(
            &classification,
            self.clock.now(),
            target_id,
        ));
        self.rotate_identity();
        self.circuit.trip(self.open_duration(&classification));
        Some(classification)
    }

    pub fn status(&self) -> CircuitStatus {
        self.circuit.status()
    }

    /// 人工干预入口
    pub fn reset(&self) {
        self.circuit.reset();
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
