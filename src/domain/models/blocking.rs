// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 拦截类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingKind {
    /// 触发限流（HTTP 429）
    RateLimit,
    /// 出现验证码或登录墙
    Captcha,
    /// IP 被封禁（HTTP 403/451）
    IpBlocked,
    /// 无法归类的异常响应
    Unknown,
}

impl BlockingKind {
    /// 该拦截类型对应的严重程度
    pub fn severity(self) -> Severity {
        match self {
            BlockingKind::IpBlocked => Severity::Critical,
            BlockingKind::Captcha => Severity::High,
            BlockingKind::RateLimit => Severity::Medium,
            BlockingKind::Unknown => Severity::Low,
        }
    }

    /// 监控器使用的权重
    pub fn weight(self) -> u32 {
        match self {
            BlockingKind::IpBlocked => 4,
            BlockingKind::Captcha => 3,
            BlockingKind::RateLimit => 2,
            BlockingKind::Unknown => 1,
        }
    }
}

impl fmt::Display for BlockingKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockingKind::RateLimit => write!(f, "rate_limit"),
            BlockingKind::Captcha => write!(f, "captcha"),
            BlockingKind::IpBlocked => write!(f, "ip_blocked"),
            BlockingKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// 严重程度，按从轻到重排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// 指标上报用的数值
    pub fn as_gauge(self) -> f64 {
        match self {
            Severity::None => 0.0,
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 4.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// 对一次响应的拦截判定
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingClassification {
    pub kind: BlockingKind,
    pub severity: Severity,
    /// 建议的重试等待时间
    pub retry_after: Option<Duration>,
    /// 判定原因，用于日志
    pub reason: String,
}

/// 拦截事件
///
/// 只追加的日志记录，由拦截监控器读取
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingEvent {
    pub kind: BlockingKind,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// 建议的重试等待（秒）
    pub retry_after_secs: Option<u64>,
    pub target_id: Option<String>,
}

impl BlockingEvent {
    pub fn from_classification(
        classification: &BlockingClassification,
        timestamp: DateTime<Utc>,
        target_id: Option<&str>,
    ) -> Self {
        Self {
            kind: classification.kind,
            severity: classification.severity,
            timestamp,
            retry_after_secs: classification.retry_after.map(|d| d.as_secs()),
            target_id: target_id.map(str::to_string),
        }
    }
}
