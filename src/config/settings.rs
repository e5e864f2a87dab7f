// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::services::alert_service::AlertThresholds;
use crate::domain::services::extraction_service::{Confidence, ExtractionConfig};

/// 应用程序配置设置
///
/// 所有调度、抓取、缓存、重试与告警参数都可以通过配置文件或环境变量调整
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 批次调度配置
    pub scheduler: SchedulerSettings,
    /// 抓取配置
    pub fetcher: FetcherSettings,
    /// 反检测配置
    pub guard: GuardSettings,
    /// 结果缓存配置
    pub cache: CacheSettings,
    /// 重试配置
    pub retry: RetrySettings,
    /// 拦截监控配置
    pub monitor: MonitorSettings,
    /// 提取配置
    pub extraction: ExtractionSettings,
    /// LLM配置
    pub llm: LlmSettings,
    /// 告警阈值
    pub alerts: AlertThresholds,
    /// 通知配置
    pub notifications: NotificationSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
    /// 存储配置
    #[serde(default)]
    pub store: StoreSettings,
}

/// 批次调度配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// 每批目标数量
    pub batch_size: usize,
    /// 批次间隔（秒）
    pub batch_interval_secs: u64,
    /// 每日首批开始的小时（本地时间）
    pub day_start_hour: u32,
    /// 本地时间相对UTC的偏移（小时）
    pub utc_offset_hours: i32,
    /// 调度器轮询间隔（秒）
    pub tick_interval_secs: u64,
}

/// 抓取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherSettings {
    /// 最大并发请求数
    pub max_concurrency: usize,
    /// 单次请求超时（毫秒）
    pub timeout_ms: u64,
    /// 目标页面URL模板，支持 `{page_id}` 和 `{country}` 占位符
    pub target_url_template: String,
    /// 默认地区
    pub default_region: String,
}

/// 反检测配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct GuardSettings {
    pub base_delay_ms: u64,
    pub failure_step_ms: u64,
    pub max_failure_delay_ms: u64,
    pub jitter_ms: u64,
    /// 严重拦截时熔断打开时长（秒）
    pub critical_open_secs: u64,
    /// 中等拦截时熔断打开时长（秒）
    pub medium_open_secs: u64,
    /// 自定义 User-Agent 列表，为空时使用内置身份
    #[serde(default)]
    pub user_agents: Vec<String>,
}

/// 结果缓存配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

/// 重试配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    /// 拦截类失败的尝试次数上限，不超过 `max_retries`
    pub blocking_max_retries: u32,
    pub network_initial_backoff_ms: u64,
    pub blocking_initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

/// 拦截监控配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    /// 滚动窗口（秒）
    pub window_secs: u64,
    pub max_batch_size: usize,
    pub max_concurrency: usize,
    pub base_delay_ms: u64,
}

/// 提取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSettings {
    pub top_k_fragments: usize,
    pub max_prompt_chars: usize,
    pub min_confidence: Confidence,
}

/// LLM配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base_url: String,
}

/// 通知配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub recipients: Vec<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

/// 存储配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    /// 跟踪目标种子文件（JSON）
    pub targets_file: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 加载顺序：内置默认值 → `config/default.toml` → `config/{APP_ENVIRONMENT}.toml`
    /// → 以 `ADPULSE__` 为前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("ADPULSE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("notifications.recipients")
                    .with_list_parse_key("guard.user_agents"),
            )
            .build()?
            .try_deserialize()
    }

    /// 仅使用内置默认值构建配置
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            // Scheduler
            .set_default("scheduler.batch_size", 50)?
            .set_default("scheduler.batch_interval_secs", 7200)?
            .set_default("scheduler.day_start_hour", 6)?
            .set_default("scheduler.utc_offset_hours", 0)?
            .set_default("scheduler.tick_interval_secs", 60)?
            // Fetcher
            .set_default("fetcher.max_concurrency", 3)?
            .set_default("fetcher.timeout_ms", 30_000)?
            .set_default(
                "fetcher.target_url_template",
                "https://www.facebook.com/ads/library/?active_status=active&ad_type=all&country={country}&view_all_page_id={page_id}",
            )?
            .set_default("fetcher.default_region", "ALL")?
            // Guard
            .set_default("guard.base_delay_ms", 2_000)?
            .set_default("guard.failure_step_ms", 1_000)?
            .set_default("guard.max_failure_delay_ms", 10_000)?
            .set_default("guard.jitter_ms", 1_000)?
            .set_default("guard.critical_open_secs", 300)?
            .set_default("guard.medium_open_secs", 30)?
            // Cache
            .set_default("cache.ttl_secs", 1_800)?
            .set_default("cache.max_entries", 1_000)?
            // Retry
            .set_default("retry.max_retries", 2)?
            .set_default("retry.blocking_max_retries", 2)?
            .set_default("retry.network_initial_backoff_ms", 2_000)?
            .set_default("retry.blocking_initial_backoff_ms", 30_000)?
            .set_default("retry.max_backoff_ms", 300_000)?
            .set_default("retry.backoff_multiplier", 2.0)?
            // Monitor
            .set_default("monitor.window_secs", 900)?
            .set_default("monitor.max_batch_size", 50)?
            .set_default("monitor.max_concurrency", 3)?
            .set_default("monitor.base_delay_ms", 2_000)?
            // Extraction
            .set_default("extraction.top_k_fragments", 5)?
            .set_default("extraction.max_prompt_chars", 8_000)?
            .set_default("extraction.min_confidence", "medium")?
            // LLM
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.api_base_url", "https://api.openai.com/v1")?
            // Alerts
            .set_default("alerts.growth_percent", 50.0)?
            .set_default("alerts.growth_min_current", 5)?
            .set_default("alerts.decline_percent", -30.0)?
            .set_default("alerts.decline_min_previous", 3)?
            .set_default("alerts.high_activity_count", 50)?
            // Notifications
            .set_default("notifications.webhook_secret", "change-me")?
            // Metrics
            .set_default("metrics.enabled", true)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetcher.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            top_k_fragments: self.extraction.top_k_fragments,
            max_prompt_chars: self.extraction.max_prompt_chars,
            min_confidence: self.extraction.min_confidence,
        }
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
