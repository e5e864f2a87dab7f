// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use crate::config::settings::RetrySettings;

const BLOCKING_MIN_BACKOFF: Duration = Duration::from_secs(30);

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次执行）
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 最小退避时间，抖动后也不会低于该值
    pub min_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            min_backoff: Duration::ZERO,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 网络类失败（超时、连接重置）的重试策略：较短的初始退避
    pub fn network(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.network_initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            min_backoff: Duration::ZERO,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }

    /// 拦截类失败的重试策略
    ///
    /// 任何一次退避都不少于30秒，尝试次数不超过网络类失败的上限
    pub fn blocking(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.blocking_max_retries.min(settings.max_retries),
            initial_backoff: Duration::from_millis(settings.blocking_initial_backoff_ms)
                .max(BLOCKING_MIN_BACKOFF),
            max_backoff: Duration::from_millis(settings.max_backoff_ms).max(BLOCKING_MIN_BACKOFF),
            min_backoff: BLOCKING_MIN_BACKOFF,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: 0.2,
            enable_jitter: true,
        }
    }

    /// 关闭抖动，得到确定的退避时间
    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// 计算第 `attempt` 次失败后的退避时间（attempt 从1开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let floor = self.min_backoff.as_secs_f64();
        let ceiling = self.max_backoff.as_secs_f64().max(floor);
        let capped_backoff = backoff_secs.min(ceiling);

        let jitter_range = capped_backoff * self.jitter_factor;
        let final_backoff = if self.enable_jitter && jitter_range > 0.0 {
            let jitter = rand::random_range(-jitter_range..jitter_range);
            capped_backoff + jitter
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff.clamp(floor, ceiling))
    }

    /// 总尝试次数上限（至少执行一次）
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// 已失败 `attempt` 次后是否还应重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}
