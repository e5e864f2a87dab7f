// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::settings::MonitorSettings;
use crate::domain::models::blocking::{BlockingEvent, BlockingKind, Severity};
use crate::utils::clock::Clock;

/// 拦截监控配置
#[derive(Debug, Clone)]
pub struct BlockingMonitorConfig {
    /// 滚动窗口
    pub window: Duration,
    /// 批次大小上限
    pub max_batch_size: usize,
    /// 并发上限
    pub max_concurrency: usize,
    /// 基础请求间隔
    pub base_delay: Duration,
}

impl Default for BlockingMonitorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(900),
            max_batch_size: 50,
            max_concurrency: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl From<&MonitorSettings> for BlockingMonitorConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            window: Duration::from_secs(settings.window_secs),
            max_batch_size: settings.max_batch_size.max(1),
            max_concurrency: settings.max_concurrency.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

/// 监控状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub severity: Severity,
    pub score: u32,
    pub events_in_window: usize,
    pub by_kind: HashMap<BlockingKind, usize>,
    pub recommended_batch_size: usize,
    pub recommended_concurrency: usize,
    pub recommended_delay: Duration,
}

/// 拦截监控器
///
/// 汇总窗口内的拦截事件，得出滚动严重程度，
/// 并据此给出批次大小、并发数和请求间隔的建议值。
/// 事件移出窗口后建议值逐步回到配置上限。
pub struct BlockingMonitor {
    events: Mutex<VecDeque<BlockingEvent>>,
    config: BlockingMonitorConfig,
    clock: Arc<dyn Clock>,
}

impl BlockingMonitor {
    pub fn new(config: BlockingMonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            config,
            clock,
        }
    }

    /// 记录一次拦截事件
    ///
    /// # 返回值
    ///
    /// 记录后的严重程度
    pub fn record(&self, event: BlockingEvent) -> Severity {
        counter!("adpulse_blocking_events_total", "kind" => event.kind.to_string()).increment(1);

        let (before, after) = {
            let mut events = self.events.lock();
            let before = Self::classify(&self.prune(&mut events));
            events.push_back(event);
            (before, Self::classify(&events.iter().collect::<Vec<_>>()))
        };

        gauge!("adpulse_blocking_severity").set(after.0.as_gauge());
        if after.0 > before.0 {
            if after.0 >= Severity::High {
                warn!(
                    "ALARM: blocking severity escalated from {} to {} (score {})",
                    before.0, after.0, after.1
                );
            } else {
                info!("Blocking severity escalated from {} to {}", before.0, after.0);
            }
        }
        after.0
    }

    /// 当前严重程度
    pub fn severity(&self) -> Severity {
        self.current().0
    }

    /// 建议的批次大小
    pub fn recommended_batch_size(&self) -> usize {
        Self::scale(self.config.max_batch_size, self.severity())
    }

    /// 建议的并发数
    pub fn recommended_concurrency(&self) -> usize {
        Self::scale(self.config.max_concurrency, self.severity())
    }

    /// 建议的请求间隔
    pub fn recommended_delay(&self) -> Duration {
        self.config.base_delay.mul_f64(Self::delay_multiplier(self.severity()))
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let (severity, score, by_kind, events_in_window) = {
            let mut events = self.events.lock();
            let window = self.prune(&mut events);
            let (severity, score) = Self::classify(&window);
            let mut by_kind = HashMap::new();
            for event in &window {
                *by_kind.entry(event.kind).or_insert(0) += 1;
            }
            (severity, score, by_kind, window.len())
        };

        MonitorSnapshot {
            severity,
            score,
            events_in_window,
            by_kind,
            recommended_batch_size: Self::scale(self.config.max_batch_size, severity),
            recommended_concurrency: Self::scale(self.config.max_concurrency, severity),
            recommended_delay: self.config.base_delay.mul_f64(Self::delay_multiplier(severity)),
        }
    }

    /// 清空事件记录
    pub fn clear(&self) {
        self.events.lock().clear();
        gauge!("adpulse_blocking_severity").set(0.0);
    }

    fn current(&self) -> (Severity, u32) {
        let mut events = self.events.lock();
        let window = self.prune(&mut events);
        Self::classify(&window)
    }

    /// 移除窗口外的事件，返回窗口内事件的引用
    fn prune<'a>(&self, events: &'a mut VecDeque<BlockingEvent>) -> Vec<&'a BlockingEvent> {
        let cutoff = self.clock.now()
            - chrono::Duration::from_std(self.config.window)
                .unwrap_or_else(|_| chrono::Duration::days(1));
        while events.front().is_some_and(|e| e.timestamp < cutoff) {
            events.pop_front();
        }
        events.iter().collect()
    }

    /// 按类型权重计算分数并映射到严重程度
    fn classify(events: &[&BlockingEvent]) -> (Severity, u32) {
        let score: u32 = events.iter().map(|e| e.kind.weight()).sum();
        let mut severity = match score {
            0 => Severity::None,
            1..=2 => Severity::Low,
            3..=5 => Severity::Medium,
            6..=9 => Severity::High,
            _ => Severity::Critical,
        };
        if severity < Severity::Medium && events.iter().any(|e| e.kind == BlockingKind::IpBlocked)
        {
            severity = Severity::Medium;
        }
        (severity, score)
    }

    fn scale(maximum: usize, severity: Severity) -> usize {
        let factor = match severity {
            Severity::None => 1.0,
            Severity::Low => 0.75,
            Severity::Medium => 0.5,
            Severity::High => 0.25,
            Severity::Critical => return 1,
        };
        ((maximum as f64 * factor).floor() as usize).max(1)
    }

    fn delay_multiplier(severity: Severity) -> f64 {
        match severity {
            Severity::None => 1.0,
            Severity::Low => 1.5,
            Severity::Medium => 2.0,
            Severity::High => 4.0,
            Severity::Critical => 8.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn monitor() -> (BlockingMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap(),
        ));
        let config = BlockingMonitorConfig {
            window: Duration::from_secs(600),
            max_batch_size: 40,
            max_concurrency: 4,
            base_delay: Duration::from_secs(2),
        };
        (BlockingMonitor::new(config, clock.clone()), clock)
    }

    fn event(kind: BlockingKind, clock: &ManualClock) -> BlockingEvent {
        BlockingEvent {
            kind,
            severity: kind.severity(),
            timestamp: clock.now(),
            retry_after_secs: None,
            target_id: None,
        }
    }

    #[test]
    fn test_quiet_monitor_recommends_maxima() {
        let (monitor, _) = monitor();
        assert_eq!(monitor.severity(), Severity::None);
        assert_eq!(monitor.recommended_batch_size(), 40);
        assert_eq!(monitor.recommended_concurrency(), 4);
        assert_eq!(monitor.recommended_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_severity_rises_with_events() {
        let (monitor, clock) = monitor();

        assert_eq!(monitor.record(event(BlockingKind::RateLimit, &clock)), Severity::Low);
        assert_eq!(monitor.recommended_concurrency(), 3);

        assert_eq!(monitor.record(event(BlockingKind::Captcha, &clock)), Severity::Medium);
        assert_eq!(monitor.recommended_batch_size(), 20);
        assert_eq!(monitor.recommended_delay(), Duration::from_secs(4));

        assert_eq!(monitor.record(event(BlockingKind::Captcha, &clock)), Severity::High);
        assert_eq!(monitor.recommended_concurrency(), 1);

        monitor.record(event(BlockingKind::IpBlocked, &clock));
        assert_eq!(monitor.severity(), Severity::Critical);
        assert_eq!(monitor.recommended_batch_size(), 1);
        assert_eq!(monitor.recommended_delay(), Duration::from_secs(16));
    }

    #[test]
    fn test_single_ip_block_is_at_least_medium() {
        let (monitor, clock) = monitor();
        assert_eq!(monitor.record(event(BlockingKind::IpBlocked, &clock)), Severity::Medium);
    }

    #[test]
    fn test_events_age_out_of_window() {
        let (monitor, clock) = monitor();
        for _ in 0..3 {
            monitor.record(event(BlockingKind::IpBlocked, &clock));
        }
        assert_eq!(monitor.severity(), Severity::Critical);

        clock.advance(Duration::from_secs(601));
        assert_eq!(monitor.severity(), Severity::None);
        assert_eq!(monitor.recommended_batch_size(), 40);
    }

    #[test]
    fn test_snapshot_counts_by_kind() {
        let (monitor, clock) = monitor();
        monitor.record(event(BlockingKind::RateLimit, &clock));
        monitor.record(event(BlockingKind::RateLimit, &clock));
        monitor.record(event(BlockingKind::Unknown, &clock));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.events_in_window, 3);
        assert_eq!(snapshot.score, 5);
        assert_eq!(snapshot.severity, Severity::Medium);
        assert_eq!(snapshot.by_kind.get(&BlockingKind::RateLimit), Some(&2));
        assert_eq!(snapshot.recommended_concurrency, 2);
    }
}
