// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Deserialize;

use crate::domain::models::alert::{Alert, AlertKind, AlertSeverity};
use crate::domain::models::target::percent_change;

/// 告警阈值
///
/// 增长、下降、停投和高活跃四类规则共用一套可配置阈值
#[derive(Debug, Clone, Deserialize)]
pub struct AlertThresholds {
    /// 增长告警的最小变化百分比
    pub growth_percent: f64,
    /// 增长告警要求的最小当前广告数
    pub growth_min_current: u32,
    /// 下降告警的变化百分比上限（负数）
    pub decline_percent: f64,
    /// 下降告警要求的最小前值
    pub decline_min_previous: u32,
    /// 高活跃告警的广告数下限
    pub high_activity_count: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            growth_percent: 50.0,
            growth_min_current: 5,
            decline_percent: -30.0,
            decline_min_previous: 3,
            high_activity_count: 50,
        }
    }
}

/// 根据前后两次广告数推导告警
///
/// 各条规则相互独立，同一次变化可能产生多条告警。
pub fn derive_alerts(
    thresholds: &AlertThresholds,
    target_id: &str,
    page_name: &str,
    previous: u32,
    current: u32,
) -> Vec<Alert> {
    let change = percent_change(previous, current);
    let alert = |kind, severity| Alert {
        target_id: target_id.to_string(),
        page_name: page_name.to_string(),
        kind,
        severity,
        previous,
        current,
        percent_change: change,
    };

    let mut alerts = Vec::new();

    if change >= thresholds.growth_percent && current >= thresholds.growth_min_current {
        alerts.push(alert(AlertKind::Growth, AlertSeverity::High));
    }

    if change <= thresholds.decline_percent && previous >= thresholds.decline_min_previous {
        alerts.push(alert(AlertKind::Decline, AlertSeverity::High));
    }

    if current == 0 && previous > 0 {
        alerts.push(alert(AlertKind::Inactive, AlertSeverity::Medium));
    }

    if current >= thresholds.high_activity_count {
        alerts.push(alert(AlertKind::HighActivity, AlertSeverity::Medium));
    }

    alerts
}
