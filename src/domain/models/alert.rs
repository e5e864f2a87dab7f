// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Growth,
    Decline,
    Inactive,
    HighActivity,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AlertKind::Growth => write!(f, "growth"),
            AlertKind::Decline => write!(f, "decline"),
            AlertKind::Inactive => write!(f, "inactive"),
            AlertKind::HighActivity => write!(f, "high_activity"),
        }
    }
}

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Medium,
    High,
}

/// 广告数量变化告警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub target_id: String,
    pub page_name: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub previous: u32,
    pub current: u32,
    pub percent_change: f64,
}

impl Alert {
    /// 发送给通知接收方的文本
    pub fn message(&self) -> String {
        match self.kind {
            AlertKind::Growth => format!(
                "[growth] {} grew from {} to {} active ads ({:+.1}%)",
                self.page_name, self.previous, self.current, self.percent_change
            ),
            AlertKind::Decline => format!(
                "[decline] {} dropped from {} to {} active ads ({:+.1}%)",
                self.page_name, self.previous, self.current, self.percent_change
            ),
            AlertKind::Inactive => format!(
                "[inactive] {} has no active ads (previously {})",
                self.page_name, self.previous
            ),
            AlertKind::HighActivity => format!(
                "[high activity] {} is running {} active ads",
                self.page_name, self.current
            ),
        }
    }
}
