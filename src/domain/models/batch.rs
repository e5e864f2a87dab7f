// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 批次状态
///
/// Scheduled → Processing → Processed（终态，重复标记无副作用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Scheduled,
    Processing,
    Processed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BatchStatus::Scheduled => write!(f, "scheduled"),
            BatchStatus::Processing => write!(f, "processing"),
            BatchStatus::Processed => write!(f, "processed"),
        }
    }
}

/// 批次
///
/// 一组在同一时间窗口内一起处理的目标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    /// 所属的调度日（本地日期）
    pub date: NaiveDate,
    /// 当日内的序号
    pub index: usize,
    /// 有序的目标ID列表
    pub target_ids: Vec<String>,
    pub scheduled_time: DateTime<Utc>,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(
        date: NaiveDate,
        index: usize,
        target_ids: Vec<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            index,
            target_ids,
            scheduled_time,
            status: BatchStatus::Scheduled,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.status == BatchStatus::Processed
    }

    /// 是否已到执行时间且尚未处理
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_processed() && self.scheduled_time <= now
    }
}
