// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 跟踪目标
///
/// 一个被监控广告数量变化的外部广告主身份。目标由外部协作方创建和停用，
/// 本引擎只负责追加每日样本并更新 `last_checked_at`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedTarget {
    /// 外部标识（广告库中的主页ID）
    pub id: String,
    /// 显示名称
    pub name: String,
    /// 是否处于跟踪状态
    #[serde(default = "default_active")]
    pub active: bool,
    /// 查询地区，为空时使用全局默认地区
    #[serde(default)]
    pub region: Option<String>,
    /// 最后检查时间
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// 按日期升序排列的每日样本
    #[serde(default)]
    pub history: Vec<DailyStatSample>,
}

fn default_active() -> bool {
    true
}

impl TrackedTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
            region: None,
            last_checked_at: None,
            history: Vec::new(),
        }
    }

    /// 指定日期之前最近一个样本的活跃广告数，没有历史时为0
    ///
    /// 同一天重复检查时，比较基准始终是前一个自然日的样本，而不是当天被替换的样本。
    pub fn previous_count(&self, date: NaiveDate) -> u32 {
        self.history
            .iter()
            .filter(|s| s.date < date)
            .max_by_key(|s| s.date)
            .map(|s| s.active_count)
            .unwrap_or(0)
    }

    /// 写入每日样本：同日样本被替换，否则按日期顺序插入
    pub fn upsert_sample(&mut self, sample: DailyStatSample) {
        if let Some(existing) = self.history.iter_mut().find(|s| s.date == sample.date) {
            *existing = sample;
            return;
        }
        let pos = self.history.partition_point(|s| s.date < sample.date);
        self.history.insert(pos, sample);
    }

    /// 查询使用的地区
    pub fn region_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.region.as_deref().unwrap_or(default)
    }
}

/// 每日统计样本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatSample {
    pub date: NaiveDate,
    pub active_count: u32,
    /// 相对前一个样本的变化量
    pub delta: i64,
    /// 变化百分比
    pub percent_change: f64,
}

impl DailyStatSample {
    pub fn compute(date: NaiveDate, previous: u32, current: u32) -> Self {
        Self {
            date,
            active_count: current,
            delta: current as i64 - previous as i64,
            percent_change: percent_change(previous, current),
        }
    }
}

/// 计算变化百分比
///
/// 前值为0时：当前值大于0记为100%，否则为0%。
pub fn percent_change(previous: u32, current: u32) -> f64 {
    if previous > 0 {
        (current as f64 - previous as f64) / previous as f64 * 100.0
    } else if current > 0 {
        100.0
    } else {
        0.0
    }
}
