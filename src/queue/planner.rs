// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::settings::SchedulerSettings;
use crate::domain::models::batch::{Batch, BatchStatus};
use crate::domain::models::target::TrackedTarget;
use crate::domain::repositories::batch_repository::BatchRepository;
use crate::engines::blocking_monitor::BlockingMonitor;
use crate::utils::clock::Clock;
use crate::utils::errors::RepositoryError;

/// 批次调度配置
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// 每批目标数量
    pub batch_size: usize,
    /// 相邻批次的间隔
    pub interval: Duration,
    /// 每日首批开始的小时（本地时间）
    pub day_start_hour: u32,
    /// 本地时间相对UTC的偏移（秒）
    pub utc_offset_secs: i32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            interval: Duration::hours(2),
            day_start_hour: 6,
            utc_offset_secs: 0,
        }
    }
}

impl From<&SchedulerSettings> for PlannerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            interval: Duration::seconds(settings.batch_interval_secs as i64),
            day_start_hour: settings.day_start_hour.min(23),
            utc_offset_secs: settings.utc_offset_hours.clamp(-23, 23) * 3600,
        }
    }
}

/// 批次调度器
///
/// 把所有活跃目标按输入顺序划分为固定大小的批次，并把批次分布到一天中。
/// 每个自然日只有一份有效调度。
pub struct BatchPlanner {
    repository: Arc<dyn BatchRepository>,
    monitor: Option<Arc<BlockingMonitor>>,
    config: PlannerConfig,
    clock: Arc<dyn Clock>,
}

impl BatchPlanner {
    pub fn new(
        repository: Arc<dyn BatchRepository>,
        config: PlannerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            monitor: None,
            config,
            clock,
        }
    }

    /// 使用拦截监控器的建议值收紧批次大小
    pub fn with_monitor(mut self, monitor: Arc<BlockingMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// 指定时间对应的本地日期
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (at + Duration::seconds(self.config.utc_offset_secs as i64)).date_naive()
    }

    /// 当前本地日期
    pub fn today(&self) -> NaiveDate {
        self.local_date(self.clock.now())
    }

    /// 某一天首批的计划时间（UTC）
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let start =
            NaiveTime::from_hms_opt(self.config.day_start_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let local = date.and_time(start);
        (local - Duration::seconds(self.config.utc_offset_secs as i64)).and_utc()
    }

    /// 当前生效的批次大小
    pub fn effective_batch_size(&self) -> usize {
        let recommended = self
            .monitor
            .as_ref()
            .map(|m| m.recommended_batch_size())
            .unwrap_or(self.config.batch_size);
        self.config.batch_size.min(recommended).max(1)
    }

    /// 生成某一天的批次，不写入存储
    ///
    /// 重复的目标ID只保留第一次出现的位置
    pub fn plan(&self, date: NaiveDate, targets: &[TrackedTarget]) -> Vec<Batch> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = targets
            .iter()
            .filter(|t| seen.insert(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();

        let start = self.day_start(date);
        ids.chunks(self.effective_batch_size())
            .enumerate()
            .map(|(index, chunk)| {
                Batch::new(
                    date,
                    index,
                    chunk.to_vec(),
                    start + self.config.interval * index as i32,
                )
            })
            .collect()
    }

    /// 为今天建立调度
    ///
    /// 先丢弃同一天尚未处理的旧批次以及前几天遗留的待执行批次，再写入完整的新调度
    pub async fn schedule_day(
        &self,
        targets: &[TrackedTarget],
    ) -> Result<Vec<Batch>, RepositoryError> {
        let date = self.today();
        self.schedule_for(date, targets).await
    }

    /// 为指定日期建立调度
    pub async fn schedule_for(
        &self,
        date: NaiveDate,
        targets: &[TrackedTarget],
    ) -> Result<Vec<Batch>, RepositoryError> {
        let batches = self.plan(date, targets);
        let discarded = self.repository.replace_day(date, batches.clone()).await?;
        info!(
            %date,
            batches = batches.len(),
            targets = targets.len(),
            discarded,
            "Scheduled daily batches"
        );
        Ok(batches)
    }

    /// 最早一个到期且未处理的批次
    pub async fn next_batch(&self) -> Result<Option<Batch>, RepositoryError> {
        self.repository.find_due(self.clock.now()).await
    }

    pub async fn mark_processing(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.repository.set_status(id, BatchStatus::Processing).await
    }

    /// 标记批次已处理，重复调用无副作用
    pub async fn mark_processed(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.repository.mark_processed(id).await
    }

    /// 指定日期是否已有调度
    pub async fn has_schedule_for(&self, date: NaiveDate) -> Result<bool, RepositoryError> {
        Ok(!self.repository.find_by_date(date).await?.is_empty())
    }
}
