// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::domain::repositories::target_repository::TargetRepository;
use crate::queue::planner::BatchPlanner;
use crate::queue::processor::QueueProcessor;
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;

/// 一次轮询的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// 本次新建的批次数
    pub scheduled_batches: usize,
    /// 本次处理完成的批次数
    pub processed_batches: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// 批次工作器
///
/// 定期检查日期变化并建立当天的调度，然后依次处理所有已到期的批次
pub struct BatchWorker {
    targets: Arc<dyn TargetRepository>,
    planner: Arc<BatchPlanner>,
    processor: Arc<QueueProcessor>,
    interval: Duration,
    scheduled_for: Mutex<Option<NaiveDate>>,
}

impl BatchWorker {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        planner: Arc<BatchPlanner>,
        processor: Arc<QueueProcessor>,
        interval: Duration,
    ) -> Self {
        Self {
            targets,
            planner,
            processor,
            interval: interval.max(Duration::from_secs(1)),
            scheduled_for: Mutex::new(None),
        }
    }

    /// 执行一次轮询
    ///
    /// 当天还没有调度时，读取所有活跃目标建立调度；
    /// 随后处理到期批次直到没有剩余。
    pub async fn tick(&self) -> Result<TickSummary, WorkerError> {
        let mut summary = TickSummary::default();

        let today = self.planner.today();
        let known = *self.scheduled_for.lock();
        if known != Some(today) {
            if !self.planner.has_schedule_for(today).await? {
                let targets = self.targets.find_active().await?;
                summary.scheduled_batches = self.planner.schedule_for(today, &targets).await?.len();
            }
            *self.scheduled_for.lock() = Some(today);
        }

        while let Some(report) = self.processor.process_next().await? {
            summary.processed_batches += 1;
            summary.succeeded += report.succeeded;
            summary.failed += report.failed;
        }

        Ok(summary)
    }

    /// 启动后台运行
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Batch worker stopped: {}", e);
            }
        })
    }
}

#[async_trait]
impl Worker for BatchWorker {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("Batch worker started, polling every {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.tick().await {
                Ok(summary) => {
                    if summary.scheduled_batches > 0 || summary.processed_batches > 0 {
                        info!(
                            scheduled = summary.scheduled_batches,
                            processed = summary.processed_batches,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "Batch worker tick finished"
                        );
                    }
                }
                Err(e) => {
                    error!("Batch worker tick failed: {}", e);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "batch_worker"
    }
}
