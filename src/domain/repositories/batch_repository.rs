// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::models::batch::{Batch, BatchStatus};
use crate::utils::errors::RepositoryError;

/// 批次仓库特质
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// 替换某一天的调度
    ///
    /// 先删除该日期下所有未处理的批次，以及更早日期遗留的待执行批次，
    /// 再写入新批次；已处理的批次保留。
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 被丢弃的旧批次数量
    async fn replace_day(&self, date: NaiveDate, batches: Vec<Batch>)
        -> Result<usize, RepositoryError>;
    /// 最早一个到期且未处理的批次
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Option<Batch>, RepositoryError>;
    /// 根据ID查找批次
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Batch>, RepositoryError>;
    /// 更新批次状态，不允许从已处理状态回退
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 状态发生了变化
    /// * `Ok(false)` - 批次已处于目标状态或已处理
    async fn set_status(&self, id: Uuid, status: BatchStatus) -> Result<bool, RepositoryError>;
    /// 标记批次已处理，重复调用无副作用
    async fn mark_processed(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.set_status(id, BatchStatus::Processed).await
    }
    /// 某一天的全部批次，按计划时间排序
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<Batch>, RepositoryError>;
}
