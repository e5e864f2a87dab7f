// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::models::target::{DailyStatSample, TrackedTarget};
use crate::utils::errors::RepositoryError;

/// 跟踪目标仓库特质
///
/// 文档存储语义：查询、插入、向历史数组追加样本、设置标量字段，不假设事务。
#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// 所有处于跟踪状态的目标，按插入顺序返回
    async fn find_active(&self) -> Result<Vec<TrackedTarget>, RepositoryError>;
    /// 根据ID查找目标
    async fn find_by_id(&self, id: &str) -> Result<Option<TrackedTarget>, RepositoryError>;
    /// 写入每日样本
    ///
    /// 同一天已有样本时替换，否则追加
    async fn upsert_daily_sample(
        &self,
        id: &str,
        sample: DailyStatSample,
    ) -> Result<(), RepositoryError>;
    /// 更新最后检查时间
    async fn touch_last_checked(&self, id: &str, at: DateTime<Utc>)
        -> Result<(), RepositoryError>;
    /// 插入或覆盖目标
    async fn insert(&self, target: TrackedTarget) -> Result<(), RepositoryError>;
}
