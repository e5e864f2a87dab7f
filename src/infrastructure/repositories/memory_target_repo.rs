// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::domain::models::target::{DailyStatSample, TrackedTarget};
use crate::domain::repositories::target_repository::TargetRepository;
use crate::utils::errors::RepositoryError;

/// 内存中的跟踪目标仓库实现
///
/// 按插入顺序保存目标，批次划分依赖这一顺序保持稳定。
#[derive(Default, Clone)]
pub struct InMemoryTargetRepository {
    targets: Arc<RwLock<Vec<TrackedTarget>>>,
}

impl InMemoryTargetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: Vec<TrackedTarget>) -> Self {
        Self {
            targets: Arc::new(RwLock::new(targets)),
        }
    }

    /// 从 JSON 文件加载目标列表
    ///
    /// 文件内容为 `TrackedTarget` 数组
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let targets: Vec<TrackedTarget> = serde_json::from_str(&raw)?;
        info!("Loaded {} tracked targets from {}", targets.len(), path.display());
        Ok(Self::with_targets(targets))
    }

    /// 当前保存的目标数量
    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }

    /// 停用或删除目标由外部协作方完成，这里提供同等效果的入口
    pub fn remove(&self, id: &str) -> Option<TrackedTarget> {
        let mut targets = self.targets.write();
        let idx = targets.iter().position(|t| t.id == id)?;
        Some(targets.remove(idx))
    }

    fn update<F>(&self, id: &str, f: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut TrackedTarget),
    {
        let mut targets = self.targets.write();
        let target = targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("target {}", id)))?;
        f(target);
        Ok(())
    }
}

#[async_trait]
impl TargetRepository for InMemoryTargetRepository {
    async fn find_active(&self) -> Result<Vec<TrackedTarget>, RepositoryError> {
        Ok(self
            .targets
            .read()
            .iter()
            .filter(|t| t.active)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TrackedTarget>, RepositoryError> {
        Ok(self.targets.read().iter().find(|t| t.id == id).cloned())
    }

    async fn upsert_daily_sample(
        &self,
        id: &str,
        sample: DailyStatSample,
    ) -> Result<(), RepositoryError> {
        self.update(id, |target| target.upsert_sample(sample))
    }

    async fn touch_last_checked(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.update(id, |target| target.last_checked_at = Some(at))
    }

    async fn insert(&self, target: TrackedTarget) -> Result<(), RepositoryError> {
        let mut targets = self.targets.write();
        match targets.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => *existing = target,
            None => targets.push(target),
        }
        Ok(())
    }
}
