// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::batch::{Batch, BatchStatus};
use crate::domain::repositories::batch_repository::BatchRepository;
use crate::utils::errors::RepositoryError;

/// 内存中的批次仓库实现
#[derive(Default, Clone)]
pub struct InMemoryBatchRepository {
    batches: Arc<RwLock<HashMap<Uuid, Batch>>>,
}

impl InMemoryBatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.read().is_empty()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn replace_day(
        &self,
        date: NaiveDate,
        batches: Vec<Batch>,
    ) -> Result<usize, RepositoryError> {
        let mut store = self.batches.write();
        let before = store.len();
        // 新调度生效后，更早日期遗留的待执行批次一并作废；正在执行的保留
        store.retain(|_, b| {
            b.is_processed()
                || b.date > date
                || (b.date < date && b.status == BatchStatus::Processing)
        });
        let discarded = before - store.len();
        for batch in batches {
            store.insert(batch.id, batch);
        }
        Ok(discarded)
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Option<Batch>, RepositoryError> {
        Ok(self
            .batches
            .read()
            .values()
            .filter(|b| b.status == BatchStatus::Scheduled && b.is_due(now))
            .min_by_key(|b| (b.scheduled_time, b.index))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Batch>, RepositoryError> {
        Ok(self.batches.read().get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: BatchStatus) -> Result<bool, RepositoryError> {
        let mut store = self.batches.write();
        let batch = store
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("batch {}", id)))?;
        if batch.is_processed() || batch.status == status {
            return Ok(false);
        }
        batch.status = status;
        Ok(true)
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<Batch>, RepositoryError> {
        let mut batches: Vec<Batch> = self
            .batches
            .read()
            .values()
            .filter(|b| b.date == date)
            .cloned()
            .collect();
        batches.sort_by_key(|b| (b.scheduled_time, b.index));
        Ok(batches)
    }
}
