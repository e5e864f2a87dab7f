// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::models::alert::Alert;
use crate::domain::services::extraction_service::ExtractionTier;

/// 任务状态
///
/// Pending → Running → (Succeeded | Retrying → Running | Failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Retrying => write!(f, "retrying"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 单个目标的抓取任务，生命周期不超过所属批次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub target_id: String,
    /// 优先级，数值越大越优先
    pub priority: i32,
    pub status: JobStatus,
    /// 已执行的重试次数
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        batch_id: Uuid,
        target_id: impl Into<String>,
        priority: i32,
        max_retries: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            target_id: target_id.into(),
            priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
    }

    pub fn schedule_retry(&mut self) {
        self.retry_count += 1;
        self.status = JobStatus::Retrying;
    }

    pub fn succeed(&mut self) {
        self.status = JobStatus::Succeeded;
    }

    pub fn fail(&mut self) {
        self.status = JobStatus::Failed;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// 任务执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub target_id: String,
    pub page_name: String,
    pub status: JobStatus,
    pub previous: u32,
    pub current: u32,
    pub delta: i64,
    pub percent_change: f64,
    /// 实际执行次数
    pub attempts: u32,
    pub from_cache: bool,
    pub tier: Option<ExtractionTier>,
    /// 样本是否成功写入存储
    pub recorded: bool,
    pub alerts: Vec<Alert>,
    pub error: Option<String>,
}

impl JobResult {
    /// 终态失败结果
    pub fn failed(job: &Job, page_name: impl Into<String>, attempts: u32, error: String) -> Self {
        Self {
            job_id: job.id,
            target_id: job.target_id.clone(),
            page_name: page_name.into(),
            status: JobStatus::Failed,
            previous: 0,
            current: 0,
            delta: 0,
            percent_change: 0.0,
            attempts,
            from_cache: false,
            tier: None,
            recorded: false,
            alerts: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}
