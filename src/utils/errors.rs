// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::blocking::BlockingClassification;
use crate::engines::traits::FetchError;
use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("存储不可用: {0}")]
    Unavailable(String),

    #[error("未找到数据: {0}")]
    NotFound(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("通知发送失败: {0}")]
    Delivery(String),

    #[error("通知接收方拒绝: HTTP {0}")]
    Rejected(u16),
}

/// 单次任务执行错误
#[derive(Error, Debug)]
pub enum JobError {
    #[error("抓取失败: {0}")]
    Fetch(#[from] FetchError),

    #[error("请求被拦截: {}", .0.reason)]
    Blocked(BlockingClassification),

    #[error("目标不存在或已停用: {0}")]
    TargetVanished(String),

    #[error("无法构造目标地址: {0}")]
    InvalidTarget(String),

    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),
}

impl JobError {
    /// 是否属于拦截类错误（需要更长的退避）
    pub fn is_blocking(&self) -> bool {
        matches!(self, JobError::Blocked(_))
    }

    /// 是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Fetch(e) => e.is_retryable(),
            JobError::Blocked(_) => true,
            JobError::Repository(_) => true,
            JobError::TargetVanished(_) | JobError::InvalidTarget(_) => false,
        }
    }
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("仓库错误: {0}")]
    RepositoryError(#[from] RepositoryError),

    #[error("内部错误: {0}")]
    InternalError(String),
}
