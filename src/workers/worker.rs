// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;

/// 后台工作器特质
///
/// 工作器在 `run` 中循环执行，直到出现无法恢复的错误或任务被取消
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self) -> Result<(), WorkerError>;

    /// 用于日志的名称
    fn name(&self) -> &str;
}
