// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 领域层只依赖这些抽象接口，具体实现由基础设施层提供。
///
/// - 批次仓库（batch_repository）：每日调度的持久化
/// - 跟踪目标仓库（target_repository）：目标及其每日样本
pub mod batch_repository;
pub mod target_repository;
