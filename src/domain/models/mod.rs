// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 跟踪目标与每日样本（target）
/// - 批次（batch）与任务（job）
/// - 拦截事件（blocking）
/// - 告警（alert）
pub mod alert;
pub mod batch;
pub mod blocking;
pub mod job;
pub mod target;
