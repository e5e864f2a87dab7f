// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// - 每日批次调度（planner）
/// - 批次执行与任务重试（processor）
pub mod planner;
pub mod processor;
