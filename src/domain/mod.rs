// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// - 领域模型（models）：跟踪目标、批次、任务、拦截事件与告警
/// - 仓库接口（repositories）：持久化抽象接口
/// - 服务（services）：提取、告警推导与通知
///
/// 领域层不依赖任何具体的存储或网络实现。
pub mod models;
pub mod repositories;
pub mod services;
