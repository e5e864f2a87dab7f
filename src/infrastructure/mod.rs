// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 包含缓存、指标导出、存储和外部通知等基础设施实现
pub mod cache;
pub mod metrics;
pub mod repositories;
pub mod services;
