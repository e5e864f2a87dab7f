// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含跟踪目标、批次、告警等领域实体，以及提取与通知服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 页面抓取、熔断器、拦截监控与防检测守卫
pub mod engines;

/// 基础设施模块
///
/// 提供缓存、内存存储、指标导出和 webhook 通知
pub mod infrastructure;

/// 队列模块
///
/// 每日批次调度和批次执行
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 驱动调度与批次处理的后台工作器
pub mod workers;
