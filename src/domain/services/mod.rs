// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 告警推导（alert_service）：根据前后广告数生成告警，无状态
/// - 提取服务（extraction_service）：两级提取，模式匹配优先，AI 兜底
/// - LLM服务（llm_service）：文本生成接口及 OpenAI 兼容实现
/// - 通知服务（notification_service）：通知接口与告警分发
pub mod alert_service;
pub mod extraction_service;
pub mod llm_service;
pub mod notification_service;
