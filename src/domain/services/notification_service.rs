// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::models::alert::{Alert, AlertSeverity};
use crate::utils::errors::NotificationError;

/// 通知发送特质
///
/// 定义向单个接收方投递文本消息的核心逻辑
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发送通知
    ///
    /// # 参数
    ///
    /// * `recipient_id` - 接收方标识
    /// * `message` - 消息文本
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 发送成功
    /// * `Err(NotificationError)` - 发送失败
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), NotificationError>;
}

/// 仅写日志的通知实现，未配置 webhook 时使用
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), NotificationError> {
        info!(recipient_id, "Alert notification: {}", message);
        Ok(())
    }
}

/// 分发统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
    /// 因级别不足而未转发的告警数
    pub skipped: usize,
}

/// 告警分发器
///
/// 只转发高级别告警；单个接收方失败只记录日志，不影响其他接收方。
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn dispatch(&self, alerts: &[Alert], recipients: &[String]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for alert in alerts {
            if alert.severity != AlertSeverity::High {
                summary.skipped += 1;
                continue;
            }

            let message = alert.message();
            for recipient in recipients {
                match self.notifier.send(recipient, &message).await {
                    Ok(()) => summary.delivered += 1,
                    Err(e) => {
                        warn!(
                            recipient_id = %recipient,
                            target_id = %alert.target_id,
                            "Failed to deliver {} alert: {}",
                            alert.kind,
                            e
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        summary
    }
}
