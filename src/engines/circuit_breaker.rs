// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::utils::clock::Clock;

/// 熔断器状态枚举
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// 关闭状态，请求正常放行
    Closed,
    /// 打开状态，所有出站请求暂停
    Open,
    /// 半开状态，打开期已过，等待下一次响应决定关闭或重新打开
    HalfOpen,
}

/// 熔断器状态
#[derive(Clone, Debug)]
struct CircuitState {
    status: Status,
    open_until: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    total_opens: u64,
}

/// 熔断器状态快照
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitStatus {
    pub status: Status,
    pub open_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_opens: u64,
}

impl CircuitStatus {
    pub fn is_open(&self) -> bool {
        self.status == Status::Open
    }
}

/// 熔断器
///
/// 进程内唯一的全局暂停开关，由防检测守卫持有并修改；
/// 其他组件只读取状态或等待其关闭。
pub struct CircuitBreaker {
    state: Mutex<CircuitState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        gauge!("adpulse_circuit_open").set(0.0);
        Self {
            state: Mutex::new(CircuitState {
                status: Status::Closed,
                open_until: None,
                consecutive_failures: 0,
                total_opens: 0,
            }),
            clock,
        }
    }

    /// 获取当前状态
    ///
    /// 打开期已过时转为半开
    pub fn status(&self) -> CircuitStatus {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.status == Status::Open && state.open_until.map_or(true, |until| now >= until) {
            state.status = Status::HalfOpen;
            gauge!("adpulse_circuit_open").set(0.5);
        }
        CircuitStatus {
            status: state.status,
            open_until: state.open_until,
            consecutive_failures: state.consecutive_failures,
            total_opens: state.total_opens,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    /// 距离关闭的剩余时间，未打开时返回 `None`
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.state.lock();
        match (state.status, state.open_until) {
            (Status::Open, Some(until)) if now < until => {
                until.signed_duration_since(now).to_std().ok()
            }
            _ => None,
        }
    }

    /// 打开熔断器
    ///
    /// 已处于打开状态时只会延长，不会缩短打开期。
    ///
    /// # 参数
    ///
    /// * `duration` - 打开时长
    ///
    /// # 返回值
    ///
    /// 新的关闭时间
    pub fn trip(&self, duration: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        let candidate = now
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut state = self.state.lock();
        let until = match (state.status, state.open_until) {
            (Status::Open, Some(existing)) if existing > candidate => existing,
            _ => candidate,
        };
        state.status = Status::Open;
        state.open_until = Some(until);
        state.consecutive_failures += 1;
        state.total_opens += 1;

        counter!("adpulse_circuit_opens_total").increment(1);
        gauge!("adpulse_circuit_open").set(1.0);
        warn!(
            consecutive_failures = state.consecutive_failures,
            "Circuit opened until {}",
            until
        );
        until
    }

    /// 记录一次成功响应，关闭熔断器并清零失败计数
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.status != Status::Closed || state.consecutive_failures > 0 {
            info!(
                previous_failures = state.consecutive_failures,
                "Circuit closed after successful response"
            );
            Self::close(&mut state);
        }
    }

    /// 人工干预入口：清空失败计数并关闭熔断器
    pub fn reset(&self) {
        let mut state = self.state.lock();
        Self::close(&mut state);
        info!("Circuit manually reset");
    }

    /// 挂起直到熔断器不再处于打开状态
    ///
    /// # 返回值
    ///
    /// 实际等待的总时长
    pub async fn wait_until_closed(&self) -> Duration {
        let mut waited = Duration::ZERO;
        while let Some(remaining) = self.remaining() {
            self.clock.sleep(remaining).await;
            waited += remaining;
        }
        waited
    }

    fn close(state: &mut CircuitState) {
        state.status = Status::Closed;
        state.open_until = None;
        state.consecutive_failures = 0;
        gauge!("adpulse_circuit_open").set(0.0);
    }
}
