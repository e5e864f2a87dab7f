// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// 时钟抽象
///
/// 所有读取当前时间或需要等待的组件都通过该特质访问时间，
/// 测试中可以替换为 [`ManualClock`]，避免真实的墙钟等待。
#[async_trait]
pub trait Clock: Send + Sync {
    /// 当前时间
    fn now(&self) -> DateTime<Utc>;

    /// 挂起指定时长
    async fn sleep(&self, duration: Duration);
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// 手动时钟
///
/// `sleep` 不会真正等待，而是立即把虚拟时间向前推进。
/// 所有调用过的睡眠时长都会被记录下来，便于断言退避行为。
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// 将虚拟时间向前推进
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::milliseconds(duration.as_millis() as i64);
    }

    /// 直接设置虚拟时间
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    /// 已记录的睡眠时长
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// 累计睡眠时长
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        // Let sibling jobs observe the new time before this one resumes.
        tokio::task::yield_now().await;
    }
}
