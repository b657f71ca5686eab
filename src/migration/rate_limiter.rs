// 调用节流 - 每 batch_size 步后暂停一次
//
// 一步可以是一次远程调用，也可以是一条记录。N 步产生 ceil(N / batch_size) - 1 次暂停。
// 结构级调用共用同一个限流器；字段迁移按记录计数，用 fresh() 得到独立计数的限流器。

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;
use tracing::debug;

use crate::models::MigrationSettings;

#[derive(Debug)]
pub struct RateLimiter {
    batch_size: usize,
    pause: Duration,
    calls: AtomicUsize,
    pauses: AtomicUsize,
}

impl RateLimiter {
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
            calls: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
        }
    }

    pub fn from_settings(settings: &MigrationSettings) -> Self {
        Self::new(settings.batch_size, Duration::from_millis(settings.pause_ms))
    }

    /// 相同批次和暂停时长，计数从零开始
    pub fn fresh(&self) -> Self {
        Self::new(self.batch_size, self.pause)
    }

    /// 每一步之前等待
    pub async fn tick(&self) {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n > 0 && n % self.batch_size == 0 {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            debug!("已执行 {} 步，暂停 {:?}", n, self.pause);
            tokio::time::sleep(self.pause).await;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_settings(&MigrationSettings::default())
    }
}
