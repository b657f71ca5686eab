// 主记录 ID 生成
//
// ID 为创建时间的毫秒时间戳；时钟没有前进时取上一个值 + 1，保证进程内严格递增。

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct RecordIdGenerator {
    last: AtomicI64,
}

impl RecordIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp_millis()).to_string()
    }

    /// 以给定时间戳生成下一个 ID
    pub fn next_at(&self, now_ms: i64) -> i64 {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if now_ms > last { now_ms } else { last + 1 };
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// 两个 ID 之间经过的毫秒数
pub fn elapsed_ms(earlier: &str, later: &str) -> Option<i64> {
    Some(later.parse::<i64>().ok()? - earlier.parse::<i64>().ok()?)
}
