//! # 剩余时间估计
//!
//! 根据已完成步骤的平均耗时估算扫描剩余时间。
//!
//! ## 依赖关系
//! - 被 `engine/measurements/` 的扫描循环使用
//! - 使用 `utils/format.rs` 的 format_duration

use crate::utils::format::format_duration;

use std::time::{Duration, Instant};

/// 扫描进度与耗时估计
#[derive(Debug, Clone)]
pub struct Estimate {
    count: usize,
    start: Instant,
    prev: Instant,
    deltas: Vec<Duration>,
}

impl Estimate {
    pub fn new(count: usize) -> Self {
        let now = Instant::now();
        Self {
            count,
            start: now,
            prev: now,
            deltas: Vec::new(),
        }
    }

    /// 重新开始计时
    pub fn reset(&mut self, count: usize) {
        *self = Self::new(count);
    }

    /// 记录一步完成
    pub fn advance(&mut self) {
        let now = Instant::now();
        self.deltas.push(now - self.prev);
        self.prev = now;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn passed(&self) -> usize {
        self.deltas.len()
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.passed(), self.count)
    }

    /// 单步平均耗时
    pub fn average(&self) -> Duration {
        let total: Duration = self.deltas.iter().sum();
        total / self.deltas.len().max(1) as u32
    }

    pub fn elapsed(&self) -> Duration {
        self.prev - self.start
    }

    pub fn remaining(&self) -> Duration {
        let expected = self.average() * self.count as u32;
        expected.saturating_sub(self.elapsed())
    }
}

/// 格式化为 `Elapsed H:MM:SS | Remaining H:MM:SS | Average H:MM:SS`
pub fn format_estimate(est: &Estimate) -> String {
    format!(
        "Elapsed {} | Remaining {} | Average {}",
        format_duration(est.elapsed().as_secs_f64()),
        format_duration(est.remaining().as_secs_f64()),
        format_duration(est.average().as_secs_f64())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts_steps() {
        let mut est = Estimate::new(3);
        assert_eq!(est.progress(), (0, 3));
        est.advance();
        est.advance();
        assert_eq!(est.passed(), 2);
        assert_eq!(est.progress(), (2, 3));
        est.reset(5);
        assert_eq!(est.progress(), (0, 5));
    }

    #[test]
    fn test_empty_estimate() {
        let est = Estimate::new(0);
        assert_eq!(est.average(), Duration::ZERO);
        assert_eq!(est.remaining(), Duration::ZERO);
        assert_eq!(
            format_estimate(&est),
            "Elapsed 0:00:00 | Remaining 0:00:00 | Average 0:00:00"
        );
    }

    #[test]
    fn test_remaining_not_negative() {
        let mut est = Estimate::new(1);
        est.advance();
        est.advance();
        assert!(est.remaining() <= est.average());
    }
}
