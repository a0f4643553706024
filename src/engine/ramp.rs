//! # 线性扫描
//!
//! 生成 [begin, end] 区间内等步长的扫描点。
//!
//! ## 规则
//! - 步长方向自动指向终点
//! - 步长为 0 或起止点相同时为空
//! - 不足一步的最后一段截断到终点，最后一个值恒为终点
//!
//! - 步数超过 [`MAX_STEPS`] 时拒绝创建
//!
//! ## 依赖关系
//! - 被 `engine/measurements/`, `engine/roles.rs`, `engine/parameters.rs` 使用

use crate::error::{PqcError, Result};

/// 单次扫描允许的最大步数
pub const MAX_STEPS: usize = 1_000_000;

/// 数值比较的相对容差
const RELATIVE_TOLERANCE: f64 = 1e-9;

/// 保留 12 位有效数字，消除浮点累积误差
fn clean(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    format!("{:.11e}", value).parse().unwrap_or(value)
}

/// 线性扫描范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRange {
    pub begin: f64,
    pub end: f64,
    /// 已校正方向的步长
    pub step: f64,
}

impl LinearRange {
    pub fn new(begin: f64, end: f64, step: f64) -> Result<Self> {
        let step = if end >= begin { step.abs() } else { -step.abs() };
        let range = Self { begin, end, step };
        if range.len() > MAX_STEPS {
            return Err(PqcError::InvalidArgument(format!(
                "ramp from {} to {} with step {} exceeds {} steps",
                begin, end, step, MAX_STEPS
            )));
        }
        Ok(range)
    }

    /// 起止距离
    pub fn distance(&self) -> f64 {
        (self.end - self.begin).abs()
    }

    /// 步数（扫描点数为步数 + 1）
    pub fn len(&self) -> usize {
        let distance = self.distance();
        if self.step == 0.0 || distance == 0.0 || !distance.is_finite() {
            return 0;
        }
        let ratio = distance / self.step.abs();
        let nearest = ratio.round();
        if (ratio - nearest).abs() <= RELATIVE_TOLERANCE * nearest.max(1.0) {
            nearest as usize
        } else {
            ratio.ceil() as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 扫描点迭代器
    pub fn iter(&self) -> impl Iterator<Item = f64> {
        let range = *self;
        let count = self.len();
        let ascending = self.end >= self.begin;
        (0..=count).filter(move |_| count > 0).map(move |i| {
            if i == count {
                return range.end;
            }
            let value = clean(range.begin + i as f64 * range.step);
            if ascending {
                value.min(range.end)
            } else {
                value.max(range.end)
            }
        })
    }
}

impl IntoIterator for &LinearRange {
    type Item = f64;
    type IntoIter = Box<dyn Iterator<Item = f64>>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(begin: f64, end: f64, step: f64) -> Vec<f64> {
        LinearRange::new(begin, end, step).unwrap().iter().collect()
    }

    #[test]
    fn test_empty_ranges() {
        assert!(values(0.0, 0.0, 0.0).is_empty());
        assert!(values(0.0, 1.0, 0.0).is_empty());
        assert!(values(1.0, 1.0, 1.0).is_empty());
        assert!(values(-5.0, -5.0, 2.5).is_empty());
        assert!(LinearRange::new(5.0, 0.0, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_unit_steps() {
        assert_eq!(values(0.0, 1.0, 1.0), vec![0.0, 1.0]);
        assert_eq!(values(1.0, 0.0, 1.0), vec![1.0, 0.0]);
        assert_eq!(values(0.0, -1.0, 1.0), vec![0.0, -1.0]);
        assert_eq!(values(0.0, 1.0, -1.0), vec![0.0, 1.0]);
        assert_eq!(values(-1.0, 0.0, -1.0), vec![-1.0, 0.0]);
    }

    #[test]
    fn test_limited_step() {
        assert_eq!(values(0.0, 1.0, 2.0), vec![0.0, 1.0]);
        assert_eq!(values(0.0, 1.0, 5.0), vec![0.0, 1.0]);
        assert_eq!(values(1.0, 0.0, 5.0), vec![1.0, 0.0]);
    }

    #[test]
    fn test_fractional_steps() {
        assert_eq!(values(0.0, 5.0, 2.5), vec![0.0, 2.5, 5.0]);
        assert_eq!(values(5.0, 0.0, 2.5), vec![5.0, 2.5, 0.0]);
        assert_eq!(values(0.0, -5.0, 2.5), vec![0.0, -2.5, -5.0]);
        assert_eq!(values(-5.0, 0.0, -2.5), vec![-5.0, -2.5, 0.0]);
        assert_eq!(values(-2.5, 2.5, -2.5), vec![-2.5, 0.0, 2.5]);
        assert_eq!(values(2.5, -2.5, 2.5), vec![2.5, 0.0, -2.5]);
        assert_eq!(values(0.0, 10.0, 2.5), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_extreme_scales() {
        assert_eq!(values(-2.5e-12, 2.5e-12, 2.5e-12), vec![-2.5e-12, 0.0, 2.5e-12]);
        assert_eq!(values(2.5e-24, -2.5e-24, -2.5e-24), vec![2.5e-24, 0.0, -2.5e-24]);
        assert_eq!(values(-2.5e24, 2.5e24, -2.5e24), vec![-2.5e24, 0.0, 2.5e24]);
    }

    #[test]
    fn test_incomplete_last_step_ends_at_end() {
        assert_eq!(values(0.0, 1.0, 0.3), vec![0.0, 0.3, 0.6, 0.9, 1.0]);
        assert_eq!(values(0.0, 0.3, 0.1), vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(LinearRange::new(0.0, 1.0, 0.3).unwrap().len(), 4);
    }

    #[test]
    fn test_step_direction_is_corrected() {
        let range = LinearRange::new(0.0, -10.0, 5.0).unwrap();
        assert_eq!(range.step, -5.0);
        assert_eq!(range.len(), 2);
        assert_eq!(range.distance(), 10.0);
    }

    #[test]
    fn test_tiny_step_is_rejected() {
        let err = LinearRange::new(0.0, -1000.0, 1e-300).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        assert!(LinearRange::new(0.0, 1.0, 1e-6).is_ok());
        assert!(LinearRange::new(0.0, 1.0, 1e-7).is_err());
    }
}
