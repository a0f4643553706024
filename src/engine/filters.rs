//! # 软件滤波
//!
//! LCR 读数的软滤波：重复采样直到最近几个读数足够稳定。
//!
//! ## 依赖关系
//! - 被 `engine/roles.rs` 的 LCR 读取使用

use crate::error::Result;

/// 样本标准差 (ddof=1) 与均值之比是否小于阈值
///
/// 均值带符号，负均值时比值为负，总能通过。
pub fn std_mean_filter(values: &[f64], threshold: f64) -> bool {
    if values.len() < 2 {
        return false;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let ratio = variance.sqrt() / mean;
    ratio < threshold
}

/// 滤波参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    /// 最大采样次数
    pub maximum: usize,
    pub threshold: f64,
    /// 参与判断的最近读数个数
    pub size: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            maximum: 64,
            threshold: 0.005,
            size: 2,
        }
    }
}

/// 重复读取 `(primary, secondary)` 直到最近 `size` 个主读数通过滤波
///
/// 达到最大次数时给出警告并返回最后一次读数。
pub fn acquire_filtered<F>(mut read: F, options: FilterOptions) -> Result<(f64, f64)>
where
    F: FnMut() -> Result<(f64, f64)>,
{
    let mut samples: Vec<f64> = Vec::with_capacity(options.size + 1);
    let mut last = (0.0, 0.0);
    for _ in 0..options.maximum {
        last = read()?;
        samples.push(last.0);
        if samples.len() > options.size {
            samples.remove(0);
        }
        if samples.len() >= options.size && std_mean_filter(&samples, options.threshold) {
            return Ok(last);
        }
    }
    tracing::warn!("maximum sample count reached: {}", options.maximum);
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PqcError;

    #[test]
    fn test_std_mean_filter() {
        assert!(std_mean_filter(&[0.250, 0.249], 0.005));
        assert!(!std_mean_filter(&[0.250, 0.249], 0.0005));
        assert!(!std_mean_filter(&[0.250], 0.005));
        assert!(!std_mean_filter(&[0.0, 0.0], 0.005));
        assert!(std_mean_filter(&[-0.250, -0.100], 0.005));
    }

    #[test]
    fn test_acquire_stops_when_stable() {
        let readings = [1.0, 2.0, 2.001, 5.0];
        let mut index = 0;
        let result = acquire_filtered(
            || {
                let value = readings[index];
                index += 1;
                Ok((value, value * 10.0))
            },
            FilterOptions::default(),
        )
        .unwrap();
        assert_eq!(result, (2.001, 20.01));
        assert_eq!(index, 3);
    }

    #[test]
    fn test_acquire_gives_up_after_maximum() {
        let mut count = 0;
        let options = FilterOptions {
            maximum: 5,
            ..FilterOptions::default()
        };
        let result = acquire_filtered(
            || {
                count += 1;
                Ok((count as f64, 0.0))
            },
            options,
        )
        .unwrap();
        assert_eq!(count, 5);
        assert_eq!(result, (5.0, 0.0));
    }

    #[test]
    fn test_acquire_propagates_errors() {
        let result = acquire_filtered(
            || Err(PqcError::Timeout {
                role: "lcr".to_string(),
                message: "no reading".to_string(),
            }),
            FilterOptions::default(),
        );
        assert!(result.unwrap_err().is_timeout());
    }
}
