//! # 线性拟合
//!
//! 最小二乘直线拟合 `y = a * x + b`，附带相关系数。

/// 拟合结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub a: f64,
    pub b: f64,
    /// Pearson 相关系数
    pub r_value: f64,
}

impl LinearFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.a * x + self.b
    }
}

/// 有效（有限值）数据点
pub fn finite_pairs(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect()
}

/// 最小二乘拟合；少于两个点或 x 无变化时返回 `None`
pub fn linear_regression(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 {
        return None;
    }

    let a = sxy / sxx;
    let b = mean_y - a * mean_x;
    let r_value = if syy == 0.0 { 1.0 } else { sxy / (sxx * syy).sqrt() };
    Some(LinearFit { a, b, r_value })
}

/// 残差平方和
pub fn sum_squared_residuals(points: &[(f64, f64)], fit: &LinearFit) -> f64 {
    points.iter().map(|(x, y)| (y - fit.eval(*x)).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let points: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        let fit = linear_regression(&points).unwrap();
        assert!((fit.a - 2.0).abs() < 1e-12);
        assert!((fit.b - 1.0).abs() < 1e-12);
        assert!((fit.r_value - 1.0).abs() < 1e-12);
        assert_eq!(sum_squared_residuals(&points, &fit), 0.0);
    }

    #[test]
    fn test_negative_correlation() {
        let fit = linear_regression(&[(0.0, 1.0), (1.0, 0.0), (2.0, -1.0)]).unwrap();
        assert!((fit.r_value + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(linear_regression(&[(1.0, 1.0)]).is_none());
        assert!(linear_regression(&[(1.0, 1.0), (1.0, 2.0)]).is_none());
        assert_eq!(finite_pairs(&[1.0, f64::NAN], &[2.0, 3.0]), vec![(1.0, 2.0)]);
    }
}
