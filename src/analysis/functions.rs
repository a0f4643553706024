//! # 分析函数实现
//!
//! 每个函数接收测量序列，返回按名称索引的结果值。
//!
//! ## 函数
//! - `iv`: 最大电压、最大电流、600 V / 800 V 处电流
//! - `cv`: 1/C² 两段直线拟合求全耗尽电压
//! - `van_der_pauw`: 方块电阻
//! - `linear_fit`: V-I 直线拟合
//! - `capacitor`: 平均/中位电容与平均电阻
//!
//! ## 依赖关系
//! - 被 `analysis/mod.rs` 分发调用
//! - 使用 `analysis/fit.rs`

use super::fit::{finite_pairs, linear_regression, sum_squared_residuals, LinearFit};
use super::{AnalysisInput, AnalysisResult};
use crate::error::{PqcError, Result};

use std::f64::consts::{LN_2, PI};

fn require<'a>(series: Option<&'a [f64]>, key: &str, function: &str) -> Result<&'a [f64]> {
    series.ok_or_else(|| PqcError::Analysis(format!("Missing input {:?} for {}", key, function)))
}

/// 按 |x| 线性插值，超出范围时为 NaN
fn interpolate_abs(points: &[(f64, f64)], x: f64) -> f64 {
    let mut sorted: Vec<(f64, f64)> = points.iter().map(|(px, py)| (px.abs(), py.abs())).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    for pair in sorted.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x0 <= x && x <= x1 {
            if x1 == x0 {
                return y0;
            }
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    match sorted.as_slice() {
        [(x0, y0)] if *x0 == x => *y0,
        _ => f64::NAN,
    }
}

pub fn iv(input: &AnalysisInput) -> Result<AnalysisResult> {
    let i = require(input.i, "i", "iv")?;
    let points = finite_pairs(input.v, i);

    let v_max = points.iter().map(|(v, _)| v.abs()).fold(f64::NAN, f64::max);
    let i_max = points.iter().map(|(_, i)| i.abs()).fold(f64::NAN, f64::max);

    let mut result = AnalysisResult::new("iv");
    result.set("v_max", v_max);
    result.set("i_max", i_max);
    result.set("i_600", interpolate_abs(&points, 600.0));
    result.set("i_800", interpolate_abs(&points, 800.0));
    Ok(result)
}

pub fn cv(input: &AnalysisInput) -> Result<AnalysisResult> {
    let c = require(input.c, "c", "cv")?;
    let mut points: Vec<(f64, f64)> = finite_pairs(input.v, c)
        .into_iter()
        .filter(|(_, c)| *c != 0.0)
        .map(|(v, c)| (v.abs(), 1.0 / (c * c)))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut best: Option<(f64, LinearFit, LinearFit)> = None;
    for split in 2..=points.len().saturating_sub(2) {
        let (rise, plateau) = points.split_at(split);
        let (Some(rise_fit), Some(const_fit)) = (linear_regression(rise), linear_regression(plateau)) else {
            continue;
        };
        let error = sum_squared_residuals(rise, &rise_fit) + sum_squared_residuals(plateau, &const_fit);
        if best.as_ref().map_or(true, |(e, _, _)| error < *e) {
            best = Some((error, rise_fit, const_fit));
        }
    }

    let mut result = AnalysisResult::new("cv");
    match best {
        Some((_, rise, plateau)) if rise.a != plateau.a => {
            let v_fd = (plateau.b - rise.b) / (rise.a - plateau.a);
            let y_fd = plateau.eval(v_fd);
            let c_fd = if y_fd > 0.0 { 1.0 / y_fd.sqrt() } else { f64::NAN };
            result.set("v_fd", v_fd);
            result.set("c_fd", c_fd);
            result.set("a_rise", rise.a);
            result.set("b_rise", rise.b);
            result.set("a_const", plateau.a);
            result.set("b_const", plateau.b);
        }
        _ => {
            for key in ["v_fd", "c_fd", "a_rise", "b_rise", "a_const", "b_const"] {
                result.set(key, f64::NAN);
            }
        }
    }
    Ok(result)
}

fn fit_voltage_over_current(input: &AnalysisInput, function: &str) -> Result<(LinearFit, Vec<f64>)> {
    let i = require(input.i, "i", function)?;
    let points = finite_pairs(i, input.v);
    let fit = linear_regression(&points).unwrap_or(LinearFit {
        a: f64::NAN,
        b: f64::NAN,
        r_value: f64::NAN,
    });
    let x_min = points.iter().map(|(x, _)| *x).fold(f64::NAN, f64::min);
    let x_max = points.iter().map(|(x, _)| *x).fold(f64::NAN, f64::max);
    let x_fit = if x_min.is_finite() { vec![x_min, x_max] } else { Vec::new() };
    Ok((fit, x_fit))
}

pub fn van_der_pauw(input: &AnalysisInput) -> Result<AnalysisResult> {
    let (fit, x_fit) = fit_voltage_over_current(input, "van_der_pauw")?;
    let mut result = AnalysisResult::new("van_der_pauw");
    result.set("r_sheet", PI / LN_2 * fit.a);
    result.set("a", fit.a);
    result.set("b", fit.b);
    result.set("r_value", fit.r_value);
    result.set_series("x_fit", x_fit);
    Ok(result)
}

pub fn linear_fit(input: &AnalysisInput) -> Result<AnalysisResult> {
    let (fit, x_fit) = fit_voltage_over_current(input, "linear_fit")?;
    let mut result = AnalysisResult::new("linear_fit");
    result.set("a", fit.a);
    result.set("b", fit.b);
    result.set("r_value", fit.r_value);
    result.set_series("x_fit", x_fit);
    Ok(result)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn capacitor(input: &AnalysisInput) -> Result<AnalysisResult> {
    let c: Vec<f64> = require(input.c, "c", "capacitor")?
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    let r: Vec<f64> = input
        .r
        .unwrap_or(&[])
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();

    let mut result = AnalysisResult::new("capacitor");
    result.set("c_mean", mean(&c));
    result.set("c_median", median(&c));
    result.set("r_mean", mean(&r));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::sim::DeviceModel;

    #[test]
    fn test_iv_interpolation() {
        let v = [0.0, -200.0, -400.0, -600.0, -700.0];
        let i = [0.0, -1e-9, -2e-9, -3e-9, -4e-9];
        let result = iv(&AnalysisInput::iv(&i, &v)).unwrap();
        assert_eq!(result.scalar("v_max"), Some(700.0));
        assert_eq!(result.scalar("i_max"), Some(4e-9));
        assert!((result.scalar("i_600").unwrap() - 3e-9).abs() < 1e-18);
        assert!(result.scalar("i_800").unwrap().is_nan());
    }

    #[test]
    fn test_cv_full_depletion() {
        let model = DeviceModel::default();
        let v: Vec<f64> = (0..=50).map(|k| -10.0 * k as f64).collect();
        let c: Vec<f64> = v.iter().map(|v| model.capacitance(*v)).collect();
        let result = cv(&AnalysisInput::cv(&c, &v)).unwrap();
        let v_fd = result.scalar("v_fd").unwrap();
        assert!((v_fd - 250.0).abs() < 1e-3, "v_fd = {}", v_fd);
        let c_fd = result.scalar("c_fd").unwrap();
        assert!((c_fd - model.capacitance(-300.0)).abs() / c_fd < 1e-6);
    }

    #[test]
    fn test_cv_too_few_points() {
        let result = cv(&AnalysisInput::cv(&[1e-12, 2e-12], &[0.0, -1.0])).unwrap();
        assert!(result.scalar("v_fd").unwrap().is_nan());
    }

    #[test]
    fn test_van_der_pauw() {
        let i = [-1e-3, 0.0, 1e-3];
        let v: Vec<f64> = i.iter().map(|i| i * 100.0).collect();
        let result = van_der_pauw(&AnalysisInput::iv(&i, &v)).unwrap();
        assert!((result.scalar("r_sheet").unwrap() - PI / LN_2 * 100.0).abs() < 1e-9);
        assert_eq!(result.series("x_fit"), Some(&[-1e-3, 1e-3][..]));
    }

    #[test]
    fn test_capacitor() {
        let c = [1.0, 3.0, 2.0, f64::NAN];
        let result = capacitor(&AnalysisInput::cv(&c, &[0.0; 4])).unwrap();
        assert_eq!(result.scalar("c_mean"), Some(2.0));
        assert_eq!(result.scalar("c_median"), Some(2.0));
        assert!(result.scalar("r_mean").unwrap().is_nan());
    }

    #[test]
    fn test_missing_input() {
        let err = iv(&AnalysisInput::cv(&[1.0], &[1.0])).unwrap_err();
        assert!(err.is_analysis());
    }
}
