//! # 测量曲线图
//!
//! 使用 `plotters` 绘制单条 y-x 测量曲线，可叠加线性拟合。
//!
//! ## 功能
//! - PNG / SVG 输出（按扩展名选择）
//! - 反向扫描时可取 |x| 绘制
//! - 跳过 NaN 数据点
//!
//! ## 依赖关系
//! - 被 `engine/sequence.rs`, `commands/plot.rs` 调用
//! - 使用 `models/data.rs` 的 MeasurementData

use crate::error::{PqcError, Result};
use crate::models::MeasurementData;

use plotters::prelude::*;
use std::path::Path;

/// 线性拟合叠加线 `y = a * x + b`
#[derive(Debug, Clone, PartialEq)]
pub struct FitLine {
    pub a: f64,
    pub b: f64,
    pub x_fit: Vec<f64>,
}

/// 绘图选项
#[derive(Debug, Clone)]
pub struct PlotSpec {
    pub x: String,
    pub y: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub abs_x: bool,
    pub fit: Option<FitLine>,
}

impl PlotSpec {
    pub fn new(x: &str, y: &str) -> Self {
        Self {
            x: x.to_string(),
            y: y.to_string(),
            title: format!("{} vs {}", y, x),
            width: 1024,
            height: 640,
            abs_x: false,
            fit: None,
        }
    }
}

/// 每种测量类型的默认坐标轴
pub fn default_axes(measurement_type: &str) -> Option<(&'static str, &'static str)> {
    let axes = match measurement_type {
        "iv_ramp" => ("voltage", "current_hvsrc"),
        "iv_ramp_elm" => ("voltage", "current_elm"),
        "iv_ramp_bias" => ("voltage", "current_vsrc"),
        "iv_ramp_bias_elm" => ("voltage", "current_elm"),
        "iv_ramp_4_wire" => ("current", "voltage_vsrc"),
        "cv_ramp" => ("voltage_hvsrc", "capacitance"),
        "cv_ramp_vsrc" => ("voltage_vsrc", "capacitance"),
        "cv_ramp_alt" => ("voltage_lcr", "capacitance"),
        _ => return None,
    };
    Some(axes)
}

/// 提取有效数据点
fn collect_points(data: &MeasurementData, spec: &PlotSpec) -> Result<Vec<(f64, f64)>> {
    let missing = |key: &str| PqcError::InvalidArgument(format!("No such series: {}", key));
    let xs = data.series.get(&spec.x).ok_or_else(|| missing(&spec.x))?;
    let ys = data.series.get(&spec.y).ok_or_else(|| missing(&spec.y))?;
    Ok(xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (if spec.abs_x { x.abs() } else { *x }, *y))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect())
}

/// 坐标范围，两端各留 5% 边距
fn axis_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let span = max - min;
    if span == 0.0 {
        let pad = if min == 0.0 { 1.0 } else { min.abs() * 0.1 };
        return (min - pad, max + pad);
    }
    (min - span * 0.05, max + span * 0.05)
}

fn axis_label(data: &MeasurementData, key: &str) -> String {
    match data.series_units.get(key) {
        Some(unit) => format!("{} [{}]", key, unit),
        None => key.to_string(),
    }
}

/// 绘制曲线到文件（`.svg` 为矢量图，其余为 PNG）
pub fn plot_series(data: &MeasurementData, spec: &PlotSpec, output_path: &Path) -> Result<()> {
    let points = collect_points(data, spec)?;
    let use_svg = output_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("svg"))
        .unwrap_or(false);

    if use_svg {
        let root = SVGBackend::new(output_path, (spec.width, spec.height)).into_drawing_area();
        draw_chart(&root, data, spec, &points)?;
        root.present()
            .map_err(|e| PqcError::Other(e.to_string()))?;
    } else {
        let root = BitMapBackend::new(output_path, (spec.width, spec.height)).into_drawing_area();
        draw_chart(&root, data, spec, &points)?;
        root.present()
            .map_err(|e| PqcError::Other(e.to_string()))?;
    }
    Ok(())
}

fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    data: &MeasurementData,
    spec: &PlotSpec,
    points: &[(f64, f64)],
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)
        .map_err(|e| PqcError::Other(format!("{:?}", e)))?;

    let (x_min, x_max) = axis_range(points.iter().map(|(x, _)| *x));
    let (y_min, y_max) = axis_range(points.iter().map(|(_, y)| *y));

    let mut chart = ChartBuilder::on(root)
        .caption(&spec.title, ("sans-serif", 24).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| PqcError::Other(format!("{:?}", e)))?;

    chart
        .configure_mesh()
        .x_desc(axis_label(data, &spec.x))
        .y_desc(axis_label(data, &spec.y))
        .y_label_formatter(&|v| format!("{:.2e}", v))
        .x_label_style(("sans-serif", 14))
        .y_label_style(("sans-serif", 14))
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(|e| PqcError::Other(format!("{:?}", e)))?;

    let line_color = RGBColor(0, 102, 204);
    chart
        .draw_series(LineSeries::new(
            points.iter().copied(),
            line_color.stroke_width(2),
        ))
        .map_err(|e| PqcError::Other(format!("{:?}", e)))?;
    chart
        .draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 3, line_color.filled())),
        )
        .map_err(|e| PqcError::Other(format!("{:?}", e)))?;

    if let Some(fit) = &spec.fit {
        let fit_color = RGBColor(204, 51, 0);
        chart
            .draw_series(LineSeries::new(
                fit.x_fit.iter().map(|&x| (x, fit.a * x + fit.b)),
                fit_color.stroke_width(2),
            ))
            .map_err(|e| PqcError::Other(format!("{:?}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_range() {
        let close = |(a, b): (f64, f64), (c, d): (f64, f64)| (a - c).abs() < 1e-12 && (b - d).abs() < 1e-12;
        assert!(close(axis_range([0.0, 10.0].into_iter()), (-0.5, 10.5)));
        assert!(close(axis_range([2.0, 2.0].into_iter()), (1.8, 2.2)));
        assert_eq!(axis_range(std::iter::empty()), (0.0, 1.0));
    }

    #[test]
    fn test_collect_points_skips_nan_and_abs() {
        let mut data = MeasurementData::new();
        data.register_series("voltage").unwrap();
        data.register_series("current").unwrap();
        data.append_series(&[("voltage", -1.0), ("current", 1.0)]).unwrap();
        data.append_series(&[("voltage", -2.0), ("current", f64::NAN)]).unwrap();

        let mut spec = PlotSpec::new("voltage", "current");
        spec.abs_x = true;
        assert_eq!(collect_points(&data, &spec).unwrap(), vec![(1.0, 1.0)]);

        let spec = PlotSpec::new("voltage", "missing");
        assert!(collect_points(&data, &spec).is_err());
    }

    #[test]
    fn test_default_axes() {
        assert_eq!(default_axes("iv_ramp"), Some(("voltage", "current_hvsrc")));
        assert_eq!(default_axes("iv_ramp_bias_elm"), Some(("voltage", "current_elm")));
        assert_eq!(default_axes("frequency_scan"), None);
    }
}
