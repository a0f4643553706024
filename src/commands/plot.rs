//! # plot 命令实现
//!
//! 绘制导出的测量数据曲线。
//!
//! ## 依赖关系
//! - 使用 `cli/plot.rs` 定义的参数
//! - 使用 `export/plot.rs`, `parsers/data.rs`

use crate::cli::plot::PlotArgs;
use crate::error::{PqcError, Result};
use crate::export::plot::{default_axes, plot_series, FitLine, PlotSpec};
use crate::models::MeasurementData;
use crate::parsers::read_data_file;
use crate::utils::output;

/// 执行 plot 命令
pub fn execute(args: PlotArgs) -> Result<()> {
    let data = read_data_file(&args.file)?;
    let defaults = data.measurement_type().and_then(default_axes);

    let pick = |given: &Option<String>, fallback: Option<&str>, axis: &str| {
        given
            .clone()
            .or_else(|| fallback.map(str::to_string))
            .ok_or_else(|| {
                PqcError::InvalidArgument(format!(
                    "No {} series given and no default for this measurement type",
                    axis
                ))
            })
    };
    let x = pick(&args.x, defaults.map(|(x, _)| x), "x")?;
    let y = pick(&args.y, defaults.map(|(_, y)| y), "y")?;

    let output_path = args.output.clone().unwrap_or_else(|| args.file.with_extension("png"));

    let mut spec = PlotSpec::new(&x, &y);
    spec.width = args.width;
    spec.height = args.height;
    spec.abs_x = args.abs_x;
    if let Some(stem) = args.file.file_stem().and_then(|s| s.to_str()) {
        spec.title = stem.to_string();
    }
    if args.fit {
        spec.fit = Some(fit_line(&data)?);
    }

    plot_series(&data, &spec, &output_path)?;
    output::print_success(&format!("{} vs {} saved to '{}'", y, x, output_path.display()));
    Ok(())
}

/// 从 `analysis.linear_fit` 读取拟合线
pub fn fit_line(data: &MeasurementData) -> Result<FitLine> {
    let fit = data
        .analysis
        .get("linear_fit")
        .ok_or_else(|| PqcError::InvalidArgument("No linear_fit analysis result in data".to_string()))?;
    let scalar = |key: &str| {
        fit.get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| PqcError::InvalidArgument(format!("Invalid linear_fit value: {}", key)))
    };
    let x_fit = fit
        .get("x_fit")
        .and_then(|v| v.as_array())
        .map(|xs| xs.iter().filter_map(|x| x.as_f64()).collect())
        .unwrap_or_default();
    Ok(FitLine {
        a: scalar("a")?,
        b: scalar("b")?,
        x_fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fit_line() {
        let mut data = MeasurementData::new();
        assert!(fit_line(&data).is_err());

        data.set_analysis("linear_fit", json!({"a": 1500.0, "b": 0.5, "r_value": 1.0, "x_fit": [0.0, 1e-3]}));
        let fit = fit_line(&data).unwrap();
        assert_eq!(fit.a, 1500.0);
        assert_eq!(fit.b, 0.5);
        assert_eq!(fit.x_fit, vec![0.0, 1e-3]);
    }
}
