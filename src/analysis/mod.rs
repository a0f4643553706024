//! # 分析模块
//!
//! 测量完成后运行的分析函数及其限值校验。
//!
//! ## 功能
//! - 解析分析函数配置（字符串或 `{type, parameters, limits}` 映射）
//! - 按名称分发到具体函数
//! - 限值校验：NaN、低于最小值、高于最大值均判为失败
//! - 从导出数据中按测量类型取出分析输入
//!
//! ## 依赖关系
//! - 被 `engine/roles.rs`, `commands/analyze.rs` 使用
//! - 子模块: fit, functions

pub mod fit;
pub mod functions;

use crate::error::{PqcError, Result};
use crate::models::parameter::ParameterValue;
use crate::models::MeasurementData;

use indexmap::IndexMap;
use serde_json::{json, Value};

/// 可用的分析函数
pub const FUNCTION_NAMES: [&str; 5] = ["iv", "cv", "van_der_pauw", "linear_fit", "capacitor"];

// ─────────────────────────────────────────────────────────────
// 输入与结果
// ─────────────────────────────────────────────────────────────

/// 分析输入序列
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub v: &'a [f64],
    pub i: Option<&'a [f64]>,
    pub c: Option<&'a [f64]>,
    pub r: Option<&'a [f64]>,
}

impl<'a> AnalysisInput<'a> {
    pub fn iv(i: &'a [f64], v: &'a [f64]) -> Self {
        Self { v, i: Some(i), c: None, r: None }
    }

    pub fn cv(c: &'a [f64], v: &'a [f64]) -> Self {
        Self { v, i: None, c: Some(c), r: None }
    }

    pub fn with_resistance(mut self, r: &'a [f64]) -> Self {
        self.r = Some(r);
        self
    }

    /// 电流或电容序列与电压序列都多于一个点
    pub fn is_sufficient(&self) -> bool {
        let other = self.i.or(self.c).map(|s| s.len()).unwrap_or(0);
        other > 1 && self.v.len() > 1
    }
}

/// 结果值
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Scalar(f64),
    Series(Vec<f64>),
}

/// 单个分析函数的结果
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub name: String,
    pub values: IndexMap<String, ResultValue>,
}

impl AnalysisResult {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: IndexMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), ResultValue::Scalar(value));
    }

    pub fn set_series(&mut self, key: &str, values: Vec<f64>) {
        self.values.insert(key.to_string(), ResultValue::Series(values));
    }

    pub fn scalar(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ResultValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn series(&self, key: &str) -> Option<&[f64]> {
        match self.values.get(key) {
            Some(ResultValue::Series(v)) => Some(v),
            _ => None,
        }
    }

    /// 转为 JSON，NaN 写为 `null`
    pub fn to_json(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    ResultValue::Scalar(x) => json!(x),
                    ResultValue::Series(xs) => json!(xs),
                };
                (k.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

// ─────────────────────────────────────────────────────────────
// 函数配置
// ─────────────────────────────────────────────────────────────

/// 限值（NaN 边界视为未设置）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Limit {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

fn limit_bound(value: Option<&ParameterValue>) -> Option<f64> {
    let bound = match value? {
        ParameterValue::Quantity(q) => q.to_base(),
        other => other.as_f64()?,
    };
    (!bound.is_nan()).then_some(bound)
}

/// 分析函数配置
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFunction {
    pub kind: String,
    pub parameters: IndexMap<String, ParameterValue>,
    pub limits: IndexMap<String, Limit>,
}

impl AnalysisFunction {
    /// 由参数 `analysis_functions` 的单项构造
    pub fn from_config(config: &ParameterValue) -> Result<Self> {
        match config {
            ParameterValue::Text(kind) => Ok(Self {
                kind: kind.clone(),
                parameters: IndexMap::new(),
                limits: IndexMap::new(),
            }),
            ParameterValue::Map(map) => {
                let kind = match map.get("type") {
                    Some(ParameterValue::Text(kind)) => kind.clone(),
                    Some(other) => other.to_string(),
                    None => return Err(PqcError::ConfigError("Missing analysis key: type".to_string())),
                };
                let parameters = match map.get("parameters") {
                    Some(ParameterValue::Map(p)) => p.clone(),
                    _ => IndexMap::new(),
                };
                let mut limits = IndexMap::new();
                if let Some(ParameterValue::Map(entries)) = map.get("limits") {
                    for (key, entry) in entries {
                        let limit = match entry {
                            ParameterValue::Map(bounds) => Limit {
                                minimum: limit_bound(bounds.get("minimum")),
                                maximum: limit_bound(bounds.get("maximum")),
                            },
                            _ => Limit::default(),
                        };
                        limits.insert(key.clone(), limit);
                    }
                }
                Ok(Self { kind, parameters, limits })
            }
            other => Err(PqcError::ConfigError(format!(
                "Invalid analysis function config: {}",
                other
            ))),
        }
    }

    /// 解析命令行参数：函数名或内联 YAML 映射
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        Self::from_config(&ParameterValue::from_yaml(&value, false))
    }

    /// 运行分析函数
    pub fn call(&self, input: &AnalysisInput) -> Result<AnalysisResult> {
        tracing::info!("Running analysis function {:?}...", self.kind);
        let result = match self.kind.as_str() {
            "iv" => functions::iv(input),
            "cv" => functions::cv(input),
            "van_der_pauw" => functions::van_der_pauw(input),
            "linear_fit" => functions::linear_fit(input),
            "capacitor" => functions::capacitor(input),
            other => Err(PqcError::ConfigError(format!("No such analysis function: {}", other))),
        }?;
        tracing::info!("Running analysis function {:?}... done.", self.kind);
        Ok(result)
    }

    /// 校验限值
    pub fn verify(&self, result: &AnalysisResult) -> Result<()> {
        for (key, limit) in &self.limits {
            let Some(value) = result.scalar(key) else {
                tracing::warn!("No such limit: {} for {}", key, self.kind);
                continue;
            };
            let out_of_range = |detail: String| {
                PqcError::Analysis(format!("Out of range '{}' for {}: {}", key, self.kind, detail))
            };
            if value.is_nan() {
                return Err(out_of_range("nan".to_string()));
            }
            if let Some(minimum) = limit.minimum {
                if value < minimum {
                    return Err(out_of_range(format!("{} < {}", value, minimum)));
                }
            }
            if let Some(maximum) = limit.maximum {
                if value > maximum {
                    return Err(out_of_range(format!("{} > {}", value, maximum)));
                }
            }
        }
        Ok(())
    }
}

/// 解析函数配置列表
pub fn functions_from_configs(configs: &[ParameterValue]) -> Result<Vec<AnalysisFunction>> {
    configs.iter().map(AnalysisFunction::from_config).collect()
}

/// 依次运行所有函数，结果写入 `data.analysis`，全部完成后再校验限值
pub fn run_all(
    functions: &[AnalysisFunction],
    input: &AnalysisInput,
    data: &mut MeasurementData,
) -> Result<Vec<AnalysisResult>> {
    let mut results = Vec::with_capacity(functions.len());
    for function in functions {
        let result = function.call(input)?;
        tracing::info!("{}: {}", result.name, result.to_json());
        data.set_analysis(&result.name, result.to_json());
        results.push(result);
    }
    for (function, result) in functions.iter().zip(&results) {
        function.verify(result)?;
    }
    Ok(results)
}

// ─────────────────────────────────────────────────────────────
// 导出数据的分析输入
// ─────────────────────────────────────────────────────────────

/// 各测量类型的分析序列 `(电流或电容键, 电压键, 是否为 CV)`
pub fn input_series(measurement_type: &str) -> Option<(&'static str, &'static str, bool)> {
    let keys = match measurement_type {
        "iv_ramp" => ("current_hvsrc", "voltage", false),
        "iv_ramp_elm" => ("current_elm", "voltage", false),
        "iv_ramp_bias" => ("current_vsrc", "voltage", false),
        "iv_ramp_bias_elm" => ("current_elm", "voltage", false),
        "iv_ramp_4_wire" => ("current", "voltage_vsrc", false),
        "cv_ramp" => ("capacitance", "voltage_hvsrc", true),
        "cv_ramp_vsrc" => ("capacitance", "voltage_vsrc", true),
        "cv_ramp_alt" => ("capacitance", "voltage_lcr", true),
        _ => return None,
    };
    Some(keys)
}

/// 从测量数据构造分析输入
pub fn input_from_data(data: &MeasurementData) -> Result<AnalysisInput<'_>> {
    let kind = data
        .measurement_type()
        .ok_or_else(|| PqcError::InvalidArgument("missing meta 'measurement_type'".to_string()))?;
    let (y_key, v_key, is_cv) = input_series(kind)
        .ok_or_else(|| PqcError::UnknownMeasurementType(kind.to_string()))?;
    let y = data.get_series(y_key);
    let v = data.get_series(v_key);
    let input = if is_cv {
        AnalysisInput::cv(y, v).with_resistance(data.get_series("resistance"))
    } else {
        AnalysisInput::iv(y, v)
    };
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(yaml: &str) -> AnalysisFunction {
        AnalysisFunction::parse(yaml).unwrap()
    }

    #[test]
    fn test_config_forms() {
        let f = function("iv");
        assert_eq!(f.kind, "iv");
        assert!(f.limits.is_empty());

        let f = function("{type: iv, limits: {i_max: {maximum: 1.0e-6}, v_max: {minimum: .nan}}}");
        assert_eq!(f.limits["i_max"].maximum, Some(1e-6));
        assert_eq!(f.limits["v_max"].minimum, None);

        let err = AnalysisFunction::parse("{limits: {}}").unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: Missing analysis key: type");
    }

    #[test]
    fn test_unknown_function() {
        let v = [0.0, 1.0];
        let err = function("nope").call(&AnalysisInput::iv(&v, &v)).unwrap_err();
        assert!(err.to_string().contains("No such analysis function: nope"));
    }

    #[test]
    fn test_verify_limits() {
        let f = function("{type: iv, limits: {i_max: {minimum: 0, maximum: 1.0e-6}, missing: {maximum: 1}}}");
        let mut result = AnalysisResult::new("iv");
        result.set("i_max", 5e-7);
        assert!(f.verify(&result).is_ok());

        result.set("i_max", 2e-6);
        let err = f.verify(&result).unwrap_err();
        assert!(err.is_analysis());
        assert!(err.to_string().contains("Out of range 'i_max' for iv: 0.000002 > 0.000001"));

        result.set("i_max", f64::NAN);
        assert!(f.verify(&result).unwrap_err().to_string().ends_with("for iv: nan"));

        result.set("i_max", -1.0);
        assert!(f.verify(&result).unwrap_err().to_string().contains("-1 < 0"));
    }

    #[test]
    fn test_run_all_stores_results_before_verify() {
        let functions = vec![
            function("{type: iv, limits: {i_max: {maximum: 1.0e-12}}}"),
            function("linear_fit"),
        ];
        let i = [0.0, 1e-9, 2e-9];
        let v = [0.0, -10.0, -20.0];
        let mut data = MeasurementData::new();
        let err = run_all(&functions, &AnalysisInput::iv(&i, &v), &mut data).unwrap_err();
        assert!(err.is_analysis());
        assert!(data.analysis.contains_key("iv"));
        assert!(data.analysis.contains_key("linear_fit"));
        assert_eq!(data.analysis["iv"]["i_800"], Value::Null);
    }

    #[test]
    fn test_input_from_data() {
        let mut data = MeasurementData::new();
        data.set_meta("measurement_type", "cv_ramp");
        data.register_series("voltage_hvsrc").unwrap();
        data.register_series("capacitance").unwrap();
        data.append_series(&[("voltage_hvsrc", 0.0), ("capacitance", 1e-12)]).unwrap();
        let input = input_from_data(&data).unwrap();
        assert_eq!(input.c, Some(&[1e-12][..]));
        assert!(!input.is_sufficient());
    }

    #[test]
    fn test_input_from_bias_elm_data() {
        assert_eq!(input_series("iv_ramp_bias_elm"), Some(("current_elm", "voltage", false)));

        let mut data = MeasurementData::new();
        data.set_meta("measurement_type", "iv_ramp_bias_elm");
        data.register_series("voltage").unwrap();
        data.register_series("current_elm").unwrap();
        data.register_series("current_vsrc").unwrap();
        data.append_series(&[("voltage", -5.0), ("current_elm", 1e-9), ("current_vsrc", 2e-9)])
            .unwrap();
        let input = input_from_data(&data).unwrap();
        assert_eq!(input.i, Some(&[1e-9][..]));
        assert_eq!(input.v, &[-5.0][..]);
    }
}
