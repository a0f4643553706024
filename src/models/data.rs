//! # 测量数据容器
//!
//! 单次测量产生的元数据、序列单位、数据序列与分析结果。
//! JSON 导出结构即为本结构体的序列化结果。
//!
//! ## 依赖关系
//! - 被 `engine/`, `export/`, `parsers/data.rs`, `analysis/` 使用
//! - 使用 `serde_json` 保存任意类型的元数据值

use crate::error::{PqcError, Result};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 数据序列：NaN 序列化为 `null`，读取时还原
mod nan_series {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        series: &IndexMap<String, Vec<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let converted: IndexMap<&String, Vec<Option<f64>>> = series
            .iter()
            .map(|(k, values)| {
                let values = values
                    .iter()
                    .map(|v| if v.is_finite() { Some(*v) } else { None })
                    .collect();
                (k, values)
            })
            .collect();
        converted.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<String, Vec<f64>>, D::Error> {
        let raw = IndexMap::<String, Vec<Option<f64>>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, values)| {
                let values = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                (k, values)
            })
            .collect())
    }
}

/// 测量数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementData {
    #[serde(default)]
    pub meta: IndexMap<String, Value>,
    #[serde(default)]
    pub series_units: IndexMap<String, String>,
    #[serde(default, with = "nan_series")]
    pub series: IndexMap<String, Vec<f64>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub analysis: IndexMap<String, Value>,
}

impl MeasurementData {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置元数据
    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        tracing::info!("Meta {}: {}", key, value);
        self.meta.insert(key.to_string(), value);
    }

    /// 读取字符串元数据
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }

    /// 设置序列单位
    pub fn set_series_unit(&mut self, key: &str, unit: &str) {
        self.series_units.insert(key.to_string(), unit.to_string());
    }

    /// 注册新序列，已存在时报错
    pub fn register_series(&mut self, key: &str) -> Result<()> {
        if self.series.contains_key(key) {
            return Err(PqcError::DuplicateSeries(key.to_string()));
        }
        self.series.insert(key.to_string(), Vec::new());
        Ok(())
    }

    /// 追加一行数据，键集合必须与已注册序列完全一致
    pub fn append_series(&mut self, row: &[(&str, f64)]) -> Result<()> {
        let mut expected: Vec<&str> = self.series.keys().map(|k| k.as_str()).collect();
        let mut found: Vec<&str> = row.iter().map(|(k, _)| *k).collect();
        expected.sort_unstable();
        found.sort_unstable();
        if expected != found {
            return Err(PqcError::InconsistentSeries {
                expected: expected.join(", "),
                found: found.join(", "),
            });
        }
        for (key, value) in row {
            if let Some(values) = self.series.get_mut(*key) {
                values.push(*value);
            }
        }
        Ok(())
    }

    /// 读取序列，不存在时为空
    pub fn get_series(&self, key: &str) -> &[f64] {
        self.series.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// 设置分析结果
    pub fn set_analysis(&mut self, key: &str, value: Value) {
        self.analysis.insert(key.to_string(), value);
    }

    /// 行数（以第一列为准）
    pub fn row_count(&self) -> usize {
        self.series.values().next().map(|v| v.len()).unwrap_or(0)
    }

    /// 测量类型（元数据 `measurement_type`）
    pub fn measurement_type(&self) -> Option<&str> {
        self.meta_str("measurement_type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_data() -> MeasurementData {
        let mut data = MeasurementData::new();
        data.set_meta("sample_name", "HPK_VPX");
        data.set_meta("measurement_tags", json!(["iv", "diode"]));
        data.set_series_unit("voltage", "V");
        data.set_series_unit("current", "A");
        data.register_series("voltage").unwrap();
        data.register_series("current").unwrap();
        data
    }

    #[test]
    fn test_register_and_append() {
        let mut data = sample_data();
        assert!(matches!(
            data.register_series("voltage"),
            Err(PqcError::DuplicateSeries(_))
        ));
        data.append_series(&[("voltage", 1.0), ("current", 1e-9)]).unwrap();
        data.append_series(&[("current", 2e-9), ("voltage", 2.0)]).unwrap();
        assert_eq!(data.get_series("voltage"), &[1.0, 2.0]);
        assert_eq!(data.get_series("current"), &[1e-9, 2e-9]);
        assert_eq!(data.row_count(), 2);
        assert!(data.get_series("missing").is_empty());
    }

    #[test]
    fn test_inconsistent_series_keys() {
        let mut data = sample_data();
        let err = data.append_series(&[("voltage", 1.0)]).unwrap_err();
        assert!(err.to_string().contains("Inconsistent series keys"));
        let err = data
            .append_series(&[("voltage", 1.0), ("current", 1.0), ("extra", 0.0)])
            .unwrap_err();
        assert!(matches!(err, PqcError::InconsistentSeries { .. }));
        assert_eq!(data.row_count(), 0);
    }

    #[test]
    fn test_json_layout() {
        let mut data = sample_data();
        data.append_series(&[("voltage", 1.0), ("current", f64::NAN)]).unwrap();
        let text = serde_json::to_string(&data).unwrap();
        assert!(text.starts_with(r#"{"meta":{"sample_name":"HPK_VPX""#));
        assert!(text.contains(r#""series_units":{"voltage":"V","current":"A"}"#));
        assert!(text.contains(r#""current":[null]"#));
        assert!(!text.contains("analysis"));

        let parsed: MeasurementData = serde_json::from_str(&text).unwrap();
        assert!(parsed.get_series("current")[0].is_nan());
        assert_eq!(parsed.get_series("voltage"), &[1.0]);
    }

    #[test]
    fn test_analysis_is_serialized_when_present() {
        let mut data = sample_data();
        data.set_analysis("iv", json!({"i_max": 1e-9}));
        let text = serde_json::to_string(&data).unwrap();
        assert!(text.contains(r#""analysis":{"iv":{"i_max":1e-9}}"#));
    }
}
