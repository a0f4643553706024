//! # 测量参数值
//!
//! 序列配置中 `parameters` 映射的值类型。
//!
//! ## 功能
//! - 从任意 YAML 值构造
//! - 字符串（含列表元素）自动识别为物理量
//! - 保持键顺序，回写时物理量恢复为字符串
//!
//! ## 依赖关系
//! - 被 `models/sequence.rs`, `engine/parameters.rs` 使用
//! - 使用 `models/quantity.rs`

use crate::models::quantity::Quantity;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::fmt;

/// 不做物理量转换的参数键
pub const UNCONVERTED_KEYS: [&str; 3] = ["matrix_enable", "matrix_channels", "analysis_functions"];

/// 有序参数映射
pub type Parameters = IndexMap<String, ParameterValue>;

/// 参数值
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Quantity(Quantity),
    Text(String),
    List(Vec<ParameterValue>),
    Map(IndexMap<String, ParameterValue>),
}

impl ParameterValue {
    /// 从 YAML 值构造；`convert` 为真时尝试识别物理量
    pub fn from_yaml(value: &Value, convert: bool) -> Self {
        match value {
            Value::Null => ParameterValue::Null,
            Value::Bool(b) => ParameterValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ParameterValue::Integer(i)
                } else {
                    ParameterValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => {
                if convert {
                    match Quantity::parse(s) {
                        Ok(q) if q.has_unit() => ParameterValue::Quantity(q),
                        _ => ParameterValue::Text(s.clone()),
                    }
                } else {
                    ParameterValue::Text(s.clone())
                }
            }
            Value::Sequence(items) => ParameterValue::List(
                items
                    .iter()
                    .map(|item| ParameterValue::from_yaml(item, convert))
                    .collect(),
            ),
            Value::Mapping(map) => ParameterValue::Map(
                map.iter()
                    .map(|(k, v)| (yaml_key(k), ParameterValue::from_yaml(v, convert)))
                    .collect(),
            ),
            Value::Tagged(tagged) => ParameterValue::from_yaml(&tagged.value, convert),
        }
    }

    /// 转回 YAML 值
    pub fn to_yaml(&self) -> Value {
        match self {
            ParameterValue::Null => Value::Null,
            ParameterValue::Bool(b) => Value::Bool(*b),
            ParameterValue::Integer(i) => Value::Number((*i).into()),
            ParameterValue::Float(f) => Value::Number((*f).into()),
            ParameterValue::Quantity(q) => Value::String(q.to_string()),
            ParameterValue::Text(s) => Value::String(s.clone()),
            ParameterValue::List(items) => {
                Value::Sequence(items.iter().map(ParameterValue::to_yaml).collect())
            }
            ParameterValue::Map(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.to_yaml()))
                    .collect(),
            ),
        }
    }

    /// 数值（整数、浮点或可解析的无单位文本）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Integer(i) => Some(*i as f64),
            ParameterValue::Float(f) => Some(*f),
            ParameterValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 简短类型名，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Null => "null",
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Integer(_) => "int",
            ParameterValue::Float(_) => "float",
            ParameterValue::Quantity(_) => "quantity",
            ParameterValue::Text(_) => "str",
            ParameterValue::List(_) => "list",
            ParameterValue::Map(_) => "map",
        }
    }
}

fn yaml_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Null => write!(f, "null"),
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Integer(i) => write!(f, "{}", i),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Quantity(q) => write!(f, "{}", q),
            ParameterValue::Text(s) => write!(f, "{}", s),
            ParameterValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ParameterValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl Serialize for ParameterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_yaml().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParameterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ParameterValue::from_yaml(&value, true))
    }
}

/// 解析参数映射，跳过 [`UNCONVERTED_KEYS`] 的物理量识别
pub fn parameters_from_yaml(value: &Value) -> Parameters {
    let mut params = Parameters::new();
    if let Value::Mapping(map) = value {
        for (k, v) in map {
            let key = yaml_key(k);
            let convert = !UNCONVERTED_KEYS.contains(&key.as_str());
            params.insert(key, ParameterValue::from_yaml(v, convert));
        }
    }
    params
}

/// serde 辅助：`parameters` 字段的反序列化
pub fn deserialize_parameters<'de, D>(deserializer: D) -> std::result::Result<Parameters, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parameters_from_yaml(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quantity::Unit;

    #[test]
    fn test_strings_become_quantities() {
        let yaml: Value = serde_yaml::from_str(
            "voltage_stop: -10 V\nwaiting_time: 500 ms\nlabel: front\nlist: [1 V, 2 V]",
        )
        .unwrap();
        let params = parameters_from_yaml(&yaml);
        match &params["voltage_stop"] {
            ParameterValue::Quantity(q) => assert_eq!(q.unit, Unit::Volt),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(params["waiting_time"], ParameterValue::Quantity(_)));
        assert_eq!(params["label"], ParameterValue::Text("front".into()));
        match &params["list"] {
            ParameterValue::List(items) => {
                assert!(items.iter().all(|i| matches!(i, ParameterValue::Quantity(_))))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unconverted_keys() {
        let yaml: Value =
            serde_yaml::from_str("matrix_channels: [1A01, 2B04]\nmatrix_enable: true").unwrap();
        let params = parameters_from_yaml(&yaml);
        match &params["matrix_channels"] {
            ParameterValue::List(items) => {
                assert_eq!(items[0], ParameterValue::Text("1A01".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_numbers_and_order() {
        let yaml: Value = serde_yaml::from_str("b: 2\na: 1.5\nc: true").unwrap();
        let params = parameters_from_yaml(&yaml);
        let keys: Vec<&str> = params.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(params["b"].as_f64(), Some(2.0));
        assert_eq!(params["a"].as_f64(), Some(1.5));
        assert_eq!(params["c"], ParameterValue::Bool(true));
    }

    #[test]
    fn test_quantity_serializes_back_to_string() {
        let value = ParameterValue::from_yaml(&Value::String("1 uA".into()), true);
        assert_eq!(value.to_yaml(), Value::String("1 uA".into()));
    }
}
