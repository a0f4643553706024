//! # 测量参数注册表
//!
//! 每种测量类型注册自己的参数（键、默认值、单位、可选值、是否必填），
//! 运行时按注册信息校验并读取序列配置中的参数。
//!
//! ## 功能
//! - 重复注册报错
//! - 校验：未知键警告，缺失必填键、量纲不符、取值越界报错，扫描步数过多报错
//! - 类型化读取：物理量换算到注册单位，布尔、整数、枚举、列表
//! - 参考表输出（供 `pqc reference` 使用）
//!
//! ## 依赖关系
//! - 被 `engine/measurement.rs`, `engine/roles.rs`, `engine/measurements/` 使用
//! - 使用 `models/parameter.rs`, `models/quantity.rs`

use crate::engine::ramp::LinearRange;
use crate::error::{PqcError, Result};
use crate::models::parameter::{ParameterValue, Parameters};
use crate::models::quantity::{Quantity, Unit};

use indexmap::IndexMap;

/// 参数值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Quantity,
    Bool,
    Integer,
    Choice,
    List,
}

/// 已注册参数的描述
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterType {
    pub key: String,
    pub default: Option<ParameterValue>,
    pub unit: Option<Unit>,
    pub kind: ParameterKind,
    pub values: Vec<&'static str>,
    pub required: bool,
}

/// 参考表中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub key: String,
    pub unit: String,
    pub default: String,
    pub required: bool,
    pub values: String,
}

/// 参数注册表
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    types: IndexMap<String, ParameterType>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册参数，键重复时报错
    pub fn register(&mut self, parameter: ParameterType) -> Result<()> {
        if self.types.contains_key(&parameter.key) {
            return Err(PqcError::DuplicateParameter(parameter.key));
        }
        self.types.insert(parameter.key.clone(), parameter);
        Ok(())
    }

    /// 注册物理量参数；`default` 为 `None` 时即为必填
    pub fn register_quantity(&mut self, key: &str, unit: Unit, default: Option<&str>) -> Result<()> {
        let default = match default {
            Some(text) => Some(ParameterValue::Quantity(Quantity::parse(text)?)),
            None => None,
        };
        self.register(ParameterType {
            key: key.to_string(),
            required: default.is_none(),
            default,
            unit: Some(unit),
            kind: ParameterKind::Quantity,
            values: Vec::new(),
        })
    }

    pub fn register_bool(&mut self, key: &str, default: bool) -> Result<()> {
        self.register(ParameterType {
            key: key.to_string(),
            default: Some(ParameterValue::Bool(default)),
            unit: None,
            kind: ParameterKind::Bool,
            values: Vec::new(),
            required: false,
        })
    }

    pub fn register_integer(&mut self, key: &str, default: i64) -> Result<()> {
        self.register(ParameterType {
            key: key.to_string(),
            default: Some(ParameterValue::Integer(default)),
            unit: None,
            kind: ParameterKind::Integer,
            values: Vec::new(),
            required: false,
        })
    }

    /// 注册枚举参数，默认值必须在可选值中
    pub fn register_choice(&mut self, key: &str, default: &str, values: &[&'static str]) -> Result<()> {
        if !values.contains(&default) {
            return Err(PqcError::InvalidParameter {
                key: key.to_string(),
                reason: format!("default {:?} not in {:?}", default, values),
            });
        }
        self.register(ParameterType {
            key: key.to_string(),
            default: Some(ParameterValue::Text(default.to_string())),
            unit: None,
            kind: ParameterKind::Choice,
            values: values.to_vec(),
            required: false,
        })
    }

    pub fn register_list(&mut self, key: &str) -> Result<()> {
        self.register(ParameterType {
            key: key.to_string(),
            default: Some(ParameterValue::List(Vec::new())),
            unit: None,
            kind: ParameterKind::List,
            values: Vec::new(),
            required: false,
        })
    }

    pub fn get(&self, key: &str) -> Option<&ParameterType> {
        self.types.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterType> {
        self.types.values()
    }

    /// 参考表
    pub fn reference_rows(&self) -> Vec<ReferenceRow> {
        self.types
            .values()
            .map(|t| ReferenceRow {
                key: t.key.clone(),
                unit: t.unit.map(|u| u.symbol().to_string()).unwrap_or_default(),
                default: match (&t.default, t.required) {
                    (_, true) | (None, _) => String::new(),
                    (Some(value), false) => value.to_string(),
                },
                required: t.required,
                values: t.values.join(", "),
            })
            .collect()
    }
}

/// 扫描参数 (起点, 终点, 步长)
const RAMP_PARAMETERS: [(&str, &str, &str); 3] = [
    ("voltage_start", "voltage_stop", "voltage_step"),
    ("bias_voltage_start", "bias_voltage_stop", "bias_voltage_step"),
    ("current_start", "current_stop", "current_step"),
];

/// 绑定到具体测量配置的参数集合
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    pub registry: ParameterRegistry,
    pub values: Parameters,
}

impl ParameterSet {
    pub fn new(registry: ParameterRegistry, values: Parameters) -> Self {
        Self { registry, values }
    }

    /// 校验参数，返回警告列表
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        for key in self.values.keys() {
            if !self.registry.contains(key) {
                tracing::warn!("Unknown parameter: {}", key);
                warnings.push(format!("Unknown parameter: {}", key));
            }
        }

        let missing: Vec<&str> = self
            .registry
            .iter()
            .filter(|t| t.required && !self.values.contains_key(&t.key))
            .map(|t| t.key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PqcError::MissingParameter(missing.join(", ")));
        }

        for t in self.registry.iter() {
            match t.kind {
                ParameterKind::Quantity => self.quantity(&t.key).map(|_| ())?,
                ParameterKind::Bool => self.boolean(&t.key).map(|_| ())?,
                ParameterKind::Integer => self.integer(&t.key).map(|_| ())?,
                ParameterKind::Choice => self.choice(&t.key).map(|_| ())?,
                ParameterKind::List => self.list(&t.key).map(|_| ())?,
            }
        }

        for (start, stop, step) in RAMP_PARAMETERS {
            if [start, stop, step].iter().all(|key| self.registry.contains(key)) {
                LinearRange::new(self.quantity(start)?, self.quantity(stop)?, self.quantity(step)?)
                    .map_err(|e| Self::invalid(step, e.to_string()))?;
            }
        }
        Ok(warnings)
    }

    fn lookup(&self, key: &str) -> Result<(&ParameterType, &ParameterValue)> {
        let t = self
            .registry
            .get(key)
            .ok_or_else(|| PqcError::UnknownParameter(key.to_string()))?;
        let value = match self.values.get(key) {
            Some(value) => value,
            None => t
                .default
                .as_ref()
                .ok_or_else(|| PqcError::MissingParameter(key.to_string()))?,
        };
        Ok((t, value))
    }

    fn invalid(key: &str, reason: String) -> PqcError {
        PqcError::InvalidParameter {
            key: key.to_string(),
            reason,
        }
    }

    /// 物理量参数，换算到注册单位；无单位数值视为已是该单位
    pub fn quantity(&self, key: &str) -> Result<f64> {
        let (t, value) = self.lookup(key)?;
        let unit = t.unit.unwrap_or(Unit::Dimensionless);
        match value {
            ParameterValue::Quantity(q) => q.value_in(unit),
            ParameterValue::Text(text) => {
                let q = Quantity::parse(text)?;
                if q.has_unit() {
                    q.value_in(unit)
                } else {
                    Ok(q.to_base())
                }
            }
            other => other
                .as_f64()
                .ok_or_else(|| Self::invalid(key, format!("expected {} quantity, got {}", unit, other.kind()))),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<bool> {
        let (_, value) = self.lookup(key)?;
        match value {
            ParameterValue::Bool(b) => Ok(*b),
            ParameterValue::Integer(i) => Ok(*i != 0),
            ParameterValue::Text(text) => match text.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" => Ok(true),
                "false" | "no" | "off" => Ok(false),
                _ => Err(Self::invalid(key, format!("expected bool, got {:?}", text))),
            },
            other => Err(Self::invalid(key, format!("expected bool, got {}", other.kind()))),
        }
    }

    pub fn integer(&self, key: &str) -> Result<i64> {
        let (_, value) = self.lookup(key)?;
        match value {
            ParameterValue::Integer(i) => Ok(*i),
            ParameterValue::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            ParameterValue::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| Self::invalid(key, format!("expected int, got {:?}", text))),
            other => Err(Self::invalid(key, format!("expected int, got {}", other.kind()))),
        }
    }

    /// 枚举参数，必须是注册的可选值之一
    pub fn choice(&self, key: &str) -> Result<String> {
        let (t, value) = self.lookup(key)?;
        let text = match value {
            ParameterValue::Text(text) => text.clone(),
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Integer(i) => i.to_string(),
            other => return Err(Self::invalid(key, format!("expected str, got {}", other.kind()))),
        };
        if !t.values.is_empty() && !t.values.contains(&text.as_str()) {
            return Err(Self::invalid(
                key,
                format!("invalid parameter value: {} (expected one of {})", text, t.values.join(", ")),
            ));
        }
        Ok(text)
    }

    pub fn list(&self, key: &str) -> Result<Vec<ParameterValue>> {
        let (_, value) = self.lookup(key)?;
        match value {
            ParameterValue::List(items) => Ok(items.clone()),
            ParameterValue::Null => Ok(Vec::new()),
            other => Ok(vec![other.clone()]),
        }
    }
}
