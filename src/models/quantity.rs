//! # 物理量模型
//!
//! 解析带单位的参数字符串，例如 `10 V`, `1 uA`, `500 ms`, `1 kHz`。
//!
//! ## 功能
//! - SI 前缀 (y .. Y) 与单位符号识别
//! - 保留原始书写形式，便于 YAML 回写
//! - 换算到基本单位，单位量纲不匹配时报错
//!
//! ## 依赖关系
//! - 被 `models/parameter.rs`, `engine/parameters.rs` 使用
//! - 使用 `regex` 拆分数值与单位

use crate::error::{PqcError, Result};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// 物理单位（量纲）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Volt,
    Ampere,
    Second,
    Hertz,
    Farad,
    Ohm,
    Percent,
    DegC,
    Meter,
    Dimensionless,
}

impl Unit {
    /// 单位符号
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::Second => "s",
            Unit::Hertz => "Hz",
            Unit::Farad => "F",
            Unit::Ohm => "Ohm",
            Unit::Percent => "%",
            Unit::DegC => "degC",
            Unit::Meter => "m",
            Unit::Dimensionless => "",
        }
    }

    /// 是否允许 SI 前缀
    fn accepts_prefix(&self) -> bool {
        !matches!(self, Unit::Percent | Unit::DegC | Unit::Dimensionless)
    }

    /// 精确匹配单位名，返回 (单位, 换算因子)
    fn lookup(token: &str) -> Option<(Unit, f64)> {
        let found = match token {
            "V" | "volt" | "volts" => (Unit::Volt, 1.0),
            "A" | "ampere" | "amperes" | "amp" => (Unit::Ampere, 1.0),
            "s" | "sec" | "second" | "seconds" => (Unit::Second, 1.0),
            "min" | "minute" | "minutes" => (Unit::Second, 60.0),
            "h" | "hour" | "hours" => (Unit::Second, 3600.0),
            "Hz" | "hertz" | "herz" => (Unit::Hertz, 1.0),
            "F" | "farad" => (Unit::Farad, 1.0),
            "Ohm" | "ohm" | "Ω" => (Unit::Ohm, 1.0),
            "%" | "percent" => (Unit::Percent, 1.0),
            "degC" | "°C" | "degree_Celsius" | "celsius" => (Unit::DegC, 1.0),
            "m" | "meter" | "metre" => (Unit::Meter, 1.0),
            _ => return None,
        };
        Some(found)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Dimensionless => write!(f, "1"),
            other => write!(f, "{}", other.symbol()),
        }
    }
}

/// SI 前缀表（符号, 因子）
pub const SI_PREFIXES: [(&str, f64); 17] = [
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("", 1e0),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
    ("y", 1e-24),
];

fn prefix_factor(prefix: &str) -> Option<f64> {
    if prefix == "µ" || prefix == "μ" {
        return Some(1e-6);
    }
    SI_PREFIXES
        .iter()
        .find(|(symbol, _)| !symbol.is_empty() && *symbol == prefix)
        .map(|(_, factor)| *factor)
}

/// 解析单位记号（可带前缀），返回 (单位, 换算因子)
pub fn parse_unit(token: &str) -> Option<(Unit, f64)> {
    if let Some(found) = Unit::lookup(token) {
        return Some(found);
    }
    let mut chars = token.chars();
    let first = chars.next()?;
    let rest = chars.as_str();
    let factor = prefix_factor(&first.to_string())?;
    let (unit, unit_factor) = Unit::lookup(rest)?;
    if !unit.accepts_prefix() || unit_factor != 1.0 {
        return None;
    }
    Some((unit, factor))
}

fn quantity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*(\S*)\s*$")
            .expect("static quantity regex")
    })
}

/// 带单位的物理量
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    /// 书写的数值
    pub magnitude: f64,
    /// 量纲
    pub unit: Unit,
    /// 书写的单位记号（含前缀）
    token: String,
    /// 换算到基本单位的因子
    scale: f64,
}

impl Quantity {
    /// 以基本单位创建物理量
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self {
            magnitude,
            unit,
            token: unit.symbol().to_string(),
            scale: 1.0,
        }
    }

    /// 解析 `<number> <unit>` 字符串
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| PqcError::InvalidQuantity {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let caps = quantity_regex()
            .captures(input)
            .ok_or_else(|| invalid("expected '<number> <unit>'"))?;

        let magnitude: f64 = caps[1]
            .parse()
            .map_err(|_| invalid("invalid number"))?;

        let token = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if token.is_empty() {
            return Ok(Self {
                magnitude,
                unit: Unit::Dimensionless,
                token: String::new(),
                scale: 1.0,
            });
        }

        let (unit, scale) = parse_unit(token).ok_or_else(|| invalid("unknown unit"))?;

        Ok(Self {
            magnitude,
            unit,
            token: token.to_string(),
            scale,
        })
    }

    /// 是否带有单位
    pub fn has_unit(&self) -> bool {
        self.unit != Unit::Dimensionless
    }

    /// 书写的单位记号
    pub fn token(&self) -> &str {
        &self.token
    }

    /// 换算到基本单位后的数值
    pub fn to_base(&self) -> f64 {
        self.magnitude * self.scale
    }

    /// 按指定单位取值，量纲不一致时报错
    pub fn value_in(&self, unit: Unit) -> Result<f64> {
        if self.unit == unit {
            Ok(self.to_base())
        } else {
            Err(PqcError::UnitMismatch {
                expected: unit.to_string(),
                found: self.unit.to_string(),
            })
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.token.is_empty() {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} {}", self.magnitude, self.token)
        }
    }
}

impl std::str::FromStr for Quantity {
    type Err = PqcError;

    fn from_str(s: &str) -> Result<Self> {
        Quantity::parse(s)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Quantity::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1e-30)
    }

    #[test]
    fn test_parse_common_quantities() {
        let q = Quantity::parse("10 V").unwrap();
        assert_eq!(q.magnitude, 10.0);
        assert_eq!(q.unit, Unit::Volt);
        assert!(approx(q.to_base(), 10.0));

        let q = Quantity::parse("1 uA").unwrap();
        assert_eq!(q.unit, Unit::Ampere);
        assert!(approx(q.to_base(), 1e-6));

        let q = Quantity::parse("500 ms").unwrap();
        assert_eq!(q.unit, Unit::Second);
        assert!(approx(q.to_base(), 0.5));

        let q = Quantity::parse("1 kHz").unwrap();
        assert_eq!(q.unit, Unit::Hertz);
        assert!(approx(q.to_base(), 1000.0));

        let q = Quantity::parse("20 pA").unwrap();
        assert!(approx(q.to_base(), 20e-12));
    }

    #[test]
    fn test_parse_compact_and_exponent() {
        let q = Quantity::parse("-2.5e-3V").unwrap();
        assert_eq!(q.unit, Unit::Volt);
        assert!(approx(q.to_base(), -2.5e-3));

        let q = Quantity::parse("1.5 µA").unwrap();
        assert!(approx(q.to_base(), 1.5e-6));
    }

    #[test]
    fn test_bare_symbols_before_prefixes() {
        assert_eq!(parse_unit("m"), Some((Unit::Meter, 1.0)));
        assert_eq!(parse_unit("mm").map(|(u, _)| u), Some(Unit::Meter));
        assert_eq!(parse_unit("min"), Some((Unit::Second, 60.0)));
        assert_eq!(parse_unit("Ohm"), Some((Unit::Ohm, 1.0)));
        assert_eq!(parse_unit("kOhm"), Some((Unit::Ohm, 1e3)));
        assert!(parse_unit("mdegC").is_none());
        assert!(parse_unit("kmin").is_none());
    }

    #[test]
    fn test_special_units() {
        assert_eq!(Quantity::parse("40 %").unwrap().unit, Unit::Percent);
        assert_eq!(Quantity::parse("25 degC").unwrap().unit, Unit::DegC);
        assert!(approx(Quantity::parse("2 min").unwrap().to_base(), 120.0));
    }

    #[test]
    fn test_invalid_quantities() {
        assert!(Quantity::parse("ten volts").is_err());
        assert!(Quantity::parse("10 parsec").is_err());
        assert!(Quantity::parse("").is_err());
    }

    #[test]
    fn test_value_in_unit_mismatch() {
        let q = Quantity::parse("10 V").unwrap();
        assert!(q.value_in(Unit::Volt).is_ok());
        assert!(matches!(
            q.value_in(Unit::Ampere),
            Err(PqcError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn test_display_keeps_written_form() {
        assert_eq!(Quantity::parse("500 ms").unwrap().to_string(), "500 ms");
        assert_eq!(Quantity::parse("1uA").unwrap().to_string(), "1 uA");
        assert_eq!(Quantity::parse("0.5 V").unwrap().to_string(), "0.5 V");
        assert_eq!(Quantity::new(10.0, Unit::Volt).to_string(), "10 V");
    }
}
