//! # 样品与卡盘模型
//!
//! 样品接触点几何与卡盘样品位置的 YAML 配置。
//!
//! ## 依赖关系
//! - 被 `parsers/config.rs`, `commands/list.rs` 使用
//! - 无其他内部依赖

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

fn default_true() -> bool {
    true
}

fn nan_if_missing<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn nan() -> f64 {
    f64::NAN
}

/// 三维笛卡尔坐标（毫米），缺失分量为 NaN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default = "nan", deserialize_with = "nan_if_missing")]
    pub x: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_missing")]
    pub y: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_missing")]
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 三个分量均有效
    pub fn is_valid(&self) -> bool {
        !(self.x.is_nan() || self.y.is_nan() || self.z.is_nan())
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(f64::NAN, f64::NAN, f64::NAN)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// 硅样品
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contacts: Vec<SampleContact>,
}

/// 样品接触点几何
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleContact {
    pub id: String,
    pub name: String,
    pub pos: Position,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

impl Sample {
    /// 按 id 查找接触点
    pub fn find_contact(&self, id: &str) -> Option<&SampleContact> {
        self.contacts.iter().find(|c| c.id == id)
    }
}

/// 卡盘配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chuck {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub positions: Vec<ChuckSamplePosition>,
}

/// 卡盘上的样品位置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChuckSamplePosition {
    pub id: String,
    pub name: String,
    pub pos: Position,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_contacts() {
        let sample: Sample = serde_yaml::from_str(
            r#"
id: default_hmw_n
name: Default HMW N
contacts:
  - id: flute_1
    name: Flute 1
    type: flute
    pos: {x: 1.5, y: 2.0, z: 0.0}
  - id: flute_2
    name: Flute 2
    enabled: false
    pos: {x: 3.0, y: 2.0}
"#,
        )
        .unwrap();
        assert!(sample.enabled);
        let flute = sample.find_contact("flute_1").unwrap();
        assert_eq!(flute.kind, "flute");
        assert!(flute.pos.is_valid());
        let flute2 = sample.find_contact("flute_2").unwrap();
        assert!(!flute2.enabled);
        assert!(flute2.pos.z.is_nan());
        assert!(!flute2.pos.is_valid());
    }

    #[test]
    fn test_chuck_positions() {
        let chuck: Chuck = serde_yaml::from_str(
            r#"
id: chuck_3
name: Chuck 3
positions:
  - id: pos_1
    name: Position 1
    pos: {x: 10, y: 20, z: 0}
"#,
        )
        .unwrap();
        assert_eq!(chuck.positions.len(), 1);
        assert_eq!(chuck.positions[0].pos, Position::new(10.0, 20.0, 0.0));
    }

    #[test]
    fn test_position_arithmetic() {
        let a = Position::new(1.0, 2.0, 3.0);
        let b = Position::new(0.5, 0.5, 0.5);
        assert_eq!(a + b, Position::new(1.5, 2.5, 3.5));
        assert_eq!(a - b, Position::new(0.5, 1.5, 2.5));
        assert_eq!(a.to_string(), "(1.000, 2.000, 3.000)");
        assert!(!Position::default().is_valid());
    }
}
