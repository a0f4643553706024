//! # 测量序列模型
//!
//! YAML 序列配置的数据结构：序列 → 接触点 → 测量。
//!
//! ## 功能
//! - 字段缺省值（`enabled = true`，`id` 由名称生成）
//! - 保留参数的原始副本，用于恢复默认值
//! - 序列化回 YAML 时保持键与顺序
//!
//! ## 依赖关系
//! - 被 `parsers/config.rs`, `engine/sequence.rs`, `commands/` 使用
//! - 使用 `models/parameter.rs`

use crate::models::parameter::{deserialize_parameters, Parameters};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\-]+").expect("static id regex"))
}

/// 由名称生成标识符：`[^\w\-]+` 替换为 `_`，并去除首尾 `_`
pub fn make_id(name: &str) -> String {
    id_regex()
        .replace_all(name.trim(), "_")
        .trim_matches('_')
        .to_string()
}

/// 测量序列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub contacts: Vec<SequenceContact>,
}

/// 序列中的接触点（flute / 测试结构）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceContact {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub contact_id: String,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub measurements: Vec<SequenceMeasurement>,
}

/// 接触点上的单个测量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMeasurement {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_parameters")]
    pub parameters: Parameters,
    /// 加载时的参数副本
    #[serde(skip)]
    pub default_parameters: Parameters,
}

impl Sequence {
    /// 补全缺省标识符并记录默认参数
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = make_id(&self.name);
        }
        for contact in &mut self.contacts {
            contact.normalize();
        }
    }

    /// 启用的接触点
    pub fn enabled_contacts(&self) -> impl Iterator<Item = &SequenceContact> {
        self.contacts.iter().filter(|c| c.enabled)
    }

    /// 测量总数（含未启用）
    pub fn measurement_count(&self) -> usize {
        self.contacts.iter().map(|c| c.measurements.len()).sum()
    }
}

impl SequenceContact {
    fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = make_id(&self.name);
        }
        for measurement in &mut self.measurements {
            measurement.normalize();
        }
    }

    /// 启用的测量
    pub fn enabled_measurements(&self) -> impl Iterator<Item = &SequenceMeasurement> {
        self.measurements.iter().filter(|m| m.enabled)
    }
}

impl SequenceMeasurement {
    fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = make_id(&self.name);
        }
        self.default_parameters = self.parameters.clone();
    }

    /// 恢复加载时的参数
    pub fn reset_parameters(&mut self) {
        self.parameters = self.default_parameters.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parameter::ParameterValue;

    const SEQUENCE: &str = r#"
id: pqc_flute_1
name: PQC Flute 1
description: Flute 1 test structures
contacts:
  - name: Flute 1
    contact_id: flute_1
    measurements:
      - name: IV Diode
        type: iv_ramp
        tags: [diode]
        parameters:
          voltage_start: 0 V
          voltage_stop: -100 V
          voltage_step: 5 V
          waiting_time: 500 ms
          hvsrc_current_compliance: 10 uA
          matrix_channels: [1A01]
      - name: CV (disabled)
        type: cv_ramp
        enabled: false
"#;

    #[test]
    fn test_make_id() {
        assert_eq!(
            make_id("Nobody, expects THE (spanish) inquisition!"),
            "Nobody_expects_THE_spanish_inquisition"
        );
        assert_eq!(make_id("  IV Diode "), "IV_Diode");
        assert_eq!(make_id("cv-ramp_2"), "cv-ramp_2");
        assert_eq!(make_id("__Flute 1 (left)__"), "Flute_1_left");
        assert_eq!(make_id("Größe / µ-Dose"), "Größe_µ-Dose");
    }

    #[test]
    fn test_defaults_and_ids() {
        let mut sequence: Sequence = serde_yaml::from_str(SEQUENCE).unwrap();
        sequence.normalize();

        assert!(sequence.enabled);
        let contact = &sequence.contacts[0];
        assert_eq!(contact.id, "Flute_1");
        assert_eq!(contact.contact_id, "flute_1");

        let iv = &contact.measurements[0];
        assert_eq!(iv.id, "IV_Diode");
        assert_eq!(iv.kind, "iv_ramp");
        assert_eq!(iv.tags, vec!["diode".to_string()]);
        assert_eq!(iv.parameters, iv.default_parameters);
        assert!(matches!(
            iv.parameters["voltage_stop"],
            ParameterValue::Quantity(_)
        ));

        assert_eq!(contact.enabled_measurements().count(), 1);
        assert_eq!(sequence.measurement_count(), 2);
    }

    #[test]
    fn test_round_trip_keeps_keys() {
        let mut sequence: Sequence = serde_yaml::from_str(SEQUENCE).unwrap();
        sequence.normalize();
        let text = serde_yaml::to_string(&sequence).unwrap();
        let mut reparsed: Sequence = serde_yaml::from_str(&text).unwrap();
        reparsed.normalize();

        assert_eq!(reparsed.id, sequence.id);
        assert_eq!(reparsed.name, sequence.name);
        let keys = |s: &Sequence| -> Vec<Vec<String>> {
            s.contacts
                .iter()
                .flat_map(|c| c.measurements.iter())
                .map(|m| m.parameters.keys().cloned().collect())
                .collect()
        };
        assert_eq!(keys(&reparsed), keys(&sequence));
        assert_eq!(
            reparsed.contacts[0].measurements[0].parameters,
            sequence.contacts[0].measurements[0].parameters
        );
        assert!(!reparsed.contacts[0].measurements[1].enabled);
    }

    #[test]
    fn test_reset_parameters() {
        let mut sequence: Sequence = serde_yaml::from_str(SEQUENCE).unwrap();
        sequence.normalize();
        let measurement = &mut sequence.contacts[0].measurements[0];
        measurement
            .parameters
            .insert("voltage_stop".into(), ParameterValue::Integer(5));
        measurement.reset_parameters();
        assert!(matches!(
            measurement.parameters["voltage_stop"],
            ParameterValue::Quantity(_)
        ));
    }
}
