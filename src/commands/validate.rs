//! # validate 命令实现
//!
//! 校验 YAML 配置文件。
//!
//! ## 功能
//! - 自动识别序列 / 样品 / 卡盘配置
//! - 序列：按测量类型校验每个测量的参数与分析函数，检查重复 id
//! - 样品与卡盘：检查重复 id 与缺失坐标
//! - 任一错误时命令返回非零退出码
//!
//! ## 依赖关系
//! - 使用 `cli/validate.rs` 定义的参数
//! - 使用 `parsers/config.rs`, `engine/measurement.rs`

use crate::cli::validate::ValidateArgs;
use crate::engine::validate_measurement;
use crate::error::{PqcError, Result};
use crate::models::sample::Position;
use crate::models::Sequence;
use crate::parsers::config::{load_chuck, load_config, load_sample, load_sequence};
use crate::utils::output;

use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;
use tabled::{Table, Tabled};

/// 配置类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Sequence,
    Sample,
    Chuck,
}

/// 由顶层键识别配置类型
pub fn detect_kind(value: &Value) -> ConfigKind {
    if value.get("positions").is_some() {
        return ConfigKind::Chuck;
    }
    let is_sequence = value
        .get("contacts")
        .and_then(|c| c.as_sequence())
        .map(|contacts| {
            contacts
                .iter()
                .any(|c| c.get("contact_id").is_some() || c.get("measurements").is_some())
        })
        .unwrap_or(false);
    if is_sequence {
        ConfigKind::Sequence
    } else {
        ConfigKind::Sample
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct MeasurementRow {
    #[tabled(rename = "Contact")]
    pub contact: String,
    #[tabled(rename = "Measurement")]
    pub measurement: String,
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Enabled")]
    pub enabled: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// 执行 validate 命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    output::print_header("Validate configurations");

    let mut problems = 0;
    for path in &args.files {
        match validate_file(path, args.quiet) {
            Ok(count) => problems += count,
            Err(e) => {
                output::print_error(&format!("{}: {}", path.display(), e));
                problems += 1;
            }
        }
    }

    output::print_separator();
    if problems > 0 {
        return Err(PqcError::ConfigError(format!(
            "{} problem(s) found in {} file(s)",
            problems,
            args.files.len()
        )));
    }
    output::print_done(&format!("{} file(s) valid", args.files.len()));
    Ok(())
}

/// 校验单个文件，返回错误数量
fn validate_file(path: &Path, quiet: bool) -> Result<usize> {
    let kind = detect_kind(&load_config(path)?);
    tracing::debug!("{}: detected {:?} configuration", path.display(), kind);

    let errors = match kind {
        ConfigKind::Sequence => {
            let sequence = load_sequence(path)?;
            output::print_info(&format!(
                "Sequence '{}' ({}): {} contact(s), {} measurement(s)",
                sequence.name,
                path.display(),
                sequence.contacts.len(),
                sequence.measurement_count()
            ));
            let (rows, errors) = validate_sequence(&sequence);
            if !quiet && !rows.is_empty() {
                println!("{}", Table::new(&rows));
            }
            errors
        }
        ConfigKind::Sample => {
            let sample = load_sample(path)?;
            output::print_info(&format!(
                "Sample '{}' ({}): {} contact(s)",
                sample.name,
                path.display(),
                sample.contacts.len()
            ));
            check_positions(sample.contacts.iter().map(|c| (c.id.as_str(), &c.pos)))
        }
        ConfigKind::Chuck => {
            let chuck = load_chuck(path)?;
            output::print_info(&format!(
                "Chuck '{}' ({}): {} position(s)",
                chuck.name,
                path.display(),
                chuck.positions.len()
            ));
            check_positions(chuck.positions.iter().map(|p| (p.id.as_str(), &p.pos)))
        }
    };

    if errors == 0 {
        output::print_success(&format!("{}", path.display()));
    }
    Ok(errors)
}

/// 校验序列中的全部测量，返回表格行与错误数量
pub fn validate_sequence(sequence: &Sequence) -> (Vec<MeasurementRow>, usize) {
    let mut rows = Vec::new();
    let mut errors = 0;

    let mut contact_ids = HashSet::new();
    for contact in &sequence.contacts {
        if !contact_ids.insert(contact.id.as_str()) {
            output::print_error(&format!("Duplicate contact id: {}", contact.id));
            errors += 1;
        }

        let mut measurement_ids = HashSet::new();
        for measurement in &contact.measurements {
            let status = if !measurement_ids.insert(measurement.id.as_str()) {
                errors += 1;
                format!("ERROR: duplicate measurement id '{}'", measurement.id)
            } else {
                match validate_measurement(&measurement.kind, &measurement.parameters) {
                    Ok(warnings) if warnings.is_empty() => "OK".to_string(),
                    Ok(warnings) => format!("WARN: {}", warnings.join("; ")),
                    Err(e) => {
                        errors += 1;
                        format!("ERROR: {}", e)
                    }
                }
            };
            rows.push(MeasurementRow {
                contact: contact.name.clone(),
                measurement: measurement.name.clone(),
                kind: measurement.kind.clone(),
                enabled: (contact.enabled && measurement.enabled).to_string(),
                status,
            });
        }
    }
    (rows, errors)
}

/// 检查 id 唯一；缺失坐标只给出警告
fn check_positions<'a>(items: impl Iterator<Item = (&'a str, &'a Position)>) -> usize {
    let mut errors = 0;
    let mut ids = HashSet::new();
    for (id, pos) in items {
        if !ids.insert(id) {
            output::print_error(&format!("Duplicate id: {}", id));
            errors += 1;
        }
        if !pos.is_valid() {
            output::print_warning(&format!("Incomplete position for '{}': {}", id, pos));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::config::parse_sequence_str;

    const SEQUENCE: &str = r#"
id: flute_1
name: Flute 1
contacts:
  - name: Diode
    contact_id: diode
    measurements:
      - name: IV
        type: iv_ramp
        parameters:
          voltage_start: 0 V
          voltage_stop: -100 V
          voltage_step: 10 V
          waiting_time: 1 s
          hvsrc_current_compliance: 1 uA
      - name: CV
        type: cv_ramp
        parameters:
          bias_voltage_start: 0 V
      - name: Scan
        type: iv_scan
"#;

    #[test]
    fn test_detect_kind() {
        let sequence: Value = serde_yaml::from_str(SEQUENCE).unwrap();
        assert_eq!(detect_kind(&sequence), ConfigKind::Sequence);

        let sample: Value = serde_yaml::from_str(
            "id: s\nname: S\ncontacts:\n  - {id: c1, name: C1, pos: {x: 1, y: 2, z: 0}}\n",
        )
        .unwrap();
        assert_eq!(detect_kind(&sample), ConfigKind::Sample);

        let chuck: Value = serde_yaml::from_str("id: c\nname: C\npositions: []\n").unwrap();
        assert_eq!(detect_kind(&chuck), ConfigKind::Chuck);
    }

    #[test]
    fn test_validate_sequence() {
        let sequence = parse_sequence_str(SEQUENCE).unwrap();
        let (rows, errors) = validate_sequence(&sequence);
        assert_eq!(rows.len(), 3);
        assert_eq!(errors, 2);
        assert_eq!(rows[0].status, "OK");
        assert!(rows[1].status.starts_with("ERROR: Missing required parameter(s)"));
        assert_eq!(rows[2].status, "ERROR: Unknown measurement type: iv_scan");
    }

    #[test]
    fn test_duplicate_ids() {
        let yaml = SEQUENCE.replace("name: CV", "name: IV").replace("name: Scan", "name: IV ");
        let sequence = parse_sequence_str(&yaml).unwrap();
        let (rows, errors) = validate_sequence(&sequence);
        assert_eq!(errors, 2);
        assert_eq!(rows[0].status, "OK");
        assert!(rows[1].status.contains("duplicate measurement id 'IV'"));
        assert!(rows[2].status.contains("duplicate measurement id 'IV'"));
    }
}
