//! # 测量数据文件读取
//!
//! 读取导出的 JSON 与纯文本测量数据，还原为 [`MeasurementData`]。
//!
//! ## 纯文本格式
//! ```text
//! sample_name: HPK_VPX
//! measurement_type: iv_ramp
//! timestamp[s]    voltage[V]      current_hvsrc[A]
//! 0.000000E+00    0.000000E+00    1.000000E-12
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs`, `commands/analyze.rs`, `commands/plot.rs` 调用
//! - 使用 `models/data.rs`

use crate::error::{PqcError, Result};
use crate::models::MeasurementData;

use serde_json::Value;
use std::fs;
use std::path::Path;

/// 按扩展名读取数据文件
pub fn read_data_file(path: &Path) -> Result<MeasurementData> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "json" => read_json(path),
        "txt" => read_txt(path),
        _ => Err(PqcError::UnsupportedFormat(format!(
            "Cannot determine data format for: {}",
            path.display()
        ))),
    }
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(PqcError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    fs::read_to_string(path).map_err(|e| PqcError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 读取 JSON 数据
pub fn read_json(path: &Path) -> Result<MeasurementData> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|e| PqcError::ParseError {
        format: "json".to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// 读取纯文本数据
pub fn read_txt(path: &Path) -> Result<MeasurementData> {
    let content = read_file(path)?;
    parse_txt_content(&content).map_err(|reason| PqcError::ParseError {
        format: "txt".to_string(),
        path: path.display().to_string(),
        reason,
    })
}

/// 是否为 `key: value` 元数据行；只看键，值中可含制表符
fn is_meta_line(line: &str) -> bool {
    match line.split_once(':') {
        Some((key, rest)) => {
            !key.is_empty()
                && !key.contains(|c: char| c.is_whitespace() || c == '[' || c == '"')
                && (rest.is_empty() || rest.starts_with(' '))
        }
        None => false,
    }
}

/// 拆分列名 `name[unit]`
fn split_column(token: &str) -> (String, Option<String>) {
    if let Some(stripped) = token.strip_suffix(']') {
        if let Some((name, unit)) = stripped.split_once('[') {
            return (name.to_string(), Some(unit.to_string()));
        }
    }
    (token.to_string(), None)
}

/// 元数据值：布尔与数字还原为 JSON 类型
fn parse_meta_value(key: &str, text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if key == "measurement_tags" {
        let tags: Vec<Value> = text
            .split(", ")
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        return Value::Array(tags);
    }
    Value::String(text.to_string())
}

/// 数值单元，接受 `NAN`/`INF`
fn parse_number(token: &str) -> std::result::Result<f64, String> {
    match token.trim().to_ascii_uppercase().as_str() {
        "NAN" | "+NAN" | "-NAN" => Ok(f64::NAN),
        "INF" | "+INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        other => other
            .parse()
            .map_err(|_| format!("invalid number '{}'", token.trim())),
    }
}

/// 解析纯文本内容
pub fn parse_txt_content(content: &str) -> std::result::Result<MeasurementData, String> {
    let mut data = MeasurementData::new();

    // 元数据，直到列头为止
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        if !text.trim().is_empty() {
            if !is_meta_line(text) {
                break;
            }
            let (key, value) = text.split_once(':').unwrap_or((text, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            data.meta.insert(key.to_string(), parse_meta_value(key, value));
        }
        offset += line.len();
    }

    // 列头与数据行，引号规则与写出端一致
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(content[offset..].as_bytes());
    let mut records = reader.records();

    let mut columns: Vec<String> = Vec::new();
    if let Some(header) = records.next() {
        let header = header.map_err(|e| format!("header: {}", e))?;
        for token in header.iter() {
            let (name, unit) = split_column(token.trim());
            if let Some(unit) = unit {
                data.set_series_unit(&name, &unit);
            }
            data.register_series(&name).map_err(|e| e.to_string())?;
            columns.push(name);
        }
    }

    for (index, record) in records.enumerate() {
        let record = record.map_err(|e| format!("row {}: {}", index + 1, e))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if record.len() != columns.len() {
            return Err(format!(
                "row {}: expected {} values, got {}",
                index + 1,
                columns.len(),
                record.len()
            ));
        }
        for (name, cell) in columns.iter().zip(record.iter()) {
            let value = parse_number(cell)?;
            if let Some(values) = data.series.get_mut(name) {
                values.push(value);
            }
        }
    }

    Ok(data)
}
