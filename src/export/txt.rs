//! # 纯文本导出
//!
//! 元数据头 + 制表符分隔的 `name[unit]` 列头 + 科学计数法数据行。
//!
//! ## 依赖关系
//! - 被 `engine/sequence.rs`, `commands/convert.rs` 调用
//! - 使用 `export/formatter.rs` 的 PqcFormatter

use crate::error::{PqcError, Result};
use crate::export::formatter::{Cell, FormatSpec, PqcFormatter};
use crate::models::MeasurementData;

use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// 元数据值的文本形式
pub fn meta_to_text(key: &str, value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| meta_to_text(key, item))
                .filter(|s| !(key == "measurement_tags" && s.is_empty()))
                .collect();
            parts.join(", ")
        }
        Value::Object(_) => value.to_string(),
    }
}

/// 写出纯文本数据
pub fn serialize_txt<W: Write>(data: &MeasurementData, writer: W) -> Result<W> {
    let mut fmt = PqcFormatter::new(writer);

    for (key, value) in &data.meta {
        fmt.write_meta(key, meta_to_text(key, value), FormatSpec::Plain)?;
    }

    let columns: Vec<&String> = data.series.keys().collect();
    for key in &columns {
        let unit = data.series_units.get(key.as_str()).map(|u| u.as_str());
        fmt.add_column(key, FormatSpec::Exp, unit)?;
    }

    fmt.write_header()?;

    for index in 0..data.row_count() {
        let row: Vec<(&str, Cell)> = columns
            .iter()
            .map(|key| {
                let value = data.get_series(key).get(index).copied().unwrap_or(f64::NAN);
                (key.as_str(), Cell::Number(value))
            })
            .collect();
        fmt.write_row(&row)?;
    }

    fmt.into_inner()
}

/// 写出纯文本数据文件
pub fn write_txt_file(data: &MeasurementData, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| PqcError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut writer = serialize_txt(data, BufWriter::new(file))?;
    writer.flush().map_err(|e| PqcError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}
