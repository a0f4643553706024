//! # JSON 导出
//!
//! 以 2 空格缩进写出 `meta` / `series_units` / `series` / `analysis`。
//!
//! ## 依赖关系
//! - 被 `engine/sequence.rs`, `commands/convert.rs`, `commands/analyze.rs` 调用
//! - 使用 `serde_json`

use crate::error::{PqcError, Result};
use crate::models::MeasurementData;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// 写出 JSON 数据
pub fn serialize_json<W: Write>(data: &MeasurementData, mut writer: W) -> Result<W> {
    serde_json::to_writer_pretty(&mut writer, data)?;
    Ok(writer)
}

/// 写出 JSON 数据文件
pub fn write_json_file(data: &MeasurementData, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| PqcError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut writer = serialize_json(data, BufWriter::new(file))?;
    writer.flush().map_err(|e| PqcError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::data::read_json;
    use serde_json::json;

    #[test]
    fn test_serialize_json_indent() {
        let mut data = MeasurementData::new();
        data.set_meta("sample_name", "HPK_VPX");
        data.set_series_unit("voltage", "V");
        data.register_series("voltage").unwrap();
        data.append_series(&[("voltage", 1.0)]).unwrap();

        let text = String::from_utf8(serialize_json(&data, Vec::new()).unwrap()).unwrap();
        assert!(text.starts_with("{\n  \"meta\": {\n    \"sample_name\": \"HPK_VPX\""));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["series"]["voltage"], json!([1.0]));
        assert!(value.get("analysis").is_none());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iv.json");
        let mut data = MeasurementData::new();
        data.set_meta("measurement_type", "iv_ramp");
        data.register_series("voltage").unwrap();
        data.append_series(&[("voltage", -5.0)]).unwrap();
        data.set_analysis("iv", json!({"i_max": 1e-9}));

        write_json_file(&data, &path).unwrap();
        let parsed = read_json(&path).unwrap();
        assert_eq!(parsed, data);
    }
}
