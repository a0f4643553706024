//! # 测量汇总
//!
//! 每次测量结束后向汇总 CSV 追加一行；新文件先写表头。
//!
//! ## 依赖关系
//! - 被 `engine/sequence.rs` 调用
//! - 使用 `export/formatter.rs` 的 CsvFormatter

use crate::error::{PqcError, Result};
use crate::export::formatter::{Cell, CsvFormatter, FormatSpec};

use std::fs::{self, OpenOptions};
use std::path::Path;

/// 汇总表列名
pub const SUMMARY_HEADER: [&str; 6] = ["Time", "Sample", "Type", "Contact", "Measurement", "Result"];

/// 追加一行汇总（键为列名）
pub fn append_summary(path: &Path, row: &[(&str, String)]) -> Result<()> {
    let has_header = path.exists();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PqcError::FileWriteError {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PqcError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;

    let mut fmt = CsvFormatter::new(file);
    for (key, _) in row {
        fmt.add_column(key, FormatSpec::Plain)?;
    }
    if !has_header {
        fmt.write_header()?;
    }
    let cells: Vec<(&str, Cell)> = row
        .iter()
        .map(|(key, value)| (*key, Cell::Text(value.clone())))
        .collect();
    fmt.write_row(&cells)?;
    fmt.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(state: &str) -> Vec<(&'static str, String)> {
        SUMMARY_HEADER
            .iter()
            .zip([
                "2024-01-01T10:00:00",
                "HPK_VPX",
                "PQCFlutesLeft",
                "Flute 1",
                "IV Diode",
                state,
            ])
            .map(|(k, v)| (*k, v.to_string()))
            .collect()
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summary.csv");
        append_summary(&path, &row("Success")).unwrap();
        append_summary(&path, &row("Compliance")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Time,Sample,Type,Contact,Measurement,Result");
        assert!(lines[1].ends_with(",Success"));
        assert!(lines[2].ends_with(",Compliance"));
    }
}
