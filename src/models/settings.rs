//! # 运行设置
//!
//! 序列运行的全局设置，可由 YAML 文件加载，并被命令行参数覆盖。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs`, `engine/sequence.rs` 使用
//! - 使用 `serde_yaml` 读取设置文件

use crate::error::{PqcError, Result};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认汇总文件名
pub const SUMMARY_FILENAME: &str = "summary.csv";

/// 序列运行设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// 输出根目录
    pub output_dir: PathBuf,
    /// 操作员
    pub operator: String,
    /// 导出 JSON
    pub serialize_json: bool,
    /// 导出纯文本
    pub serialize_txt: bool,
    /// 导出曲线图
    pub write_plots: bool,
    /// 每个测量写日志文件
    pub write_logfiles: bool,
    /// 接触点重试次数
    pub retry_contact_count: usize,
    /// 测量重试次数（仅分析失败时）
    pub retry_measurement_count: usize,
    /// 每个测量前的等待时间（秒）
    pub before_measurement_delay: f64,
    /// 读取环境箱温湿度
    pub use_environ: bool,
    /// 等待时间缩放因子（0 表示不等待）
    pub time_scale: f64,
    /// 汇总 CSV 文件名（相对输出目录）
    pub summary_filename: String,
    /// 卡盘台位置
    pub table_position: Vec<f64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            operator: String::new(),
            serialize_json: true,
            serialize_txt: true,
            write_plots: false,
            write_logfiles: true,
            retry_contact_count: 0,
            retry_measurement_count: 0,
            before_measurement_delay: 0.0,
            use_environ: false,
            time_scale: 1.0,
            summary_filename: SUMMARY_FILENAME.to_string(),
            table_position: Vec::new(),
        }
    }
}

impl RunSettings {
    /// 从 YAML 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PqcError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let settings: RunSettings =
            serde_yaml::from_str(&content).map_err(|e| PqcError::ParseError {
                format: "settings".to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<()> {
        if !(self.time_scale >= 0.0) {
            return Err(PqcError::ConfigError(format!(
                "time_scale must be >= 0, got {}",
                self.time_scale
            )));
        }
        if !(self.before_measurement_delay >= 0.0) {
            return Err(PqcError::ConfigError(format!(
                "before_measurement_delay must be >= 0, got {}",
                self.before_measurement_delay
            )));
        }
        Ok(())
    }

    /// 汇总文件路径
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(&self.summary_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = RunSettings::default();
        assert!(settings.serialize_json);
        assert!(settings.serialize_txt);
        assert_eq!(settings.time_scale, 1.0);
        assert_eq!(settings.summary_path(), PathBuf::from("./summary.csv"));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "operator: Monty\nretry_measurement_count: 2\nserialize_txt: false").unwrap();
        let settings = RunSettings::load(file.path()).unwrap();
        assert_eq!(settings.operator, "Monty");
        assert_eq!(settings.retry_measurement_count, 2);
        assert!(!settings.serialize_txt);
        assert!(settings.serialize_json);
    }

    #[test]
    fn test_invalid_time_scale() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time_scale: -1").unwrap();
        assert!(matches!(
            RunSettings::load(file.path()),
            Err(PqcError::ConfigError(_))
        ));
    }
}
