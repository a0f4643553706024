//! # 统一错误处理模块
//!
//! 定义 PQC 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// PQC 统一错误类型
#[derive(Error, Debug)]
pub enum PqcError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid quantity '{input}': {reason}")]
    InvalidQuantity { input: String, reason: String },

    #[error("Unit mismatch: expected {expected}, got {found}")]
    UnitMismatch { expected: String, found: String },

    // ─────────────────────────────────────────────────────────────
    // 配置与参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Unknown measurement type: {0}")]
    UnknownMeasurementType(String),

    #[error("Parameter already registered: {0}")]
    DuplicateParameter(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Missing required parameter(s): {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 数据与导出错误
    // ─────────────────────────────────────────────────────────────
    #[error("Series already exists: {0}")]
    DuplicateSeries(String),

    #[error("Inconsistent series keys: expected [{expected}], got [{found}]")]
    InconsistentSeries { expected: String, found: String },

    #[error("Formatter error: {0}")]
    FormatterError(String),

    // ─────────────────────────────────────────────────────────────
    // 仪器与测量错误
    // ─────────────────────────────────────────────────────────────
    #[error("Instrument error ({role}): {message}")]
    Instrument { role: String, message: String },

    #[error("Timeout ({role}): {message}")]
    Timeout { role: String, message: String },

    #[error("Compliance tripped: {0}")]
    Compliance(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

impl PqcError {
    /// 是否为 compliance 触发
    pub fn is_compliance(&self) -> bool {
        matches!(self, PqcError::Compliance(_))
    }

    /// 是否为分析错误（唯一会触发重试的错误）
    pub fn is_analysis(&self) -> bool {
        matches!(self, PqcError::Analysis(_))
    }

    /// 是否为仪器超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, PqcError::Timeout { .. })
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, PqcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PqcError::Compliance("hvsrc".into()).is_compliance());
        assert!(PqcError::Analysis("out of range".into()).is_analysis());
        assert!(PqcError::Timeout {
            role: "elm".into(),
            message: "read".into()
        }
        .is_timeout());
        assert!(!PqcError::Compliance("vsrc".into()).is_analysis());
    }

    #[test]
    fn test_inconsistent_series_message() {
        let err = PqcError::InconsistentSeries {
            expected: "a, b".into(),
            found: "a".into(),
        };
        assert!(err.to_string().starts_with("Inconsistent series keys"));
    }
}
