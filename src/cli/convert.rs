//! # convert 子命令 CLI 定义
//!
//! 批量转换导出的测量数据 (JSON <-> 纯文本)
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/convert.rs`

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 支持的输出格式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DataFormat {
    /// JSON export
    Json,
    /// Tab separated plain text export
    Txt,
}

impl DataFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Txt => "txt",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// convert 子命令参数
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input data file or directory
    pub input: PathBuf,

    /// Target format
    #[arg(short, long, value_enum)]
    pub to: DataFormat,

    /// Output directory (default: next to each input file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Glob pattern(s) for input files, comma separated
    #[arg(short, long, default_value = "*.json,*.txt")]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
