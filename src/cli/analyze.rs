//! # analyze 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/analyze.rs`

use clap::Args;
use std::path::PathBuf;

/// analyze 子命令参数
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Exported measurement data (JSON or plain text)
    pub file: PathBuf,

    /// Analysis function: a name (`iv`) or an inline YAML map
    /// (`{type: iv, limits: {i_max: {maximum: 1.0e-6}}}`)
    #[arg(short, long = "function", required = true)]
    pub functions: Vec<String>,

    /// Write the results back into the JSON file
    #[arg(long, default_value_t = false)]
    pub update: bool,
}
