//! # validate 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/validate.rs`

use clap::Args;
use std::path::PathBuf;

/// validate 子命令参数
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files (sequence, sample or chuck YAML)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Only print problems, skip the measurement table
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}
