//! # list 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/list.rs`

use clap::Args;
use std::path::PathBuf;

/// list 子命令参数
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Directory containing YAML configurations
    #[arg(default_value = "config/sequences")]
    pub dir: PathBuf,
}
