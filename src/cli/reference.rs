//! # reference 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/reference.rs`

use clap::Args;

/// reference 子命令参数
#[derive(Args, Debug)]
pub struct ReferenceArgs {
    /// Measurement type (omit to list all types)
    pub measurement_type: Option<String>,
}
