//! # plot 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/plot.rs`

use clap::Args;
use std::path::PathBuf;

/// plot 子命令参数
#[derive(Args, Debug)]
pub struct PlotArgs {
    /// Exported measurement data (JSON or plain text)
    pub file: PathBuf,

    /// Series on the x axis (default depends on the measurement type)
    #[arg(short)]
    pub x: Option<String>,

    /// Series on the y axis (default depends on the measurement type)
    #[arg(short)]
    pub y: Option<String>,

    /// Output image, `.png` or `.svg` (default: input with `.png` extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Plot the absolute value of x
    #[arg(long, default_value_t = false)]
    pub abs_x: bool,

    /// Overlay the stored `linear_fit` analysis result
    #[arg(long, default_value_t = false)]
    pub fit: bool,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1024)]
    pub width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 640)]
    pub height: u32,
}
