//! # 进度条工具
//!
//! 封装 `indicatif` 提供统一的进度条样式。
//!
//! ## 依赖关系
//! - 被 `batch/`, `commands/run.rs` 使用
//! - 使用 `indicatif` crate

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";
const MEASUREMENT_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}";

/// 模板无效时回退到默认样式
fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// 创建标准进度条
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(style(BAR_TEMPLATE).progress_chars("#>-"));
    pb.set_message(message.to_string());
    pb
}

/// 创建测量进度条（前缀为接触点 / 测量名称，消息为扫描状态）
pub fn create_measurement_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(style(MEASUREMENT_TEMPLATE).progress_chars("#>-"));
    pb
}
