//! # 工具函数模块
//!
//! 提供美化输出、进度条、测量日志文件与数值 / 文件名格式化工具。
//!
//! ## 依赖关系
//! - 被 `main.rs`, `commands/`, `engine/`, `export/` 使用
//! - 子模块: format, logfile, output, progress

pub mod format;
pub mod logfile;
pub mod output;
pub mod progress;
