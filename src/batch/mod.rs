//! # 批量处理模块
//!
//! 对导出的测量数据文件做批量处理（格式转换等）。
//!
//! ## 功能
//! - 单文件或目录输入
//! - 逗号分隔的 glob 模式，可递归
//! - rayon 并行处理，indicatif 进度条
//! - 成功 / 跳过 / 失败统计
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs` 使用
//! - 使用 `rayon`, `walkdir`, `glob`

pub mod collector;
pub mod runner;

pub use collector::FileCollector;
pub use runner::{BatchResult, BatchRunner, ProcessResult};
