//! # 数据导出模块
//!
//! 测量数据的 JSON / 纯文本导出、汇总 CSV 与曲线图。
//!
//! ## 依赖关系
//! - 被 `engine/sequence.rs` 与 `commands/` 使用
//! - 使用 `models/data.rs`
//! - 子模块: formatter, json, txt, summary, plot

pub mod formatter;
pub mod json;
pub mod plot;
pub mod summary;
pub mod txt;

pub use json::write_json_file;
pub use txt::write_txt_file;
