//! # 解析器模块
//!
//! 读取 YAML 配置与导出的测量数据文件。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: config, data

pub mod config;
pub mod data;

pub use config::{list_configs, load_sequence};
pub use data::read_data_file;
