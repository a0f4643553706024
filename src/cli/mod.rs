//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `validate`: 校验序列 / 样品 / 卡盘配置
//! - `reference`: 测量类型与参数参考表
//! - `list`: 列出目录中的配置
//! - `run`: 在模拟测试台上运行序列
//! - `convert`: 导出数据格式转换
//! - `analyze`: 对导出数据运行分析函数
//! - `plot`: 绘制导出数据曲线
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: validate, reference, list, run, convert, analyze, plot

pub mod analyze;
pub mod convert;
pub mod list;
pub mod plot;
pub mod reference;
pub mod run;
pub mod validate;

use clap::{ArgAction, Parser, Subcommand};

/// PQC - 硅传感器工艺质量控制测量序列工具
#[derive(Parser)]
#[command(name = "pqc")]
#[command(version)]
#[command(about = "Process quality control measurement sequencer", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Validate sequence, sample and chuck configuration files
    Validate(validate::ValidateArgs),

    /// List measurement types or show the parameters of one type
    Reference(reference::ReferenceArgs),

    /// List YAML configurations in a directory
    List(list::ListArgs),

    /// Run a measurement sequence on the simulated station
    Run(run::RunArgs),

    /// Convert exported measurement data between JSON and plain text
    Convert(convert::ConvertArgs),

    /// Run analysis functions on exported measurement data
    Analyze(analyze::AnalyzeArgs),

    /// Plot a series of exported measurement data
    Plot(plot::PlotArgs),
}
