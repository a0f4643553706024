//! # PQC - 工艺质量控制测量序列工具
//!
//! 对硅传感器测试结构按序列运行 IV / CV 扫描，导出数据并运行分析函数。
//!
//! ## 子命令
//! - `validate`  - 校验序列 / 样品 / 卡盘配置
//! - `reference` - 测量类型与参数参考表
//! - `list`      - 列出目录中的配置
//! - `run`       - 在模拟测试台上运行序列
//! - `convert`   - JSON / 纯文本数据互转
//! - `analyze`   - 对导出数据运行分析函数
//! - `plot`      - 绘制导出数据曲线
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── engine/      (扫描、测量类型、序列运行)
//!   │     ├── instruments/ (仪器接口与模拟测试台)
//!   │     ├── analysis/    (分析函数)
//!   │     ├── parsers/     (配置与数据读取)
//!   │     ├── export/      (数据导出)
//!   │     └── models/      (数据模型)
//!   ├── batch/      (批量处理)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod analysis;
mod batch;
mod cli;
mod commands;
mod engine;
mod error;
mod export;
mod instruments;
mod models;
mod parsers;
mod utils;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// 日志级别：默认 warn，`-v` 逐级提高，`RUST_LOG` 优先；测量日志文件固定 info
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry()
        .with(console)
        .with(utils::logfile::file_layer())
        .init();
}

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
