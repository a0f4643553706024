//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `engine/`, `parsers/`, `export/`, `utils/`
//! - 子模块: validate, reference, list, run, convert, analyze, plot

pub mod analyze;
pub mod convert;
pub mod list;
pub mod plot;
pub mod reference;
pub mod run;
pub mod validate;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Validate(args) => validate::execute(args),
        Commands::Reference(args) => reference::execute(args),
        Commands::List(args) => list::execute(args),
        Commands::Run(args) => run::execute(args),
        Commands::Convert(args) => convert::execute(args),
        Commands::Analyze(args) => analyze::execute(args),
        Commands::Plot(args) => plot::execute(args),
    }
}
