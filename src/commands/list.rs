//! # list 命令实现
//!
//! 列出目录中的 YAML 配置及其名称。
//!
//! ## 依赖关系
//! - 使用 `cli/list.rs` 定义的参数
//! - 使用 `parsers/config.rs`

use crate::cli::list::ListArgs;
use crate::error::Result;
use crate::parsers::list_configs;
use crate::utils::output;

use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct ConfigRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "File")]
    file: String,
}

/// 执行 list 命令
pub fn execute(args: ListArgs) -> Result<()> {
    let configs = list_configs(&args.dir)?;
    if configs.is_empty() {
        output::print_warning(&format!("No configurations found in '{}'", args.dir.display()));
        return Ok(());
    }

    output::print_header(&format!("Configurations in '{}'", args.dir.display()));
    let rows: Vec<ConfigRow> = configs
        .into_iter()
        .map(|(name, path)| ConfigRow {
            name,
            file: path.display().to_string(),
        })
        .collect();
    println!("{}", Table::new(&rows));
    output::print_info(&format!("{} configuration(s)", rows.len()));
    Ok(())
}
