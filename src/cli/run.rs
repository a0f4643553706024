//! # run 子命令 CLI 定义
//!
//! 命令行选项覆盖设置文件中的同名项。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Sequence configuration (YAML)
    #[arg(short, long)]
    pub sequence: PathBuf,

    /// Sample name
    #[arg(long)]
    pub sample_name: String,

    /// Sample type
    #[arg(long, default_value = "")]
    pub sample_type: String,

    /// Sample position on the chuck
    #[arg(long, default_value = "")]
    pub sample_position: String,

    /// Sample comment
    #[arg(long, default_value = "")]
    pub comment: String,

    /// Run settings (YAML)
    #[arg(long, env = "PQC_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, env = "PQC_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Operator name
    #[arg(long, env = "PQC_OPERATOR")]
    pub operator: Option<String>,

    /// Do not write JSON files
    #[arg(long, default_value_t = false)]
    pub no_json: bool,

    /// Do not write plain text files
    #[arg(long, default_value_t = false)]
    pub no_txt: bool,

    /// Do not write measurement log files
    #[arg(long, default_value_t = false)]
    pub no_log: bool,

    /// Write PNG plots
    #[arg(long, default_value_t = false)]
    pub plot: bool,

    /// Read environment box temperature and humidity
    #[arg(long, default_value_t = false)]
    pub environ: bool,

    /// Scale factor for all waiting times (0 = no waiting)
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Retries per contact
    #[arg(long)]
    pub retry_contact: Option<usize>,

    /// Retries per measurement (analysis errors only)
    #[arg(long)]
    pub retry_measurement: Option<usize>,

    /// Seed of the simulated station
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}
