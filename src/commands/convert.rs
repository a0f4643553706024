//! # convert 命令实现
//!
//! 批量转换导出的测量数据格式。
//!
//! ## 功能
//! - 读取 JSON / 纯文本数据
//! - 写出另一种格式，默认写到源文件旁
//! - 并行处理，已存在的输出默认跳过
//!
//! ## 依赖关系
//! - 使用 `cli/convert.rs` 定义的参数
//! - 使用 `batch/`, `parsers/data.rs`, `export/`

use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::cli::convert::{ConvertArgs, DataFormat};
use crate::error::{PqcError, Result};
use crate::export::{write_json_file, write_txt_file};
use crate::parsers::read_data_file;
use crate::utils::output;

use std::fs;
use std::path::{Path, PathBuf};

/// 执行 convert 命令
pub fn execute(args: ConvertArgs) -> Result<()> {
    output::print_header(&format!("Converting to {} format", args.to));

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)
        .recursive(args.recursive)
        .collect()?;

    if files.is_empty() {
        output::print_warning(&format!(
            "No files matched '{}' under {}",
            args.pattern,
            args.input.display()
        ));
        return Ok(());
    }
    output::print_info(&format!("Found {} files to convert", files.len()));

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).map_err(|e| PqcError::FileWriteError {
            path: dir.display().to_string(),
            source: e,
        })?;
    }

    let output_dir = args.output.as_deref();
    let result = BatchRunner::new(args.jobs).run(files, |file| {
        convert_file(file, output_dir, args.to, args.overwrite)
    })?;

    output::print_separator();
    output::print_done(&format!(
        "Converted {} file(s) to '{}' ({} skipped, {} failed)",
        result.success, args.to, result.skipped, result.failed
    ));

    if !result.failures.is_empty() {
        output::print_warning("Failed files:");
        for (path, err) in result.failures.iter().take(10) {
            output::print_error(&format!("  {}: {}", path, err));
        }
        if result.failures.len() > 10 {
            output::print_warning(&format!("  ... and {} more", result.failures.len() - 10));
        }
    }
    Ok(())
}

/// 输出路径：`<dir>/<stem>.<ext>`，未指定目录时与源文件同目录
pub fn output_path(input: &Path, output_dir: Option<&Path>, target: DataFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("measurement");
    let dir = output_dir
        .or_else(|| input.parent())
        .unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}.{}", stem, target.extension()))
}

/// 转换单个文件
pub fn convert_file(input: &Path, output_dir: Option<&Path>, target: DataFormat, overwrite: bool) -> ProcessResult {
    let name = input.display().to_string();
    let same_format = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(target.extension()))
        .unwrap_or(false);
    if same_format {
        return ProcessResult::Skipped(name);
    }

    let output = output_path(input, output_dir, target);
    if output.exists() && !overwrite {
        return ProcessResult::Skipped(name);
    }

    let result = read_data_file(input).and_then(|data| match target {
        DataFormat::Json => write_json_file(&data, &output),
        DataFormat::Txt => write_txt_file(&data, &output),
    });
    match result {
        Ok(()) => ProcessResult::Success(output.display().to_string()),
        Err(e) => ProcessResult::Failed(name, e.to_string()),
    }
}
