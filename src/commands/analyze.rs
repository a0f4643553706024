//! # analyze 命令实现
//!
//! 对导出的测量数据运行分析函数并校验限值。
//!
//! ## 功能
//! - 函数以名称或内联 YAML 映射给出
//! - 每个函数打印结果表与 PASS / FAIL
//! - `--update` 将结果写回 JSON 文件的 `analysis` 字段
//!
//! ## 依赖关系
//! - 使用 `cli/analyze.rs` 定义的参数
//! - 使用 `analysis/`, `parsers/data.rs`, `export/json.rs`

use crate::analysis::{input_from_data, AnalysisFunction, AnalysisResult, ResultValue};
use crate::cli::analyze::AnalyzeArgs;
use crate::error::{PqcError, Result};
use crate::export::write_json_file;
use crate::parsers::read_data_file;
use crate::utils::format::format_e;
use crate::utils::output;

use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
pub struct ResultRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// 结果表：标量用科学计数法，序列只显示长度
pub fn result_rows(result: &AnalysisResult) -> Vec<ResultRow> {
    result
        .values
        .iter()
        .map(|(key, value)| ResultRow {
            key: key.clone(),
            value: match value {
                ResultValue::Scalar(x) => format_e(*x, false),
                ResultValue::Series(xs) => format!("[{} values]", xs.len()),
            },
        })
        .collect()
}

/// 执行 analyze 命令
pub fn execute(args: AnalyzeArgs) -> Result<()> {
    output::print_header(&format!("Analyze {}", args.file.display()));

    let mut data = read_data_file(&args.file)?;
    let functions = args
        .functions
        .iter()
        .map(|f| AnalysisFunction::parse(f))
        .collect::<Result<Vec<_>>>()?;

    let results = {
        let input = input_from_data(&data)?;
        functions
            .iter()
            .map(|f| f.call(&input))
            .collect::<Result<Vec<_>>>()?
    };

    let mut failed = 0;
    for (function, result) in functions.iter().zip(&results) {
        output::print_info(&format!("Function '{}'", function.kind));
        println!("{}", Table::new(result_rows(result)));
        match function.verify(result) {
            Ok(()) => output::print_success(&format!("{}: PASS", function.kind)),
            Err(e) => {
                output::print_error(&format!("{}: FAIL ({})", function.kind, e));
                failed += 1;
            }
        }
    }

    if args.update {
        let is_json = args
            .file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            for result in &results {
                data.set_analysis(&result.name, result.to_json());
            }
            write_json_file(&data, &args.file)?;
            output::print_success(&format!("Results written to '{}'", args.file.display()));
        } else {
            output::print_warning("--update is only supported for JSON files");
        }
    }

    if failed > 0 {
        return Err(PqcError::Analysis(format!(
            "{} of {} function(s) out of limits",
            failed,
            functions.len()
        )));
    }
    Ok(())
}
