//! # reference 命令实现
//!
//! 列出支持的测量类型，或打印一个类型的参数参考表。
//!
//! ## 依赖关系
//! - 使用 `cli/reference.rs` 定义的参数
//! - 使用 `engine/measurement.rs` 的注册表

use crate::cli::reference::ReferenceArgs;
use crate::engine::measurement::{build_registry, measurement_factory, reference_table, MEASUREMENT_TYPES};
use crate::engine::parameters::ReferenceRow;
use crate::error::Result;
use crate::utils::output;

use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Instruments")]
    instruments: String,
    #[tabled(rename = "Parameters")]
    parameters: usize,
}

#[derive(Debug, Clone, Tabled)]
struct ParameterRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Values")]
    values: String,
}

impl From<ReferenceRow> for ParameterRow {
    fn from(row: ReferenceRow) -> Self {
        Self {
            key: row.key,
            unit: row.unit,
            default: row.default,
            required: if row.required { "yes".to_string() } else { String::new() },
            values: row.values,
        }
    }
}

/// 执行 reference 命令
pub fn execute(args: ReferenceArgs) -> Result<()> {
    match args.measurement_type {
        Some(kind) => {
            let rows: Vec<ParameterRow> = reference_table(&kind)?.into_iter().map(ParameterRow::from).collect();
            output::print_header(&format!("Parameters of '{}'", kind));
            println!("{}", Table::new(&rows));
        }
        None => {
            let rows = type_rows()?;
            output::print_header("Measurement types");
            println!("{}", Table::new(&rows));
        }
    }
    Ok(())
}

fn type_rows() -> Result<Vec<TypeRow>> {
    MEASUREMENT_TYPES
        .iter()
        .map(|kind| {
            let measurement = measurement_factory(kind)?;
            let registry = build_registry(measurement.as_ref())?;
            Ok(TypeRow {
                kind: kind.to_string(),
                instruments: measurement.required_instruments().join(", "),
                parameters: registry.len(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_rows() {
        let rows = type_rows().unwrap();
        assert_eq!(rows.len(), MEASUREMENT_TYPES.len());
        let cv = rows.iter().find(|r| r.kind == "cv_ramp").unwrap();
        assert_eq!(cv.instruments, "hvsrc, lcr");
        assert!(cv.parameters > 5);
    }

    #[test]
    fn test_parameter_rows() {
        let rows: Vec<ParameterRow> = reference_table("iv_ramp")
            .unwrap()
            .into_iter()
            .map(ParameterRow::from)
            .collect();
        let stop = rows.iter().find(|r| r.key == "voltage_stop").unwrap();
        assert_eq!(stop.unit, "V");
        assert_eq!(stop.required, "yes");
        assert!(rows.iter().any(|r| r.key == "matrix_enable" && r.required.is_empty()));
    }
}
