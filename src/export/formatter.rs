//! # 表格格式化器
//!
//! 逐行写出带格式的分隔符表格。
//!
//! ## 功能
//! - `CsvFormatter`: 逗号分隔表格，列可指定数值格式
//! - `PqcFormatter`: 制表符分隔，列头带单位 `name[unit]`，表头前可写 `key: value` 元数据
//!
//! ## 依赖关系
//! - 被 `export/txt.rs`, `export/summary.rs` 调用
//! - 使用 `utils/format.rs` 的数值格式
//! - 使用 `csv` 库处理字段引号

use crate::error::{PqcError, Result};
use crate::utils::format::{format_e, format_g};

use std::io::Write;

/// 行结束符
const LINE_TERMINATOR: &[u8] = b"\n";

/// 数值格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatSpec {
    /// 原样输出
    #[default]
    Plain,
    /// `4.200000E+01`
    Exp,
    /// `+4.200000E+01`
    SignedExp,
    /// `%G` 风格
    General,
}

impl FormatSpec {
    /// 解析格式记号 `""`, `"E"`, `"+E"`, `"G"`
    pub fn parse(spec: &str) -> Result<Self> {
        match spec {
            "" => Ok(FormatSpec::Plain),
            "E" => Ok(FormatSpec::Exp),
            "+E" => Ok(FormatSpec::SignedExp),
            "G" => Ok(FormatSpec::General),
            other => Err(PqcError::FormatterError(format!(
                "unsupported format spec: {}",
                other
            ))),
        }
    }

    fn apply(&self, value: f64) -> String {
        match self {
            FormatSpec::Plain => value.to_string(),
            FormatSpec::Exp => format_e(value, false),
            FormatSpec::SignedExp => format_e(value, true),
            FormatSpec::General => format_g(value),
        }
    }
}

/// 单元格值
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    fn render(&self, spec: FormatSpec) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => spec.apply(*v),
            Cell::Bool(b) => b.to_string(),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

/// 表格列
#[derive(Debug, Clone)]
struct Column {
    name: String,
    label: String,
    spec: FormatSpec,
}

/// 分隔符表格格式化器
pub struct CsvFormatter<W: Write> {
    inner: W,
    delimiter: u8,
    columns: Vec<Column>,
    has_rows: bool,
}

impl<W: Write> CsvFormatter<W> {
    /// 逗号分隔
    pub fn new(inner: W) -> Self {
        Self::with_delimiter(inner, b',')
    }

    /// 指定分隔符
    pub fn with_delimiter(inner: W, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            columns: Vec::new(),
            has_rows: false,
        }
    }

    /// 列名列表
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// 添加列，列名重复时报错
    pub fn add_column(&mut self, name: &str, spec: FormatSpec) -> Result<()> {
        self.add_labeled_column(name, name, spec)
    }

    fn add_labeled_column(&mut self, name: &str, label: &str, spec: FormatSpec) -> Result<()> {
        if self.columns.iter().any(|c| c.name == name) {
            return Err(PqcError::FormatterError(format!(
                "column name already exists: {}",
                name
            )));
        }
        self.columns.push(Column {
            name: name.to_string(),
            label: label.to_string(),
            spec,
        });
        Ok(())
    }

    /// 写出表头，必须在数据行之前
    pub fn write_header(&mut self) -> Result<()> {
        if self.has_rows {
            return Err(PqcError::FormatterError(
                "header must be written before rows".to_string(),
            ));
        }
        let labels: Vec<String> = self.columns.iter().map(|c| c.label.clone()).collect();
        self.write_record(&labels)?;
        self.has_rows = true;
        Ok(())
    }

    /// 写出一行；缺失列留空，未知列报错
    pub fn write_row(&mut self, row: &[(&str, Cell)]) -> Result<()> {
        if let Some((key, _)) = row
            .iter()
            .find(|(key, _)| !self.columns.iter().any(|c| c.name == *key))
        {
            return Err(PqcError::FormatterError(format!(
                "row contains unknown column: {}",
                key
            )));
        }
        let fields: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(key, _)| *key == column.name)
                    .map(|(_, cell)| cell.render(column.spec))
                    .unwrap_or_default()
            })
            .collect();
        self.write_record(&fields)?;
        self.has_rows = true;
        Ok(())
    }

    /// 原样写出一行文本
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.write_bytes(line.as_bytes())?;
        self.write_bytes(LINE_TERMINATOR)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|e| PqcError::FileWriteError {
            path: "<formatter>".to_string(),
            source: e,
        })
    }

    /// 取回底层写入器
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    /// 通过 csv 编码单条记录（处理引号与转义）
    fn write_record(&mut self, fields: &[String]) -> Result<()> {
        if fields.is_empty() {
            return self.write_bytes(LINE_TERMINATOR);
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(fields)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| PqcError::FormatterError(e.to_string()))?;
        self.write_bytes(&bytes)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| PqcError::FileWriteError {
                path: "<formatter>".to_string(),
                source: e,
            })
    }
}

/// PQC 纯文本格式化器（制表符分隔）
pub struct PqcFormatter<W: Write> {
    inner: CsvFormatter<W>,
}

impl<W: Write> PqcFormatter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: CsvFormatter::with_delimiter(inner, b'\t'),
        }
    }

    /// 写出元数据行 `key: value`，必须在表头与数据行之前
    pub fn write_meta(&mut self, key: &str, value: impl Into<Cell>, spec: FormatSpec) -> Result<()> {
        if self.inner.has_rows {
            return Err(PqcError::FormatterError(
                "Meta data must be written before header/rows".to_string(),
            ));
        }
        let value = value.into().render(spec);
        self.inner.write_line(&format!("{}: {}", key, value))
    }

    /// 添加带单位的列，列头为 `name[unit]`
    pub fn add_column(&mut self, name: &str, spec: FormatSpec, unit: Option<&str>) -> Result<()> {
        let label = match unit {
            Some(unit) => format!("{}[{}]", name, unit),
            None => name.to_string(),
        };
        self.inner.add_labeled_column(name, &label, spec)
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.inner.write_header()
    }

    pub fn write_row(&mut self, row: &[(&str, Cell)]) -> Result<()> {
        self.inner.write_row(row)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> Result<W> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(bytes: Vec<u8>) -> Vec<String> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| l.trim().to_string())
            .collect()
    }

    #[test]
    fn test_csv_formatter() {
        let mut fmt = CsvFormatter::new(Vec::new());
        fmt.add_column("key", FormatSpec::Plain).unwrap();
        fmt.add_column("value", FormatSpec::parse("+E").unwrap()).unwrap();
        fmt.write_header().unwrap();
        fmt.write_row(&[("key", "spam".into()), ("value", 42.0.into())])
            .unwrap();
        fmt.write_row(&[("key", "eggs".into()), ("value", (-1.0).into())])
            .unwrap();
        assert_eq!(
            lines(fmt.into_inner().unwrap()),
            vec!["key,value", "spam,+4.200000E+01", "eggs,-1.000000E+00"]
        );
    }

    #[test]
    fn test_pqc_formatter() {
        let mut fmt = PqcFormatter::new(Vec::new());
        fmt.add_column("key", FormatSpec::Plain, None).unwrap();
        fmt.add_column("value", FormatSpec::SignedExp, None).unwrap();
        fmt.write_meta("param", 1.23, FormatSpec::General).unwrap();
        fmt.write_header().unwrap();
        fmt.write_row(&[("key", "spam".into()), ("value", 42.0.into())])
            .unwrap();
        assert_eq!(
            lines(fmt.into_inner().unwrap()),
            vec!["param: 1.23", "key\tvalue", "spam\t+4.200000E+01"]
        );
    }

    #[test]
    fn test_units_and_booleans() {
        let mut fmt = PqcFormatter::new(Vec::new());
        fmt.write_meta("accept_compliance", false, FormatSpec::Plain)
            .unwrap();
        fmt.add_column("voltage", FormatSpec::Exp, Some("V")).unwrap();
        fmt.write_header().unwrap();
        assert_eq!(
            lines(fmt.into_inner().unwrap()),
            vec!["accept_compliance: false", "voltage[V]"]
        );
    }

    #[test]
    fn test_ordering_errors() {
        let mut fmt = PqcFormatter::new(Vec::new());
        fmt.add_column("a", FormatSpec::Plain, None).unwrap();
        assert!(fmt.add_column("a", FormatSpec::Plain, Some("V")).is_err());
        fmt.write_header().unwrap();
        assert!(matches!(
            fmt.write_meta("late", "value", FormatSpec::Plain),
            Err(PqcError::FormatterError(_))
        ));
        assert!(fmt.write_header().is_err());
        assert!(fmt.write_row(&[("b", 1.0.into())]).is_err());
    }

    #[test]
    fn test_missing_cells_are_empty() {
        let mut fmt = CsvFormatter::new(Vec::new());
        fmt.add_column("a", FormatSpec::Plain).unwrap();
        fmt.add_column("b", FormatSpec::Plain).unwrap();
        fmt.write_row(&[("b", "x".into())]).unwrap();
        assert_eq!(lines(fmt.into_inner().unwrap()), vec![",x"]);
    }
}
