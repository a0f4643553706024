//! # 数值与文本格式化
//!
//! 导出文件与终端显示共用的格式化函数。
//!
//! ## 功能
//! - 科学计数法 (`4.200000E+01`, `+4.200000E+01`)
//! - 通用格式 (`%G` 风格，用于元数据)
//! - SI 前缀显示 (`4.200 mA`)
//! - 安全文件名与时间戳
//!
//! ## 依赖关系
//! - 被 `export/`, `engine/`, `commands/` 使用
//! - 使用 `models/quantity.rs` 的前缀表

use crate::models::quantity::SI_PREFIXES;

use chrono::{DateTime, Local};

/// 特殊值（NaN/Inf）的大写表示
fn format_special(value: f64, plus: bool) -> Option<String> {
    if value.is_nan() {
        return Some(if plus { "+NAN" } else { "NAN" }.to_string());
    }
    if value.is_infinite() {
        let text = if value < 0.0 {
            "-INF"
        } else if plus {
            "+INF"
        } else {
            "INF"
        };
        return Some(text.to_string());
    }
    None
}

/// 拆分 Rust 的 `{:e}` 输出为 (尾数, 指数)
fn split_exponent(text: &str) -> (&str, i32) {
    match text.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

/// 科学计数法，6 位小数，指数至少两位
pub fn format_e(value: f64, plus: bool) -> String {
    if let Some(special) = format_special(value, plus) {
        return special;
    }
    let text = format!("{:.6e}", value);
    let (mantissa, exp) = split_exponent(&text);
    let sign = if exp < 0 { '-' } else { '+' };
    let prefix = if plus && !mantissa.starts_with('-') {
        "+"
    } else {
        ""
    };
    format!("{}{}E{}{:02}", prefix, mantissa, sign, exp.abs())
}

/// 通用格式：6 位有效数字，去除尾随零
pub fn format_g(value: f64) -> String {
    if let Some(special) = format_special(value, false) {
        return special;
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let text = format!("{:.5e}", value);
    let (mantissa, exp) = split_exponent(&text);
    if (-4..6).contains(&exp) {
        let decimals = (5 - exp).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, value))
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}E{}{:02}", strip_zeros(mantissa), sign, exp.abs())
    }
}

fn strip_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

/// 带 SI 前缀的数值显示，`None` 显示为 `---`
pub fn format_metric(value: Option<f64>, unit: &str, decimals: usize) -> String {
    let value = match value {
        Some(v) if v.is_finite() => v,
        Some(v) => return format!("{} {}", v, unit),
        None => return "---".to_string(),
    };
    for (prefix, scale) in SI_PREFIXES.iter() {
        if value.abs() >= *scale {
            return format!("{:.*} {}{}", decimals, value / scale, prefix, unit);
        }
    }
    format!("{:.*} {}", decimals, value, unit)
}

/// 开关状态显示
pub fn format_switch(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// 文件名中只保留字母、数字、`-`、`+`、`.` 与 `_`
pub fn safe_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut replaced = false;
    for c in name.chars() {
        if c.is_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
            result.push(c);
            replaced = false;
        } else if !replaced {
            result.push('_');
            replaced = true;
        }
    }
    result
}

/// 文件名用时间戳 `YYYY-MM-DDTHH-MM-SS`
pub fn make_iso(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// 秒数显示为 `H:MM:SS`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
