//! # 终端输出
//!
//! 命令行消息的统一前缀样式，测量结束状态按严重程度着色。
//!
//! ## 依赖关系
//! - 被 `main.rs` 与 `commands/` 使用
//! - 使用 `colored` crate

use crate::engine::sequence::MeasurementState;

use colored::{ColoredString, Colorize};

/// 标题栏与分隔线宽度
const RULE_WIDTH: usize = 60;

fn rule() -> ColoredString {
    "─".repeat(RULE_WIDTH).dimmed()
}

fn tagged(tag: ColoredString, msg: &str) -> String {
    format!("{} {}", tag, msg)
}

pub fn print_success(msg: &str) {
    println!("{}", tagged("[OK]".green().bold(), msg));
}

/// 错误写到 stderr
pub fn print_error(msg: &str) {
    eprintln!("{}", tagged("[ERR]".red().bold(), msg));
}

pub fn print_warning(msg: &str) {
    println!("{}", tagged("[WARN]".yellow().bold(), msg));
}

pub fn print_info(msg: &str) {
    println!("{}", tagged("[*]".blue().bold(), msg));
}

pub fn print_done(msg: &str) {
    println!("{}", tagged("[DONE]".green().bold(), msg));
}

/// 结束状态着色：成功绿色，合规 / 分析失败黄色，超时 / 错误红色，停止暗色
pub fn colorize_state(state: MeasurementState) -> ColoredString {
    let label = state.as_str();
    match state {
        MeasurementState::Success => label.green(),
        MeasurementState::Compliance | MeasurementState::AnalysisError => label.yellow(),
        MeasurementState::Timeout | MeasurementState::Error => label.red(),
        MeasurementState::Stopped => label.dimmed(),
    }
}

/// 打印未成功测量的计数
pub fn print_state_count(state: MeasurementState, count: usize) {
    print_warning(&format!("{}: {}", colorize_state(state), count));
}

pub fn print_header(title: &str) {
    println!("\n{}", rule());
    println!("  {}", title.bold());
    println!("{}\n", rule());
}

pub fn print_separator() {
    println!("{}", rule());
}

#[cfg(test)]
mod tests {
    use super::*;
    use colored::Color;

    #[test]
    fn test_state_colors() {
        assert_eq!(colorize_state(MeasurementState::Success).fgcolor(), Some(Color::Green));
        assert_eq!(colorize_state(MeasurementState::Compliance).fgcolor(), Some(Color::Yellow));
        assert_eq!(colorize_state(MeasurementState::AnalysisError).fgcolor(), Some(Color::Yellow));
        assert_eq!(colorize_state(MeasurementState::Timeout).fgcolor(), Some(Color::Red));
        assert_eq!(colorize_state(MeasurementState::Stopped).fgcolor(), None);
        assert_eq!(&*colorize_state(MeasurementState::Error), "Error");
    }
}
