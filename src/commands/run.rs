//! # run 命令实现
//!
//! 在模拟测试台上对一个样品运行测量序列。
//!
//! ## 功能
//! - 加载运行设置并应用命令行覆盖
//! - 进度条显示当前接触点 / 测量与扫描状态
//! - 打印每个测量的结果表
//! - 任一测量未成功时返回非零退出码
//! - Ctrl-C 置位停止标志，当前测量收尾后结束序列
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `engine/sequence.rs`, `instruments/sim.rs`, `parsers/config.rs`

use crate::cli::run::RunArgs;
use crate::engine::sequence::{MeasurementState, RunReport, SampleInfo, SequenceRunner};
use crate::error::{PqcError, Result};
use crate::instruments::sim::{create_station, DeviceModel};
use crate::models::RunSettings;
use crate::parsers::load_sequence;
use crate::utils::format::format_switch;
use crate::utils::{output, progress};

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Contact")]
    contact: String,
    #[tabled(rename = "Measurement")]
    measurement: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Result")]
    state: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Message")]
    message: String,
}

/// 执行 run 命令
pub fn execute(args: RunArgs) -> Result<()> {
    let settings = build_settings(&args)?;
    let sequence = load_sequence(&args.sequence)?;

    output::print_header(&format!("Sequence: {}", sequence.name));

    let sample = SampleInfo {
        name: args.sample_name.clone(),
        sample_type: args.sample_type.clone(),
        position: args.sample_position.clone(),
        comment: args.comment.clone(),
    };
    let enabled: usize = sequence
        .enabled_contacts()
        .map(|c| c.enabled_measurements().count())
        .sum();
    output::print_info(&format!("Sample: {} ({})", sample.name, sample.sample_type));
    output::print_info(&format!("Output directory: {}", settings.output_dir.display()));
    output::print_info(&format!(
        "JSON {} | TXT {} | Plots {} | Logs {}",
        format_switch(settings.serialize_json),
        format_switch(settings.serialize_txt),
        format_switch(settings.write_plots),
        format_switch(settings.write_logfiles)
    ));
    output::print_info(&format!("{} enabled measurement(s)", enabled));

    fs::create_dir_all(&settings.output_dir).map_err(|e| PqcError::FileWriteError {
        path: settings.output_dir.display().to_string(),
        source: e,
    })?;

    let mut station = create_station(DeviceModel::default(), args.seed);
    output::print_info(&format!("Simulated station: {}", station.roles().join(", ")));

    let stop = Arc::new(AtomicBool::new(false));
    install_stop_handler(&stop);
    let pb = progress::create_measurement_bar();
    let t0 = Instant::now();
    let report = SequenceRunner::new(&settings, stop)
        .with_progress(pb.clone())
        .run(&sequence, &sample, &mut station);
    pb.finish_and_clear();
    let report = report?;

    print_report(&report);
    output::print_separator();

    let failed = report.outcomes.len() - report.count(MeasurementState::Success);
    if report.stopped {
        output::print_warning("Sequence stopped");
    }
    if failed > 0 {
        return Err(PqcError::Other(format!(
            "{} of {} measurement(s) did not succeed",
            failed,
            report.outcomes.len()
        )));
    }
    output::print_done(&format!(
        "{} measurement(s) in {:.1} s, summary '{}'",
        report.outcomes.len(),
        t0.elapsed().as_secs_f64(),
        settings.summary_path().display()
    ));
    Ok(())
}

/// 收到 Ctrl-C 时调用
fn stop_handler(stop: Arc<AtomicBool>) -> impl FnMut() + Send + 'static {
    move || {
        if !stop.swap(true, Ordering::SeqCst) {
            tracing::warn!("Stop requested, finishing current measurement");
        }
    }
}

fn install_stop_handler(stop: &Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(stop_handler(Arc::clone(stop))) {
        tracing::warn!("Failed to install Ctrl-C handler: {}", e);
    }
}

/// 设置文件 + 命令行覆盖
pub fn build_settings(args: &RunArgs) -> Result<RunSettings> {
    let mut settings = match &args.settings {
        Some(path) => RunSettings::load(path)?,
        None => RunSettings::default(),
    };
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(operator) = &args.operator {
        settings.operator = operator.clone();
    }
    if args.no_json {
        settings.serialize_json = false;
    }
    if args.no_txt {
        settings.serialize_txt = false;
    }
    if args.no_log {
        settings.write_logfiles = false;
    }
    if args.plot {
        settings.write_plots = true;
    }
    if args.environ {
        settings.use_environ = true;
    }
    if let Some(time_scale) = args.time_scale {
        settings.time_scale = time_scale;
    }
    if let Some(count) = args.retry_contact {
        settings.retry_contact_count = count;
    }
    if let Some(count) = args.retry_measurement {
        settings.retry_measurement_count = count;
    }
    settings.validate()?;
    Ok(settings)
}

fn print_report(report: &RunReport) {
    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|o| OutcomeRow {
            contact: o.contact_name.clone(),
            measurement: o.measurement_name.clone(),
            kind: o.measurement_type.clone(),
            state: o.state.to_string(),
            files: o.files.len(),
            message: o.message.clone().unwrap_or_default(),
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", Table::new(&rows));
    }
    for state in [
        MeasurementState::Compliance,
        MeasurementState::AnalysisError,
        MeasurementState::Timeout,
        MeasurementState::Error,
    ] {
        let count = report.count(state);
        if count > 0 {
            output::print_state_count(state, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::io::Write;
    use tempfile::TempDir;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["pqc", "run", "--sequence", "seq.yaml", "--sample-name", "S1"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_settings_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "operator: alice\nretry_contact_count: 2\nwrite_plots: false").unwrap();

        let args = run_args(&[
            "--settings",
            path.to_str().unwrap(),
            "--operator",
            "bob",
            "--no-json",
            "--plot",
            "--time-scale",
            "0.5",
        ]);
        let settings = build_settings(&args).unwrap();
        assert_eq!(settings.operator, "bob");
        assert_eq!(settings.retry_contact_count, 2);
        assert!(!settings.serialize_json);
        assert!(settings.serialize_txt);
        assert!(settings.write_plots);
        assert_eq!(settings.time_scale, 0.5);
    }

    #[test]
    fn test_stop_handler_sets_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handler = stop_handler(Arc::clone(&stop));
        handler();
        assert!(stop.load(Ordering::SeqCst));
        handler();
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_negative_time_scale_rejected() {
        let args = run_args(&["--time-scale=-1"]);
        assert!(build_settings(&args).is_err());
    }

    #[test]
    fn test_execute_writes_summary() {
        let dir = TempDir::new().unwrap();
        let sequence = dir.path().join("seq.yaml");
        fs::write(
            &sequence,
            "id: s\nname: S\ncontacts:\n  - name: Diode\n    contact_id: diode\n    measurements:\n      - name: IV\n        type: iv_ramp\n        parameters:\n          voltage_start: 0 V\n          voltage_stop: -10 V\n          voltage_step: 5 V\n          waiting_time: 1 s\n          hvsrc_current_compliance: 1 uA\n",
        )
        .unwrap();
        let out = dir.path().join("out");

        let mut args = run_args(&["--time-scale", "0"]);
        args.sequence = sequence;
        args.output_dir = Some(out.clone());
        execute(args).unwrap();

        let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
        assert_eq!(summary.lines().count(), 2);
        assert!(out.join("S1").is_dir());
        let logs = fs::read_dir(out.join("S1"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().map_or(false, |x| x == "log"))
            .count();
        assert_eq!(logs, 1);
    }
}
