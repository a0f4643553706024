//! # 序列运行
//!
//! 对一个样品依次运行序列中启用的接触点与测量。
//!
//! ## 功能
//! - 接触点重试 `retry_contact_count` 次，每次内部测量重试 `retry_measurement_count` 次
//! - 仅分析失败（AnalysisError）的测量会被重试
//! - 记录样品 / 接触点 / 操作员等元数据
//! - 导出 JSON / TXT / PNG 文件并追加汇总 CSV
//! - 测量期间的日志写入同名 `.log` 文件
//! - 停止标志置位后提前结束
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 调用
//! - 使用 `engine/measurement.rs`, `export/`, `models/sequence.rs`

use crate::engine::measurement::{prepare, run_measurement, MeasurementContext};
use crate::error::{PqcError, Result};
use crate::export::plot::{default_axes, plot_series, PlotSpec};
use crate::export::summary::append_summary;
use crate::export::{write_json_file, write_txt_file};
use crate::instruments::Station;
use crate::models::sequence::{Sequence, SequenceContact, SequenceMeasurement};
use crate::models::settings::RunSettings;
use crate::models::MeasurementData;
use crate::utils::format::{make_iso, safe_filename};
use crate::utils::logfile;

use chrono::{DateTime, Local};
use indicatif::ProgressBar;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 元数据与汇总中的时间格式
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ─────────────────────────────────────────────────────────────
// 样品与状态
// ─────────────────────────────────────────────────────────────

/// 被测样品信息
#[derive(Debug, Clone, Default)]
pub struct SampleInfo {
    pub name: String,
    pub sample_type: String,
    pub position: String,
    pub comment: String,
}

impl SampleInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// 测量结束状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementState {
    Success,
    Compliance,
    AnalysisError,
    Timeout,
    Error,
    Stopped,
}

impl MeasurementState {
    /// 由运行结果推断状态
    pub fn from_result(result: &Result<()>, stopped: bool) -> Self {
        match result {
            Ok(()) if stopped => Self::Stopped,
            Ok(()) => Self::Success,
            Err(e) if e.is_compliance() => Self::Compliance,
            Err(e) if e.is_analysis() => Self::AnalysisError,
            Err(e) if e.is_timeout() => Self::Timeout,
            Err(_) => Self::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Compliance => "Compliance",
            Self::AnalysisError => "AnalysisError",
            Self::Timeout => "Timeout",
            Self::Error => "Error",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for MeasurementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次测量的结果
#[derive(Debug, Clone)]
pub struct MeasurementOutcome {
    pub contact_name: String,
    pub measurement_name: String,
    pub measurement_type: String,
    pub state: MeasurementState,
    pub message: Option<String>,
    pub files: Vec<PathBuf>,
}

/// 一次序列运行的报告
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<MeasurementOutcome>,
    pub stopped: bool,
}

impl RunReport {
    /// 指定状态的测量数量
    pub fn count(&self, state: MeasurementState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// 全部成功
    pub fn is_success(&self) -> bool {
        !self.stopped && self.outcomes.iter().all(|o| o.state == MeasurementState::Success)
    }
}

// ─────────────────────────────────────────────────────────────
// 文件名
// ─────────────────────────────────────────────────────────────

/// 输出文件基本名 `{sample}_{type}_{contact}_{measurement}_{timestamp}`
pub fn create_basename(
    sample: &SampleInfo,
    contact: &SequenceContact,
    measurement: &SequenceMeasurement,
    timestamp: &DateTime<Local>,
) -> String {
    let basename = format!(
        "{}_{}_{}_{}_{}",
        sample.name.trim(),
        sample.sample_type.trim(),
        contact.id,
        measurement.id,
        make_iso(timestamp)
    );
    safe_filename(&basename)
}

/// 样品输出目录 `<output_dir>/<sample>/`
pub fn sample_dir(output_dir: &Path, sample: &SampleInfo) -> PathBuf {
    output_dir.join(safe_filename(sample.name.trim()))
}

// ─────────────────────────────────────────────────────────────
// 运行器
// ─────────────────────────────────────────────────────────────

/// 序列运行器
pub struct SequenceRunner<'a> {
    settings: &'a RunSettings,
    stop: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(settings: &'a RunSettings, stop: Arc<AtomicBool>) -> Self {
        Self {
            settings,
            stop,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// 运行整个序列
    pub fn run(&self, sequence: &Sequence, sample: &SampleInfo, station: &mut Station) -> Result<RunReport> {
        let mut report = RunReport::default();
        tracing::info!("Run sequence '{}' for sample '{}'", sequence.name, sample.name);

        for contact in sequence.enabled_contacts() {
            if self.stop_requested() {
                break;
            }
            self.run_contact(contact, sample, station, &mut report)?;
        }

        report.stopped = self.stop_requested();
        tracing::info!(
            "Sequence '{}' finished: {} measurement(s), {} successful",
            sequence.name,
            report.outcomes.len(),
            report.count(MeasurementState::Success)
        );
        Ok(report)
    }

    fn run_contact(
        &self,
        contact: &SequenceContact,
        sample: &SampleInfo,
        station: &mut Station,
        report: &mut RunReport,
    ) -> Result<()> {
        tracing::info!("Process contact '{}'", contact.name);
        let retry_contact_count = self.settings.retry_contact_count;
        let retry_measurement_count = self.settings.retry_measurement_count;

        let mut pending: Vec<&SequenceMeasurement> = contact.enabled_measurements().collect();
        for retry_contact in 0..=retry_contact_count {
            if pending.is_empty() || self.stop_requested() {
                break;
            }
            if retry_contact > 0 {
                tracing::info!("Retry contact {}/{}...", retry_contact, retry_contact_count);
            }
            for retry_measurement in 0..=retry_measurement_count {
                if pending.is_empty() || self.stop_requested() {
                    break;
                }
                if retry_measurement > 0 {
                    tracing::info!(
                        "Retry measurement {}/{}...",
                        retry_measurement,
                        retry_measurement_count
                    );
                }
                pending = self.run_pending(&pending, contact, sample, station, report)?;
            }
        }
        Ok(())
    }

    /// 依次运行待测列表，返回需要重试的测量
    fn run_pending<'s>(
        &self,
        pending: &[&'s SequenceMeasurement],
        contact: &SequenceContact,
        sample: &SampleInfo,
        station: &mut Station,
        report: &mut RunReport,
    ) -> Result<Vec<&'s SequenceMeasurement>> {
        let mut failed = Vec::new();
        for measurement in pending {
            if self.stop_requested() {
                break;
            }
            let outcome = self.run_one(measurement, contact, sample, station)?;
            if outcome.state == MeasurementState::AnalysisError {
                failed.push(*measurement);
            }
            report.outcomes.push(outcome);
        }
        Ok(failed)
    }

    /// 运行单个测量并导出
    fn run_one(
        &self,
        measurement: &SequenceMeasurement,
        contact: &SequenceContact,
        sample: &SampleInfo,
        station: &mut Station,
    ) -> Result<MeasurementOutcome> {
        tracing::info!("Process measurement '{}'", measurement.name);
        let delay = self.settings.before_measurement_delay * self.settings.time_scale;
        if delay > 0.0 {
            thread::sleep(Duration::from_secs_f64(delay));
        }

        let output_dir = sample_dir(&self.settings.output_dir, sample);
        fs::create_dir_all(&output_dir).map_err(|e| PqcError::FileWriteError {
            path: output_dir.display().to_string(),
            source: e,
        })?;

        let timestamp = Local::now();
        let basename = create_basename(sample, contact, measurement, &timestamp);
        let mut files = Vec::new();
        let log_guard = if self.settings.write_logfiles {
            let path = output_dir.join(format!("{}.log", basename));
            let guard = logfile::global().open(&path)?;
            files.push(path);
            Some(guard)
        } else {
            None
        };

        let (data, result) = match prepare(&measurement.kind, &measurement.parameters) {
            Ok((kind, params)) => {
                let mut ctx = MeasurementContext::new(params, self.stop.clone())
                    .with_time_scale(self.settings.time_scale)
                    .with_environ(self.settings.use_environ);
                if let Some(pb) = &self.progress {
                    pb.set_prefix(format!("{} / {}", contact.name, measurement.name));
                    ctx = ctx.with_progress(pb.clone());
                }
                self.update_meta(&mut ctx.data, measurement, contact, sample, &timestamp);
                let result = run_measurement(kind.as_ref(), &mut ctx, station);
                (ctx.data, result)
            }
            Err(e) => {
                let mut data = MeasurementData::new();
                self.update_meta(&mut data, measurement, contact, sample, &timestamp);
                (data, Err(e))
            }
        };

        let state = MeasurementState::from_result(&result, self.stop_requested());
        let message = result.err().map(|e| e.to_string());
        match &message {
            Some(msg) => tracing::error!("{}: {}", measurement.name, msg),
            None => tracing::info!("{}: {}", measurement.name, state),
        }
        drop(log_guard);

        files.extend(self.export(&data, &output_dir, &basename)?);

        append_summary(
            &self.settings.summary_path(),
            &[
                ("Time", timestamp.format(TIMESTAMP_FORMAT).to_string()),
                ("Sample", sample.name.clone()),
                ("Type", sample.sample_type.clone()),
                ("Contact", contact.name.clone()),
                ("Measurement", measurement.name.clone()),
                ("Result", state.to_string()),
            ],
        )?;

        Ok(MeasurementOutcome {
            contact_name: contact.name.clone(),
            measurement_name: measurement.name.clone(),
            measurement_type: measurement.kind.clone(),
            state,
            message,
            files,
        })
    }

    fn update_meta(
        &self,
        data: &mut MeasurementData,
        measurement: &SequenceMeasurement,
        contact: &SequenceContact,
        sample: &SampleInfo,
        timestamp: &DateTime<Local>,
    ) {
        data.set_meta("uuid", uuid::Uuid::new_v4().to_string());
        data.set_meta("sample_name", sample.name.as_str());
        data.set_meta("sample_type", sample.sample_type.as_str());
        data.set_meta("sample_position", sample.position.as_str());
        data.set_meta("sample_comment", sample.comment.as_str());
        data.set_meta("contact_name", contact.name.as_str());
        data.set_meta("measurement_name", measurement.name.as_str());
        data.set_meta("measurement_type", measurement.kind.as_str());
        data.set_meta("measurement_tags", measurement.tags.clone());
        data.set_meta("table_position", self.settings.table_position.clone());
        data.set_meta("start_timestamp", timestamp.format(TIMESTAMP_FORMAT).to_string());
        data.set_meta("operator", self.settings.operator.as_str());
        data.set_meta("pqc_version", env!("CARGO_PKG_VERSION"));
    }

    /// 按设置写出 JSON / TXT / PNG
    fn export(&self, data: &MeasurementData, output_dir: &Path, basename: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if self.settings.write_plots {
            let axes = data.measurement_type().and_then(default_axes);
            if let Some((x, y)) = axes.filter(|_| data.row_count() > 0) {
                let path = output_dir.join(format!("{}.png", basename));
                let mut spec = PlotSpec::new(x, y);
                spec.title = basename.to_string();
                spec.abs_x = data.get_series(x).iter().all(|v| *v <= 0.0);
                match plot_series(data, &spec, &path) {
                    Ok(()) => files.push(path),
                    Err(e) => tracing::warn!("Failed to write plot {}: {}", path.display(), e),
                }
            }
        }
        if self.settings.serialize_json {
            let path = output_dir.join(format!("{}.json", basename));
            write_json_file(data, &path)?;
            files.push(path);
        }
        if self.settings.serialize_txt {
            let path = output_dir.join(format!("{}.txt", basename));
            write_txt_file(data, &path)?;
            files.push(path);
        }
        Ok(files)
    }
}
