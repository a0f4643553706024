//! # 测量生命周期
//!
//! 定义测量类型接口 [`Measurement`] 与运行上下文 [`MeasurementContext`]，
//! 并按固定顺序驱动一次测量：
//!
//! 1. 校验参数
//! 2. `matrix_enable` 时闭合矩阵通道
//! 3. initialize → measure
//! 4. finalize（总是执行）
//! 5. analyze（总是在 finalize 之后执行）
//! 6. 打开全部矩阵通道
//!
//! 多个步骤失败时以第一个错误为准。
//!
//! ## 依赖关系
//! - 被 `engine/sequence.rs`, `commands/` 使用
//! - 使用 `engine/parameters.rs`, `engine/measurements/`, `instruments/`

use crate::engine::measurements;
use crate::engine::parameters::{ParameterRegistry, ParameterSet, ReferenceRow};
use crate::error::{PqcError, Result};
use crate::instruments::{
    EnvironmentData, EnvironmentMonitor, InstrumentResultExt, Station, SwitchMatrix,
};
use crate::models::parameter::{ParameterValue, Parameters};
use crate::models::MeasurementData;
use crate::utils::format::format_g;

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 支持的测量类型
pub const MEASUREMENT_TYPES: [&str; 9] = [
    "iv_ramp",
    "iv_ramp_elm",
    "iv_ramp_bias",
    "iv_ramp_bias_elm",
    "iv_ramp_4_wire",
    "cv_ramp",
    "cv_ramp_vsrc",
    "cv_ramp_alt",
    "frequency_scan",
];

/// `wait` 的轮询间隔（秒）
const WAIT_INTERVAL: f64 = 1.0;

// ─────────────────────────────────────────────────────────────
// 运行上下文
// ─────────────────────────────────────────────────────────────

/// 单次测量的运行上下文
#[derive(Debug)]
pub struct MeasurementContext {
    pub params: ParameterSet,
    pub data: MeasurementData,
    stop: Arc<AtomicBool>,
    time_scale: f64,
    use_environ: bool,
    environment: EnvironmentData,
    progress: Option<ProgressBar>,
}

fn no_environment() -> EnvironmentData {
    EnvironmentData {
        box_temperature: f64::NAN,
        chuck_temperature: f64::NAN,
        box_humidity: f64::NAN,
    }
}

impl MeasurementContext {
    pub fn new(params: ParameterSet, stop: Arc<AtomicBool>) -> Self {
        Self {
            params,
            data: MeasurementData::new(),
            stop,
            time_scale: 1.0,
            use_environ: false,
            environment: no_environment(),
            progress: None,
        }
    }

    /// 等待时间缩放因子，0 表示不等待
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_environ(mut self, use_environ: bool) -> Self {
        self.use_environ = use_environ;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// 按缩放因子休眠
    pub fn sleep(&self, seconds: f64) {
        let scaled = seconds * self.time_scale;
        if scaled > 0.0 && scaled.is_finite() {
            thread::sleep(Duration::from_secs_f64(scaled));
        }
    }

    /// 可被停止请求打断的等待
    pub fn wait(&self, seconds: f64) {
        if !(seconds > 0.0) {
            return;
        }
        tracing::info!("Waiting {} s...", format_g(seconds));
        let mut remaining = seconds;
        while remaining > 0.0 && !self.stop_requested() {
            self.set_message(&format!("Waiting... {} s", format_g(remaining.ceil())));
            let interval = remaining.min(WAIT_INTERVAL);
            self.sleep(interval);
            remaining -= interval;
        }
        self.set_message("");
    }

    pub fn set_message(&self, message: &str) {
        if !message.is_empty() {
            tracing::debug!("{}", message);
        }
        if let Some(pb) = &self.progress {
            pb.set_message(message.to_string());
        }
    }

    pub fn set_progress(&self, value: usize, maximum: usize) {
        if let Some(pb) = &self.progress {
            pb.set_length(maximum as u64);
            pb.set_position(value as u64);
        }
    }

    /// 以 `"<值> <单位>"` 形式记录物理量元数据
    pub fn set_meta_quantity(&mut self, key: &str, value: f64, unit: &str) {
        self.data.set_meta(key, format!("{} {}", format_g(value), unit));
    }

    /// 读取参数并以物理量形式记录元数据
    pub fn meta_quantity(&mut self, key: &str, unit: &str) -> Result<f64> {
        let value = self.params.quantity(key)?;
        self.set_meta_quantity(key, value, unit);
        Ok(value)
    }

    pub fn meta_bool(&mut self, key: &str) -> Result<bool> {
        let value = self.params.boolean(key)?;
        self.data.set_meta(key, value);
        Ok(value)
    }

    pub fn meta_integer(&mut self, key: &str) -> Result<i64> {
        let value = self.params.integer(key)?;
        self.data.set_meta(key, value);
        Ok(value)
    }

    pub fn meta_choice(&mut self, key: &str) -> Result<String> {
        let value = self.params.choice(key)?;
        self.data.set_meta(key, value.as_str());
        Ok(value)
    }

    /// 当前 Unix 时间戳（秒）
    pub fn timestamp(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }

    /// 注册环境序列
    pub fn register_environment(&mut self) -> Result<()> {
        for (key, unit) in [
            ("temperature_box", "degC"),
            ("temperature_chuck", "degC"),
            ("humidity_box", "%"),
        ] {
            self.data.set_series_unit(key, unit);
            self.data.register_series(key)?;
        }
        Ok(())
    }

    /// 更新环境读数；未启用时为 NaN
    pub fn update_environment(&mut self, monitor: &mut Option<Box<dyn EnvironmentMonitor>>) -> Result<()> {
        self.environment = no_environment();
        if !self.use_environ {
            return Ok(());
        }
        let Some(monitor) = monitor.as_deref_mut() else {
            return Err(PqcError::Instrument {
                role: "environ".to_string(),
                message: "instrument not available".to_string(),
            });
        };
        let env = monitor.read().for_role("environ")?;
        tracing::info!("Box temperature: {:.2} degC", env.box_temperature);
        tracing::info!("Chuck temperature: {:.2} degC", env.chuck_temperature);
        tracing::info!("Box humidity: {:.2} %rH", env.box_humidity);
        self.environment = env;
        Ok(())
    }

    /// 环境序列的当前行
    pub fn environment_row(&self) -> [(&'static str, f64); 3] {
        [
            ("temperature_box", self.environment.box_temperature),
            ("temperature_chuck", self.environment.chuck_temperature),
            ("humidity_box", self.environment.box_humidity),
        ]
    }
}

// ─────────────────────────────────────────────────────────────
// 测量类型接口
// ─────────────────────────────────────────────────────────────

/// 测量类型
pub trait Measurement {
    fn measurement_type(&self) -> &'static str;

    /// 需要的仪器角色
    fn required_instruments(&self) -> &'static [&'static str];

    /// 注册本类型的参数
    fn register(&self, registry: &mut ParameterRegistry) -> Result<()>;

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()>;

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()>;

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()>;

    fn analyze(&self, _ctx: &mut MeasurementContext) -> Result<()> {
        Ok(())
    }
}

/// 按类型名创建测量
pub fn measurement_factory(kind: &str) -> Result<Box<dyn Measurement>> {
    let measurement: Box<dyn Measurement> = match kind {
        "iv_ramp" => Box::new(measurements::IvRamp),
        "iv_ramp_elm" => Box::new(measurements::IvRampElm),
        "iv_ramp_bias" => Box::new(measurements::IvRampBias),
        "iv_ramp_bias_elm" => Box::new(measurements::IvRampBiasElm),
        "iv_ramp_4_wire" => Box::new(measurements::IvRamp4Wire),
        "cv_ramp" => Box::new(measurements::CvRamp::hvsrc()),
        "cv_ramp_vsrc" => Box::new(measurements::CvRamp::vsrc()),
        "cv_ramp_alt" => Box::new(measurements::CvRampAlt),
        "frequency_scan" => Box::new(measurements::FrequencyScan),
        other => return Err(PqcError::UnknownMeasurementType(other.to_string())),
    };
    Ok(measurement)
}

/// 构建参数注册表（公共参数 + 类型参数）
pub fn build_registry(measurement: &dyn Measurement) -> Result<ParameterRegistry> {
    let mut registry = ParameterRegistry::new();
    registry.register_bool("matrix_enable", false)?;
    registry.register_list("matrix_channels")?;
    registry.register_list("analysis_functions")?;
    measurement.register(&mut registry)?;
    Ok(registry)
}

/// 参数参考表
pub fn reference_table(kind: &str) -> Result<Vec<ReferenceRow>> {
    let measurement = measurement_factory(kind)?;
    Ok(build_registry(measurement.as_ref())?.reference_rows())
}

/// 创建测量及其参数集
pub fn prepare(kind: &str, values: &Parameters) -> Result<(Box<dyn Measurement>, ParameterSet)> {
    let measurement = measurement_factory(kind)?;
    let registry = build_registry(measurement.as_ref())?;
    Ok((measurement, ParameterSet::new(registry, values.clone())))
}

/// 校验一个测量的参数，返回警告
pub fn validate_measurement(kind: &str, values: &Parameters) -> Result<Vec<String>> {
    let (_, params) = prepare(kind, values)?;
    let warnings = params.validate()?;
    crate::analysis::functions_from_configs(&params.list("analysis_functions")?)?;
    Ok(warnings)
}

// ─────────────────────────────────────────────────────────────
// 矩阵
// ─────────────────────────────────────────────────────────────

fn channel_names(values: &[ParameterValue]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn sorted(mut channels: Vec<String>) -> Vec<String> {
    channels.sort();
    channels
}

/// 闭合矩阵通道并核对
fn close_matrix(matrix: &mut dyn SwitchMatrix, channels: &[String]) -> Result<()> {
    let fail = |reason: String| PqcError::Instrument {
        role: "matrix".to_string(),
        message: format!("Failed to close matrix channels {:?}, {}", channels, reason),
    };
    tracing::info!("Matrix close channels: {:?}", channels);
    let closed = matrix.closed_channels().map_err(|e| fail(e.to_string()))?;
    if !closed.is_empty() {
        return Err(fail(format!(
            "Some matrix channels are still closed, please verify the situation and open closed channels. Closed channels: {:?}",
            closed
        )));
    }
    if !channels.is_empty() {
        matrix.close_channels(channels).map_err(|e| fail(e.to_string()))?;
        let closed = matrix.closed_channels().map_err(|e| fail(e.to_string()))?;
        if sorted(closed) != sorted(channels.to_vec()) {
            return Err(fail("mismatch in closed channels".to_string()));
        }
    }
    Ok(())
}

fn open_matrix(station: &mut Station) -> Result<()> {
    tracing::info!("Matrix open all channels.");
    let matrix = crate::instruments::role(&mut station.matrix, "matrix")?;
    matrix.open_all().for_role("matrix")
}

// ─────────────────────────────────────────────────────────────
// 运行
// ─────────────────────────────────────────────────────────────

/// 带日志的步骤执行
fn annotate(step: &str, kind: &str, f: impl FnOnce() -> Result<()>) -> Result<()> {
    tracing::info!("{} {}...", step, kind);
    let result = f();
    match &result {
        Ok(()) => tracing::info!("{} {}... done.", step, kind),
        Err(_) => tracing::info!("{} {}... failed.", step, kind),
    }
    result
}

fn run_steps(measurement: &dyn Measurement, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
    let kind = measurement.measurement_type();
    let mut result = annotate("Initialize", kind, || measurement.initialize(ctx, station));
    if result.is_ok() {
        result = annotate("Measure", kind, || measurement.measure(ctx, station));
    }
    let finalized = annotate("Finalize", kind, || measurement.finalize(ctx, station));
    result = result.and(finalized);
    let analyzed = annotate("Analyze", kind, || measurement.analyze(ctx));
    result.and(analyzed)
}

/// 运行一次测量
pub fn run_measurement(
    measurement: &dyn Measurement,
    ctx: &mut MeasurementContext,
    station: &mut Station,
) -> Result<()> {
    ctx.params.validate()?;
    ctx.data.set_meta("measurement_type", measurement.measurement_type());
    for key in measurement.required_instruments() {
        if !station.has_role(key) {
            return Err(PqcError::Instrument {
                role: key.to_string(),
                message: "instrument not available".to_string(),
            });
        }
    }

    let matrix_enable = ctx.params.boolean("matrix_enable")?;
    if matrix_enable {
        let channels = channel_names(&ctx.params.list("matrix_channels")?);
        let matrix = crate::instruments::role(&mut station.matrix, "matrix")?;
        close_matrix(matrix, &channels)?;
    }

    let mut result = run_steps(measurement, ctx, station);

    if matrix_enable {
        let opened = open_matrix(station);
        if let Err(e) = &opened {
            tracing::error!("{}", e);
        }
        result = result.and(opened);
    }
    result
}
