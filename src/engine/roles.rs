//! # 仪器角色辅助
//!
//! 测量类型共用的仪器操作：参数注册、元数据记录、设置、带日志的读写、
//! 错误队列检查、compliance 检查与电压斜升。
//!
//! ## 功能
//! - [`Source`]: HV Source / V Source 源表
//! - [`Lcr`]: LCR 表（含软滤波读取）
//! - [`Elm`]: 静电计
//! - [`analyze_iv`] / [`analyze_cv`]: 运行参数 `analysis_functions` 中的分析函数
//!
//! ## 依赖关系
//! - 被 `engine/measurements/` 使用
//! - 使用 `instruments/`, `engine/ramp.rs`, `engine/filters.rs`, `analysis/`

use crate::analysis::{self, AnalysisInput};
use crate::engine::filters::{acquire_filtered, FilterOptions};
use crate::engine::measurement::MeasurementContext;
use crate::engine::parameters::{ParameterRegistry, ParameterSet};
use crate::engine::ramp::LinearRange;
use crate::error::{PqcError, Result};
use crate::instruments::{
    Electrometer, ElectrometerSetup, FilterType, InstrumentResultExt, IntegrationTime, LcrMeter,
    LcrSetup, OpenCorrectionMode, RouteTerminal, SenseMode, SourceFunction, SourceMeter,
};
use crate::models::quantity::Unit;
use crate::utils::format::{format_g, format_metric};

/// 快速斜升的步长 [V]
pub const QUICK_RAMP_STEP: f64 = 1.0;
/// 快速斜升每步的等待时间 [s]
pub const QUICK_RAMP_DELAY: f64 = 0.1;

fn parse_choice<T>(key: &str, value: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(value).ok_or_else(|| PqcError::InvalidParameter {
        key: key.to_string(),
        reason: format!("invalid parameter value: {}", value),
    })
}

fn to_count(key: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| PqcError::InvalidParameter {
        key: key.to_string(),
        reason: format!("expected non-negative integer, got {}", value),
    })
}

// ─────────────────────────────────────────────────────────────
// 源表
// ─────────────────────────────────────────────────────────────

/// 源表角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    HvSource,
    VSource,
}

impl SourceRole {
    /// 参数前缀与仪器角色键
    pub fn key(self) -> &'static str {
        match self {
            SourceRole::HvSource => "hvsrc",
            SourceRole::VSource => "vsrc",
        }
    }

    /// 日志中的显示名
    pub fn name(self) -> &'static str {
        match self {
            SourceRole::HvSource => "HV Source",
            SourceRole::VSource => "V Source",
        }
    }

    /// 带角色前缀的参数键
    pub fn param(self, suffix: &str) -> String {
        format!("{}_{}", self.key(), suffix)
    }

    /// 注册源表通用参数
    pub fn register(self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_choice(&self.param("sense_mode"), "local", &["local", "remote"])?;
        registry.register_choice(&self.param("route_terminal"), "rear", &["front", "rear"])?;
        registry.register_bool(&self.param("filter_enable"), false)?;
        registry.register_integer(&self.param("filter_count"), 10)?;
        registry.register_choice(&self.param("filter_type"), "repeat", &["repeat", "moving"])?;
        registry.register_bool(&self.param("source_voltage_autorange_enable"), true)?;
        registry.register_quantity(&self.param("source_voltage_range"), Unit::Volt, Some("20 V"))?;
        Ok(())
    }

    /// 记录源表通用参数
    pub fn update_meta(self, ctx: &mut MeasurementContext) -> Result<()> {
        ctx.meta_choice(&self.param("sense_mode"))?;
        ctx.meta_choice(&self.param("route_terminal"))?;
        ctx.meta_bool(&self.param("filter_enable"))?;
        ctx.meta_integer(&self.param("filter_count"))?;
        ctx.meta_choice(&self.param("filter_type"))?;
        ctx.meta_bool(&self.param("source_voltage_autorange_enable"))?;
        ctx.meta_quantity(&self.param("source_voltage_range"), "V")?;
        Ok(())
    }
}

/// 带角色信息的源表操作
pub struct Source<'a> {
    pub role: SourceRole,
    device: &'a mut dyn SourceMeter,
}

impl<'a> Source<'a> {
    pub fn new(role: SourceRole, device: &'a mut dyn SourceMeter) -> Self {
        Self { role, device }
    }

    /// 从测试台槽位取出源表
    pub fn from_slot(role: SourceRole, slot: &'a mut Option<Box<dyn SourceMeter>>) -> Result<Self> {
        let device = crate::instruments::role(slot, role.key())?;
        Ok(Self::new(role, device))
    }

    fn name(&self) -> &'static str {
        self.role.name()
    }

    /// 读取错误队列，非零错误码报错
    pub fn check_error(&mut self) -> Result<()> {
        let (code, message) = self.device.next_error().for_role(self.role.key())?;
        if code != 0 {
            let message = format!("{} error {}: {}", self.name(), code, message.trim_matches('"'));
            tracing::error!("{}", message);
            return Err(PqcError::Instrument {
                role: self.role.key().to_string(),
                message,
            });
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        tracing::info!("{} reset...", self.name());
        self.device.reset().for_role(self.role.key())?;
        self.device.clear().for_role(self.role.key())?;
        self.check_error()
    }

    /// 按参数设置端子、检测模式、滤波与量程
    pub fn setup(&mut self, params: &ParameterSet) -> Result<()> {
        let role = self.role;
        let key = role.key();

        let terminal = params.choice(&role.param("route_terminal"))?;
        let terminal = parse_choice(&role.param("route_terminal"), &terminal, RouteTerminal::from_name)?;
        tracing::info!("{} set route terminals: {}", self.name(), terminal);
        self.device.set_route_terminal(terminal).for_role(key)?;
        self.check_error()?;

        let sense = params.choice(&role.param("sense_mode"))?;
        let sense = parse_choice(&role.param("sense_mode"), &sense, SenseMode::from_name)?;
        tracing::info!("{} set sense mode: {}", self.name(), sense);
        self.device.set_sense_mode(sense).for_role(key)?;
        self.check_error()?;

        let filter_type = params.choice(&role.param("filter_type"))?;
        let filter_type = parse_choice(&role.param("filter_type"), &filter_type, FilterType::from_name)?;
        tracing::info!("{} set filter type: {}", self.name(), filter_type);
        self.device.set_filter_type(filter_type).for_role(key)?;
        self.check_error()?;

        let count_key = role.param("filter_count");
        let filter_count = to_count(&count_key, params.integer(&count_key)?)?;
        tracing::info!("{} set filter count: {}", self.name(), filter_count);
        self.device.set_filter_count(filter_count).for_role(key)?;
        self.check_error()?;

        let filter_enable = params.boolean(&role.param("filter_enable"))?;
        tracing::info!("{} set filter enable: {}", self.name(), filter_enable);
        self.device.set_filter_enable(filter_enable).for_role(key)?;
        self.check_error()?;

        if params.boolean(&role.param("source_voltage_autorange_enable"))? {
            tracing::info!("{} set source voltage autorange enable: true", self.name());
            self.device.set_source_voltage_autorange(true).for_role(key)?;
        } else {
            let range = params.quantity(&role.param("source_voltage_range"))?;
            tracing::info!("{} set source voltage range: {}", self.name(), format_metric(Some(range), "V", 3));
            self.device.set_source_voltage_range(range).for_role(key)?;
        }
        self.check_error()
    }

    pub fn set_function(&mut self, function: SourceFunction) -> Result<()> {
        tracing::info!("{} set source function: {:?}", self.name(), function);
        self.device.set_source_function(function).for_role(self.role.key())?;
        self.check_error()
    }

    pub fn voltage_level(&self) -> Result<f64> {
        self.device.voltage_level().for_role(self.role.key())
    }

    pub fn set_voltage_level(&mut self, voltage: f64) -> Result<()> {
        tracing::info!("{} set voltage level: {}", self.name(), format_metric(Some(voltage), "V", 3));
        self.device.set_voltage_level(voltage).for_role(self.role.key())?;
        self.check_error()
    }

    pub fn current_level(&self) -> Result<f64> {
        self.device.current_level().for_role(self.role.key())
    }

    pub fn set_current_level(&mut self, current: f64) -> Result<()> {
        tracing::info!("{} set current level: {}", self.name(), format_metric(Some(current), "A", 3));
        self.device.set_current_level(current).for_role(self.role.key())?;
        self.check_error()
    }

    /// 按源函数读取当前输出设定值
    pub fn level(&self, function: SourceFunction) -> Result<f64> {
        match function {
            SourceFunction::Voltage => self.voltage_level(),
            SourceFunction::Current => self.current_level(),
        }
    }

    pub fn set_level(&mut self, function: SourceFunction, value: f64) -> Result<()> {
        match function {
            SourceFunction::Voltage => self.set_voltage_level(value),
            SourceFunction::Current => self.set_current_level(value),
        }
    }

    pub fn set_current_compliance(&mut self, current: f64) -> Result<()> {
        tracing::info!("{} set current compliance: {}", self.name(), format_metric(Some(current), "A", 3));
        self.device.set_current_compliance(current).for_role(self.role.key())?;
        self.check_error()
    }

    pub fn set_voltage_compliance(&mut self, voltage: f64) -> Result<()> {
        tracing::info!("{} set voltage compliance: {}", self.name(), format_metric(Some(voltage), "V", 3));
        self.device.set_voltage_compliance(voltage).for_role(self.role.key())?;
        self.check_error()
    }

    pub fn compliance_tripped(&mut self) -> Result<bool> {
        self.device.compliance_tripped().for_role(self.role.key())
    }

    /// compliance 触发时报错
    pub fn check_compliance(&mut self) -> Result<()> {
        if self.compliance_tripped()? {
            let message = format!("{} in compliance!", self.name());
            tracing::error!("{}", message);
            return Err(PqcError::Compliance(message));
        }
        Ok(())
    }

    /// 扫描中的 compliance 检查：`accept` 时返回 `true` 以平稳结束扫描，否则报错
    pub fn check_compliance_accepted(&mut self, accept: bool) -> Result<bool> {
        if accept {
            let tripped = self.compliance_tripped()?;
            if tripped {
                tracing::info!("{} compliance tripped, gracefully stopping measurement.", self.name());
            }
            return Ok(tripped);
        }
        self.check_compliance().map(|_| false)
    }

    pub fn output(&self) -> Result<bool> {
        self.device.output().for_role(self.role.key())
    }

    pub fn set_output(&mut self, enabled: bool) -> Result<()> {
        tracing::info!("{} set output state: {}", self.name(), enabled);
        self.device.set_output(enabled).for_role(self.role.key())?;
        self.check_error()
    }

    pub fn read_current(&mut self) -> Result<f64> {
        let current = self.device.read_current().for_role(self.role.key())?;
        tracing::info!("{} current reading: {}", self.name(), format_metric(Some(current), "A", 3));
        Ok(current)
    }

    pub fn read_voltage(&mut self) -> Result<f64> {
        let voltage = self.device.read_voltage().for_role(self.role.key())?;
        tracing::info!("{} voltage reading: {}", self.name(), format_metric(Some(voltage), "V", 3));
        Ok(voltage)
    }

    /// 斜升到目标值，每步检查 compliance，收到停止请求时提前结束
    pub fn ramp_to(
        &mut self,
        ctx: &MeasurementContext,
        function: SourceFunction,
        end: f64,
        step: f64,
        delay: f64,
    ) -> Result<()> {
        let unit = function_unit(function);
        let begin = self.level(function)?;
        tracing::info!(
            "{} ramp: from {} to {} with step {}",
            self.name(),
            format_metric(Some(begin), unit, 3),
            format_metric(Some(end), unit, 3),
            format_metric(Some(step), unit, 3)
        );
        for value in &LinearRange::new(begin, end, step)? {
            ctx.set_message(&format!("{} {}", format_g(value), unit));
            self.set_level(function, value)?;
            ctx.sleep(delay);
            self.check_compliance()?;
            if ctx.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    /// 无条件斜降到零
    pub fn ramp_zero(&mut self, ctx: &MeasurementContext, function: SourceFunction, step: f64, delay: f64) -> Result<()> {
        let unit = function_unit(function);
        let begin = self.level(function)?;
        tracing::info!(
            "{} ramp to zero: from {} with step {}",
            self.name(),
            format_metric(Some(begin), unit, 3),
            format_metric(Some(step), unit, 3)
        );
        for value in &LinearRange::new(begin, 0.0, step)? {
            ctx.set_message(&format!("{} {}", format_g(value), unit));
            self.set_level(function, value)?;
            ctx.sleep(delay);
        }
        Ok(())
    }
}

fn function_unit(function: SourceFunction) -> &'static str {
    match function {
        SourceFunction::Voltage => "V",
        SourceFunction::Current => "A",
    }
}

// ─────────────────────────────────────────────────────────────
// LCR 表
// ─────────────────────────────────────────────────────────────

/// 注册 LCR 参数
/// 包装读数错误，超时保持原类型
pub fn read_error(role: &str, label: &str, error: PqcError) -> PqcError {
    match error {
        PqcError::Timeout { .. } => error,
        other => PqcError::Instrument {
            role: role.to_string(),
            message: format!("Failed to read from {}: {}", label, other),
        },
    }
}

pub fn register_lcr(registry: &mut ParameterRegistry) -> Result<()> {
    registry.register_bool("lcr_soft_filter", true)?;
    registry.register_quantity("lcr_amplitude", Unit::Volt, None)?;
    registry.register_quantity("lcr_frequency", Unit::Hertz, None)?;
    registry.register_choice("lcr_integration_time", "medium", &["short", "medium", "long"])?;
    registry.register_integer("lcr_averaging_rate", 1)?;
    registry.register_bool("lcr_auto_level_control", true)?;
    registry.register_choice("lcr_open_correction_mode", "single", &["single", "multi"])?;
    registry.register_integer("lcr_open_correction_channel", 0)?;
    Ok(())
}

/// 记录 LCR 参数
pub fn update_lcr_meta(ctx: &mut MeasurementContext) -> Result<()> {
    ctx.meta_quantity("lcr_amplitude", "V")?;
    ctx.meta_quantity("lcr_frequency", "Hz")?;
    ctx.meta_choice("lcr_integration_time")?;
    ctx.meta_integer("lcr_averaging_rate")?;
    ctx.meta_bool("lcr_auto_level_control")?;
    ctx.meta_choice("lcr_open_correction_mode")?;
    ctx.meta_integer("lcr_open_correction_channel")?;
    ctx.meta_bool("lcr_soft_filter")?;
    Ok(())
}

/// 由参数构造 LCR 设置
pub fn lcr_setup(params: &ParameterSet) -> Result<LcrSetup> {
    Ok(LcrSetup {
        amplitude: params.quantity("lcr_amplitude")?,
        frequency: params.quantity("lcr_frequency")?,
        integration_time: parse_choice(
            "lcr_integration_time",
            &params.choice("lcr_integration_time")?,
            IntegrationTime::from_name,
        )?,
        averaging_rate: to_count("lcr_averaging_rate", params.integer("lcr_averaging_rate")?)?,
        auto_level_control: params.boolean("lcr_auto_level_control")?,
        open_correction_mode: parse_choice(
            "lcr_open_correction_mode",
            &params.choice("lcr_open_correction_mode")?,
            OpenCorrectionMode::from_name,
        )?,
        open_correction_channel: to_count(
            "lcr_open_correction_channel",
            params.integer("lcr_open_correction_channel")?,
        )?,
    })
}

/// 带日志的 LCR 表操作
pub struct Lcr<'a> {
    device: &'a mut dyn LcrMeter,
}

impl<'a> Lcr<'a> {
    pub fn from_slot(slot: &'a mut Option<Box<dyn LcrMeter>>) -> Result<Self> {
        let device = crate::instruments::role(slot, "lcr")?;
        Ok(Self { device })
    }

    pub fn check_error(&mut self) -> Result<()> {
        let (code, message) = self.device.next_error().for_role("lcr")?;
        if code != 0 {
            let message = format!("LCR error {}: {}", code, message.trim_matches('"'));
            tracing::error!("{}", message);
            return Err(PqcError::Instrument {
                role: "lcr".to_string(),
                message,
            });
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.device.reset().for_role("lcr")?;
        self.check_error()
    }

    pub fn setup(&mut self, params: &ParameterSet) -> Result<()> {
        let setup = lcr_setup(params)?;
        tracing::info!("LCR Meter setup: {:?}", setup);
        self.device.configure(&setup).for_role("lcr")?;
        self.check_error()
    }

    pub fn bias_voltage(&self) -> Result<f64> {
        self.device.bias_voltage().for_role("lcr")
    }

    pub fn set_bias_voltage(&mut self, voltage: f64) -> Result<()> {
        tracing::info!("LCR Meter set voltage level: {}", format_metric(Some(voltage), "V", 3));
        self.device.set_bias_voltage(voltage).for_role("lcr")?;
        self.check_error()
    }

    pub fn bias_state(&self) -> Result<bool> {
        self.device.bias_state().for_role("lcr")
    }

    pub fn set_bias_state(&mut self, enabled: bool) -> Result<()> {
        tracing::info!("LCR Meter set voltage output state: {}", enabled);
        self.device.set_bias_state(enabled).for_role("lcr")?;
        self.check_error()
    }

    pub fn bias_current(&mut self) -> Result<f64> {
        let current = self.device.bias_current().for_role("lcr")?;
        tracing::info!("LCR Meter bias polarity current: {}", format_metric(Some(current), "A", 3));
        Ok(current)
    }

    /// 单次读数 (主, 副)
    pub fn acquire_reading(&mut self) -> Result<(f64, f64)> {
        let (prim, sec) = self.device.acquire_reading().for_role("lcr")?;
        tracing::info!("LCR Meter reading: {}-{}", prim, sec);
        Ok((prim, sec))
    }

    /// 读数，`soft_filter` 时重复采样直到稳定
    pub fn read(&mut self, soft_filter: bool) -> Result<(f64, f64)> {
        if soft_filter {
            acquire_filtered(|| self.acquire_reading(), FilterOptions::default())
        } else {
            self.acquire_reading()
        }
    }

    /// 以 1 V 步长快速斜升偏压
    pub fn quick_ramp(&mut self, ctx: &MeasurementContext, end: f64) -> Result<()> {
        let begin = self.bias_voltage()?;
        tracing::info!("LCR Meter quick ramp: from {} to {}", format_g(begin), format_g(end));
        for voltage in &LinearRange::new(begin, end, QUICK_RAMP_STEP)? {
            self.set_bias_voltage(voltage)?;
            ctx.sleep(QUICK_RAMP_DELAY);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// 静电计
// ─────────────────────────────────────────────────────────────

/// 注册静电计参数
pub fn register_elm(registry: &mut ParameterRegistry) -> Result<()> {
    registry.register_bool("elm_filter_enable", false)?;
    registry.register_integer("elm_filter_count", 10)?;
    registry.register_choice("elm_filter_type", "repeat", &["repeat", "moving"])?;
    registry.register_bool("elm_zero_correction", false)?;
    registry.register_integer("elm_integration_rate", 50)?;
    registry.register_quantity("elm_current_range", Unit::Ampere, Some("20 pA"))?;
    registry.register_bool("elm_current_autorange_enable", false)?;
    registry.register_quantity("elm_current_autorange_minimum", Unit::Ampere, Some("20 pA"))?;
    registry.register_quantity("elm_current_autorange_maximum", Unit::Ampere, Some("20 mA"))?;
    registry.register_quantity("elm_read_timeout", Unit::Second, Some("60 s"))
}

/// 记录静电计参数
pub fn update_elm_meta(ctx: &mut MeasurementContext) -> Result<()> {
    ctx.meta_bool("elm_filter_enable")?;
    ctx.meta_integer("elm_filter_count")?;
    ctx.meta_choice("elm_filter_type")?;
    ctx.meta_bool("elm_zero_correction")?;
    ctx.meta_integer("elm_integration_rate")?;
    ctx.meta_quantity("elm_current_range", "A")?;
    ctx.meta_bool("elm_current_autorange_enable")?;
    ctx.meta_quantity("elm_current_autorange_minimum", "A")?;
    ctx.meta_quantity("elm_current_autorange_maximum", "A")?;
    ctx.meta_quantity("elm_read_timeout", "s")?;
    Ok(())
}

fn zero_check_failed(enabled: bool) -> PqcError {
    let action = if enabled { "enable" } else { "disable" };
    PqcError::Instrument {
        role: "elm".to_string(),
        message: format!("failed to {} zero check", action),
    }
}

/// 由参数构造静电计设置
pub fn elm_setup(params: &ParameterSet) -> Result<ElectrometerSetup> {
    Ok(ElectrometerSetup {
        filter_enable: params.boolean("elm_filter_enable")?,
        filter_count: to_count("elm_filter_count", params.integer("elm_filter_count")?)?,
        filter_type: parse_choice("elm_filter_type", &params.choice("elm_filter_type")?, FilterType::from_name)?,
        zero_correction: params.boolean("elm_zero_correction")?,
        integration_rate: to_count("elm_integration_rate", params.integer("elm_integration_rate")?)?,
        current_range: params.quantity("elm_current_range")?,
        current_autorange_enable: params.boolean("elm_current_autorange_enable")?,
        current_autorange_minimum: params.quantity("elm_current_autorange_minimum")?,
        current_autorange_maximum: params.quantity("elm_current_autorange_maximum")?,
    })
}

/// 带日志的静电计操作
pub struct Elm<'a> {
    device: &'a mut dyn Electrometer,
}

impl<'a> Elm<'a> {
    pub fn from_slot(slot: &'a mut Option<Box<dyn Electrometer>>) -> Result<Self> {
        let device = crate::instruments::role(slot, "elm")?;
        Ok(Self { device })
    }

    pub fn check_error(&mut self) -> Result<()> {
        let (code, message) = self.device.next_error().for_role("elm")?;
        if code != 0 {
            let message = format!("Error {}: {}", code, message.trim_matches('"'));
            tracing::error!("{}", message);
            return Err(PqcError::Instrument {
                role: "elm".to_string(),
                message,
            });
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.device.reset().for_role("elm")?;
        self.check_error()
    }

    pub fn setup(&mut self, params: &ParameterSet) -> Result<()> {
        let setup = elm_setup(params)?;
        tracing::info!("ELM setup: {:?}", setup);
        self.device.configure(&setup).for_role("elm")?;
        self.check_error()
    }

    pub fn zero_check(&self) -> Result<bool> {
        self.device.zero_check().for_role("elm")
    }

    pub fn set_zero_check(&mut self, enabled: bool) -> Result<()> {
        tracing::info!("ELM set zero check: {}", enabled);
        self.device.set_zero_check(enabled).for_role("elm")?;
        self.check_error()
    }

    /// 复位后在零点检查下完成设置，再关闭零点检查
    pub fn prepare_reading(&mut self, params: &ParameterSet) -> Result<()> {
        self.reset()?;
        self.set_zero_check(true)?;
        if !self.zero_check()? {
            return Err(zero_check_failed(true));
        }
        self.setup(params)?;
        self.set_zero_check(false)?;
        if self.zero_check()? {
            return Err(zero_check_failed(false));
        }
        Ok(())
    }

    pub fn read_current(&mut self, timeout: f64) -> Result<f64> {
        let current = self.device.read_current(timeout).for_role("elm")?;
        tracing::info!("ELM current reading: {}", format_metric(Some(current), "A", 3));
        Ok(current)
    }
}

// ─────────────────────────────────────────────────────────────
// 分析
// ─────────────────────────────────────────────────────────────

fn run_analysis(ctx: &mut MeasurementContext, input: &AnalysisInput) -> Result<()> {
    if !input.is_sufficient() {
        tracing::info!("Not enough data points, skipping analysis.");
        return Ok(());
    }
    let functions = analysis::functions_from_configs(&ctx.params.list("analysis_functions")?)?;
    analysis::run_all(&functions, input, &mut ctx.data)?;
    Ok(())
}

/// 以电流、电压序列运行分析函数
pub fn analyze_iv(ctx: &mut MeasurementContext, i_key: &str, v_key: &str) -> Result<()> {
    let i = ctx.data.get_series(i_key).to_vec();
    let v = ctx.data.get_series(v_key).to_vec();
    run_analysis(ctx, &AnalysisInput::iv(&i, &v))
}

/// 以电容、电压序列运行分析函数
pub fn analyze_cv(ctx: &mut MeasurementContext, c_key: &str, v_key: &str) -> Result<()> {
    let c = ctx.data.get_series(c_key).to_vec();
    let v = ctx.data.get_series(v_key).to_vec();
    let r = ctx.data.get_series("resistance").to_vec();
    run_analysis(ctx, &AnalysisInput::cv(&c, &v).with_resistance(&r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::measurement::prepare;
    use crate::instruments::sim::{create_station, DeviceModel};
    use crate::models::parameter::parameters_from_yaml;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn context(yaml: &str) -> MeasurementContext {
        let values = parameters_from_yaml(&serde_yaml::from_str(yaml).unwrap());
        let (_, params) = prepare("iv_ramp", &values).unwrap();
        MeasurementContext::new(params, Arc::new(AtomicBool::new(false))).with_time_scale(0.0)
    }

    #[test]
    fn test_source_setup_and_error_queue() {
        let mut station = create_station(DeviceModel::default(), 3);
        let ctx = context("hvsrc_filter_count: 0");
        let mut hvsrc = Source::from_slot(SourceRole::HvSource, &mut station.hvsrc).unwrap();
        let err = hvsrc.setup(&ctx.params).unwrap_err();
        assert!(err.to_string().contains("HV Source error -222"));
    }

    #[test]
    fn test_ramp_stops_on_compliance() {
        let mut station = create_station(DeviceModel::default(), 3);
        let ctx = context("");
        let mut hvsrc = Source::from_slot(SourceRole::HvSource, &mut station.hvsrc).unwrap();
        hvsrc.reset().unwrap();
        hvsrc.set_current_compliance(1e-8).unwrap();
        hvsrc.set_output(true).unwrap();
        let err = hvsrc
            .ramp_to(&ctx, SourceFunction::Voltage, -1000.0, 100.0, 0.0)
            .unwrap_err();
        assert!(err.is_compliance());
        assert_eq!(err.to_string(), "Compliance tripped: HV Source in compliance!");
        let level = hvsrc.voltage_level().unwrap();
        assert!(level < 0.0 && level > -1000.0);

        hvsrc.ramp_zero(&ctx, SourceFunction::Voltage, 50.0, 0.0).unwrap();
        assert_eq!(hvsrc.voltage_level().unwrap(), 0.0);
    }

    #[test]
    fn test_lcr_requires_setup() {
        let mut station = create_station(DeviceModel::default(), 3);
        let ctx = context("lcr_amplitude: 250 mV\nlcr_frequency: 10 kHz");
        let mut lcr = Lcr::from_slot(&mut station.lcr).unwrap();
        lcr.reset().unwrap();
        assert!(lcr.read(false).is_err());
        // iv_ramp does not register lcr parameters
        assert!(lcr.setup(&ctx.params).is_err());
    }

    #[test]
    fn test_role_names() {
        assert_eq!(SourceRole::VSource.param("filter_count"), "vsrc_filter_count");
        assert_eq!(SourceRole::HvSource.name(), "HV Source");
    }
}
