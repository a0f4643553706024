//! # 仪器抽象层
//!
//! 按角色定义仪器接口，测量代码只依赖这些 trait。
//!
//! ## 角色
//! - `hvsrc` / `vsrc`: 源表 ([`SourceMeter`])
//! - `lcr`: LCR 表 ([`LcrMeter`])
//! - `elm`: 静电计 ([`Electrometer`])
//! - `environ`: 环境监测 ([`EnvironmentMonitor`])
//! - `matrix`: 开关矩阵 ([`SwitchMatrix`])
//!
//! ## 依赖关系
//! - 被 `engine/` 使用
//! - 子模块: sim（模拟测试台）

pub mod sim;

use crate::error::PqcError;

use std::fmt;
use thiserror::Error;

/// 仪器层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("error {code}: {message}")]
    Device { code: i32, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("communication failed: {0}")]
    Communication(String),
}

impl InstrumentError {
    /// 附加仪器角色，转换为统一错误
    pub fn with_role(self, role: &str) -> PqcError {
        match self {
            InstrumentError::Timeout(message) => PqcError::Timeout {
                role: role.to_string(),
                message,
            },
            other => PqcError::Instrument {
                role: role.to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

/// 为仪器调用结果附加角色
pub trait InstrumentResultExt<T> {
    fn for_role(self, role: &str) -> crate::error::Result<T>;
}

impl<T> InstrumentResultExt<T> for InstrumentResult<T> {
    fn for_role(self, role: &str) -> crate::error::Result<T> {
        self.map_err(|e| e.with_role(role))
    }
}

// ─────────────────────────────────────────────────────────────
// 设置枚举
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFunction {
    Voltage,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseMode {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTerminal {
    Front,
    Rear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Repeat,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationTime {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenCorrectionMode {
    Single,
    Multi,
}

macro_rules! impl_choice {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// 由参数文本解析
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => write!(f, $name),)+
                }
            }
        }
    };
}

impl_choice!(SenseMode { Local => "local", Remote => "remote" });
impl_choice!(RouteTerminal { Front => "front", Rear => "rear" });
impl_choice!(FilterType { Repeat => "repeat", Moving => "moving" });
impl_choice!(IntegrationTime { Short => "short", Medium => "medium", Long => "long" });
impl_choice!(OpenCorrectionMode { Single => "single", Multi => "multi" });

// ─────────────────────────────────────────────────────────────
// 角色接口
// ─────────────────────────────────────────────────────────────

/// 源表（电压/电流源 + 测量）
pub trait SourceMeter: Send {
    fn reset(&mut self) -> InstrumentResult<()>;
    fn clear(&mut self) -> InstrumentResult<()>;
    /// 读取错误队列，`(0, "No error")` 表示无错误
    fn next_error(&mut self) -> InstrumentResult<(i32, String)>;

    fn output(&self) -> InstrumentResult<bool>;
    fn set_output(&mut self, enabled: bool) -> InstrumentResult<()>;
    fn set_source_function(&mut self, function: SourceFunction) -> InstrumentResult<()>;

    fn voltage_level(&self) -> InstrumentResult<f64>;
    fn set_voltage_level(&mut self, voltage: f64) -> InstrumentResult<()>;
    fn current_level(&self) -> InstrumentResult<f64>;
    fn set_current_level(&mut self, current: f64) -> InstrumentResult<()>;

    fn set_current_compliance(&mut self, current: f64) -> InstrumentResult<()>;
    fn set_voltage_compliance(&mut self, voltage: f64) -> InstrumentResult<()>;
    fn compliance_tripped(&mut self) -> InstrumentResult<bool>;

    fn set_sense_mode(&mut self, mode: SenseMode) -> InstrumentResult<()>;
    fn set_route_terminal(&mut self, terminal: RouteTerminal) -> InstrumentResult<()>;
    fn set_filter_enable(&mut self, enabled: bool) -> InstrumentResult<()>;
    fn set_filter_count(&mut self, count: u32) -> InstrumentResult<()>;
    fn set_filter_type(&mut self, filter_type: FilterType) -> InstrumentResult<()>;
    fn set_source_voltage_autorange(&mut self, enabled: bool) -> InstrumentResult<()>;
    fn set_source_voltage_range(&mut self, voltage: f64) -> InstrumentResult<()>;

    fn read_current(&mut self) -> InstrumentResult<f64>;
    fn read_voltage(&mut self) -> InstrumentResult<f64>;
}

/// LCR 表设置
#[derive(Debug, Clone, PartialEq)]
pub struct LcrSetup {
    pub amplitude: f64,
    pub frequency: f64,
    pub integration_time: IntegrationTime,
    pub averaging_rate: u32,
    pub auto_level_control: bool,
    pub open_correction_mode: OpenCorrectionMode,
    pub open_correction_channel: u32,
}

/// LCR 表（Cp-Rp 测量，内置偏压源）
pub trait LcrMeter: Send {
    fn reset(&mut self) -> InstrumentResult<()>;
    fn next_error(&mut self) -> InstrumentResult<(i32, String)>;
    fn configure(&mut self, setup: &LcrSetup) -> InstrumentResult<()>;

    fn bias_voltage(&self) -> InstrumentResult<f64>;
    fn set_bias_voltage(&mut self, voltage: f64) -> InstrumentResult<()>;
    fn bias_state(&self) -> InstrumentResult<bool>;
    fn set_bias_state(&mut self, enabled: bool) -> InstrumentResult<()>;
    /// 偏压源电流
    fn bias_current(&mut self) -> InstrumentResult<f64>;

    /// 触发一次测量，返回 (主读数, 副读数)
    fn acquire_reading(&mut self) -> InstrumentResult<(f64, f64)>;
}

/// 静电计设置
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrometerSetup {
    pub filter_enable: bool,
    pub filter_count: u32,
    pub filter_type: FilterType,
    pub zero_correction: bool,
    pub integration_rate: u32,
    pub current_range: f64,
    pub current_autorange_enable: bool,
    pub current_autorange_minimum: f64,
    pub current_autorange_maximum: f64,
}

/// 静电计（微弱电流测量）
pub trait Electrometer: Send {
    fn reset(&mut self) -> InstrumentResult<()>;
    fn next_error(&mut self) -> InstrumentResult<(i32, String)>;
    fn configure(&mut self, setup: &ElectrometerSetup) -> InstrumentResult<()>;
    fn zero_check(&self) -> InstrumentResult<bool>;
    fn set_zero_check(&mut self, enabled: bool) -> InstrumentResult<()>;
    /// 读取电流，超过 `timeout` 秒未完成时返回超时
    fn read_current(&mut self, timeout: f64) -> InstrumentResult<f64>;
}

/// 环境读数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentData {
    pub box_temperature: f64,
    pub chuck_temperature: f64,
    pub box_humidity: f64,
}

/// 环境监测
pub trait EnvironmentMonitor: Send {
    fn read(&mut self) -> InstrumentResult<EnvironmentData>;
}

/// 开关矩阵
pub trait SwitchMatrix: Send {
    fn closed_channels(&mut self) -> InstrumentResult<Vec<String>>;
    fn close_channels(&mut self, channels: &[String]) -> InstrumentResult<()>;
    fn open_all(&mut self) -> InstrumentResult<()>;
}

// ─────────────────────────────────────────────────────────────
// 测试台
// ─────────────────────────────────────────────────────────────

/// 按角色组织的仪器集合
#[derive(Default)]
pub struct Station {
    pub hvsrc: Option<Box<dyn SourceMeter>>,
    pub vsrc: Option<Box<dyn SourceMeter>>,
    pub lcr: Option<Box<dyn LcrMeter>>,
    pub elm: Option<Box<dyn Electrometer>>,
    pub environ: Option<Box<dyn EnvironmentMonitor>>,
    pub matrix: Option<Box<dyn SwitchMatrix>>,
}

impl Station {
    /// 是否提供指定角色
    pub fn has_role(&self, key: &str) -> bool {
        match key {
            "hvsrc" => self.hvsrc.is_some(),
            "vsrc" => self.vsrc.is_some(),
            "lcr" => self.lcr.is_some(),
            "elm" => self.elm.is_some(),
            "environ" => self.environ.is_some(),
            "matrix" => self.matrix.is_some(),
            _ => false,
        }
    }

    /// 已配置的角色
    pub fn roles(&self) -> Vec<&'static str> {
        ["hvsrc", "vsrc", "lcr", "elm", "environ", "matrix"]
            .into_iter()
            .filter(|key| self.has_role(key))
            .collect()
    }
}

impl fmt::Debug for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Station").field("roles", &self.roles()).finish()
    }
}

/// 取出角色对应的仪器，缺失时报错
pub fn role<'a, T: ?Sized>(slot: &'a mut Option<Box<T>>, key: &str) -> crate::error::Result<&'a mut T> {
    slot.as_deref_mut().ok_or_else(|| PqcError::Instrument {
        role: key.to_string(),
        message: "instrument not available".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_names() {
        assert_eq!(SenseMode::from_name("remote"), Some(SenseMode::Remote));
        assert_eq!(RouteTerminal::from_name("rear"), Some(RouteTerminal::Rear));
        assert_eq!(FilterType::Moving.to_string(), "moving");
        assert_eq!(IntegrationTime::from_name("long"), Some(IntegrationTime::Long));
        assert_eq!(OpenCorrectionMode::from_name("both"), None);
    }

    #[test]
    fn test_error_with_role() {
        let err = InstrumentError::Timeout("no reading".into()).with_role("elm");
        assert!(err.is_timeout());
        let err = InstrumentError::Device {
            code: -113,
            message: "Undefined header".into(),
        }
        .with_role("hvsrc");
        assert_eq!(
            err.to_string(),
            "Instrument error (hvsrc): error -113: Undefined header"
        );
    }

    #[test]
    fn test_missing_role() {
        let mut station = Station::default();
        assert!(role(&mut station.hvsrc, "hvsrc").is_err());
        assert!(station.roles().is_empty());
    }
}
