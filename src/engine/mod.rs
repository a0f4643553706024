//! # 测量引擎
//!
//! 驱动测量的核心逻辑：扫描序列、进度估计、软件滤波、参数注册、
//! 测量生命周期、各测量类型与序列运行器。
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `instruments/`, `analysis/`, `export/`, `models/`

pub mod estimate;
pub mod filters;
pub mod measurement;
pub mod measurements;
pub mod parameters;
pub mod ramp;
pub mod roles;
pub mod sequence;

pub use measurement::{prepare, run_measurement, validate_measurement, MeasurementContext, MEASUREMENT_TYPES};
pub use sequence::{MeasurementState, RunReport, SampleInfo, SequenceRunner};
