//! # 测量类型
//!
//! ## 类型
//! - `iv_ramp`: HV Source 电压扫描，读取源表电流
//! - `iv_ramp_elm`: HV Source 电压扫描，静电计读取电流
//! - `iv_ramp_bias`: HV Source 电压扫描，V Source 施加偏压
//! - `iv_ramp_bias_elm`: 同上，静电计读取电流
//! - `iv_ramp_4_wire`: V Source 电流扫描（四线法）
//! - `cv_ramp` / `cv_ramp_vsrc`: 源表偏压扫描，LCR 读取电容
//! - `cv_ramp_alt`: LCR 内置偏压扫描
//! - `frequency_scan`: 仅设置仪器
//!
//! ## 依赖关系
//! - 被 `engine/measurement.rs` 的工厂函数使用
//! - 使用 `engine/roles.rs`

mod cv_ramp;
mod cv_ramp_alt;
mod frequency_scan;
mod iv_ramp;
mod iv_ramp_4_wire;
mod iv_ramp_bias;
mod iv_ramp_bias_elm;
mod iv_ramp_elm;

pub use cv_ramp::CvRamp;
pub use cv_ramp_alt::CvRampAlt;
pub use frequency_scan::FrequencyScan;
pub use iv_ramp::IvRamp;
pub use iv_ramp_4_wire::IvRamp4Wire;
pub use iv_ramp_bias::IvRampBias;
pub use iv_ramp_bias_elm::IvRampBiasElm;
pub use iv_ramp_elm::IvRampElm;

use crate::engine::measurement::MeasurementContext;
use crate::error::{PqcError, Result};

/// 注册序列并设置单位
fn register_series(ctx: &mut MeasurementContext, series: &[(&str, &str)]) -> Result<()> {
    for (key, unit) in series {
        ctx.data.set_series_unit(key, unit);
        ctx.data.register_series(key)?;
    }
    Ok(())
}

/// 读取物理量参数并记录元数据
fn meta_quantities(ctx: &mut MeasurementContext, keys: &[(&str, &str)]) -> Result<()> {
    for (key, unit) in keys {
        ctx.meta_quantity(key, unit)?;
    }
    Ok(())
}

/// 前后斜升步长为 0 时沿用扫描步长
fn step_or(step: f64, fallback: f64) -> f64 {
    if step == 0.0 {
        fallback
    } else {
        step
    }
}

/// 扫描点数
fn point_count(ramp: &crate::engine::ramp::LinearRange) -> Result<usize> {
    if ramp.is_empty() {
        return Ok(0);
    }
    ramp.len()
        .checked_add(1)
        .ok_or_else(|| PqcError::InvalidArgument(format!("too many ramp points: {:?}", ramp)))
}

/// 附加环境读数后追加一行
fn append_row(ctx: &mut MeasurementContext, row: &[(&str, f64)]) -> Result<()> {
    let mut row = row.to_vec();
    row.extend(ctx.environment_row());
    ctx.data.append_series(&row)
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测量类型测试共用的运行辅助

    use crate::engine::measurement::{prepare, run_measurement, MeasurementContext};
    use crate::error::Result;
    use crate::instruments::sim::{create_station, DeviceModel};
    use crate::instruments::{InstrumentError, InstrumentResult, LcrMeter, LcrSetup, Station};
    use crate::models::parameter::parameters_from_yaml;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    pub fn quiet_station() -> Station {
        create_station(
            DeviceModel {
                noise: 0.0,
                ..DeviceModel::default()
            },
            7,
        )
    }

    /// 读数总是超时的 LCR 表，其余操作交给内部仪器
    pub struct TimeoutLcr(pub Box<dyn LcrMeter>);

    impl LcrMeter for TimeoutLcr {
        fn reset(&mut self) -> InstrumentResult<()> {
            self.0.reset()
        }
        fn next_error(&mut self) -> InstrumentResult<(i32, String)> {
            self.0.next_error()
        }
        fn configure(&mut self, setup: &LcrSetup) -> InstrumentResult<()> {
            self.0.configure(setup)
        }
        fn bias_voltage(&self) -> InstrumentResult<f64> {
            self.0.bias_voltage()
        }
        fn set_bias_voltage(&mut self, voltage: f64) -> InstrumentResult<()> {
            self.0.set_bias_voltage(voltage)
        }
        fn bias_state(&self) -> InstrumentResult<bool> {
            self.0.bias_state()
        }
        fn set_bias_state(&mut self, enabled: bool) -> InstrumentResult<()> {
            self.0.set_bias_state(enabled)
        }
        fn bias_current(&mut self) -> InstrumentResult<f64> {
            self.0.bias_current()
        }
        fn acquire_reading(&mut self) -> InstrumentResult<(f64, f64)> {
            Err(InstrumentError::Timeout("LCR reading timeout".to_string()))
        }
    }

    /// 把测试台的 LCR 表换成总是超时的版本
    pub fn with_timeout_lcr(station: &mut Station) {
        if let Some(lcr) = station.lcr.take() {
            station.lcr = Some(Box::new(TimeoutLcr(lcr)));
        }
    }

    /// 在模拟测试台上运行一次测量
    pub fn run(kind: &str, yaml: &str, station: &mut Station) -> (MeasurementContext, Result<()>) {
        let values = parameters_from_yaml(&serde_yaml::from_str(yaml).unwrap());
        let (measurement, params) = prepare(kind, &values).unwrap();
        let mut ctx = MeasurementContext::new(params, Arc::new(AtomicBool::new(false)))
            .with_time_scale(0.0)
            .with_environ(true);
        let result = run_measurement(measurement.as_ref(), &mut ctx, station);
        (ctx, result)
    }
}
