//! IV 扫描：HV Source 电压扫描，V Source 施加偏压并读取电流。
//!
//! `bias_mode: offset` 时偏压随扫描步进同向移动。

use super::{append_row, meta_quantities, point_count, register_series};
use crate::engine::estimate::{format_estimate, Estimate};
use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::ramp::LinearRange;
use crate::engine::roles::{analyze_iv, Source, SourceRole, QUICK_RAMP_DELAY, QUICK_RAMP_STEP};
use crate::error::Result;
use crate::instruments::{SourceFunction, Station};
use crate::models::quantity::Unit;
use crate::utils::format::format_metric;

use std::time::Instant;

const HVSRC: SourceRole = SourceRole::HvSource;
const VSRC: SourceRole = SourceRole::VSource;

pub struct IvRampBias;

/// offset 模式下每步偏压的变化量
pub(super) fn bias_offset(ramp: &LinearRange) -> f64 {
    if ramp.begin <= ramp.end {
        ramp.step.abs()
    } else {
        -ramp.step.abs()
    }
}

impl Measurement for IvRampBias {
    fn measurement_type(&self) -> &'static str {
        "iv_ramp_bias"
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        &["hvsrc", "vsrc"]
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_quantity("voltage_start", Unit::Volt, None)?;
        registry.register_quantity("voltage_stop", Unit::Volt, None)?;
        registry.register_quantity("voltage_step", Unit::Volt, None)?;
        registry.register_quantity("waiting_time", Unit::Second, None)?;
        registry.register_quantity("bias_voltage", Unit::Volt, None)?;
        registry.register_choice("bias_mode", "constant", &["constant", "offset"])?;
        registry.register_quantity("hvsrc_current_compliance", Unit::Ampere, None)?;
        registry.register_quantity("vsrc_current_compliance", Unit::Ampere, None)?;
        HVSRC.register(registry)?;
        VSRC.register(registry)
    }

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 5);

        meta_quantities(
            ctx,
            &[
                ("voltage_start", "V"),
                ("voltage_stop", "V"),
                ("voltage_step", "V"),
                ("waiting_time", "s"),
                ("bias_voltage", "V"),
                ("hvsrc_current_compliance", "A"),
            ],
        )?;
        ctx.meta_choice("bias_mode")?;
        HVSRC.update_meta(ctx)?;
        ctx.meta_quantity("vsrc_current_compliance", "A")?;
        VSRC.update_meta(ctx)?;

        register_series(
            ctx,
            &[
                ("timestamp", "s"),
                ("voltage", "V"),
                ("current_vsrc", "A"),
                ("bias_voltage", "V"),
            ],
        )?;
        ctx.register_environment()?;

        let voltage_start = ctx.params.quantity("voltage_start")?;
        let bias_voltage = ctx.params.quantity("bias_voltage")?;

        let Station { hvsrc, vsrc, .. } = station;
        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;
        let mut vsrc = Source::from_slot(VSRC, vsrc)?;

        hvsrc.reset()?;
        hvsrc.setup(&ctx.params)?;
        hvsrc.set_current_compliance(ctx.params.quantity("hvsrc_current_compliance")?)?;
        if ctx.stop_requested() {
            return Ok(());
        }

        vsrc.reset()?;
        vsrc.setup(&ctx.params)?;
        vsrc.set_function(SourceFunction::Voltage)?;
        vsrc.set_current_compliance(ctx.params.quantity("vsrc_current_compliance")?)?;
        if ctx.stop_requested() {
            return Ok(());
        }

        hvsrc.set_output(true)?;
        ctx.sleep(0.1);
        vsrc.set_output(true)?;
        ctx.sleep(0.1);

        ctx.set_message("Ramp to start...");
        vsrc.ramp_to(ctx, SourceFunction::Voltage, bias_voltage, QUICK_RAMP_STEP, QUICK_RAMP_DELAY)?;
        hvsrc.ramp_to(ctx, SourceFunction::Voltage, voltage_start, QUICK_RAMP_STEP, QUICK_RAMP_DELAY)?;

        ctx.set_progress(5, 5);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let voltage_stop = ctx.params.quantity("voltage_stop")?;
        let voltage_step = ctx.params.quantity("voltage_step")?;
        let waiting_time = ctx.params.quantity("waiting_time")?;
        let mut bias_voltage = ctx.params.quantity("bias_voltage")?;
        let offset_mode = ctx.params.choice("bias_mode")? == "offset";

        if ctx.stop_requested() {
            return Ok(());
        }

        let Station { hvsrc, vsrc, environ, .. } = station;
        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;
        let mut vsrc = Source::from_slot(VSRC, vsrc)?;

        let ramp = LinearRange::new(hvsrc.voltage_level()?, voltage_stop, voltage_step)?;
        let mut est = Estimate::new(point_count(&ramp)?);
        ctx.set_progress(0, est.count());

        tracing::info!(
            "HV Source ramp to end voltage: from {} to {} with step {}",
            format_metric(Some(ramp.begin), "V", 3),
            format_metric(Some(ramp.end), "V", 3),
            format_metric(Some(ramp.step), "V", 3)
        );
        let t0 = Instant::now();
        for voltage in &ramp {
            hvsrc.set_voltage_level(voltage)?;
            if offset_mode {
                bias_voltage += bias_offset(&ramp);
                vsrc.set_voltage_level(bias_voltage)?;
            }

            ctx.sleep(waiting_time);
            let dt = t0.elapsed().as_secs_f64();

            est.advance();
            ctx.set_message(&format!(
                "{} | HV Source {} | Bias {}",
                format_estimate(&est),
                format_metric(Some(voltage), "V", 3),
                format_metric(Some(bias_voltage), "V", 3)
            ));
            ctx.set_progress(est.passed(), est.count());

            let vsrc_reading = vsrc.read_current()?;
            hvsrc.read_current()?;

            ctx.update_environment(environ)?;
            append_row(
                ctx,
                &[
                    ("timestamp", dt),
                    ("voltage", voltage),
                    ("current_vsrc", vsrc_reading),
                    ("bias_voltage", bias_voltage),
                ],
            )?;

            hvsrc.check_compliance()?;
            vsrc.check_compliance()?;
            if ctx.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let Station { hvsrc, vsrc, .. } = station;
        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;
        let mut vsrc = Source::from_slot(VSRC, vsrc)?;

        hvsrc.ramp_zero(ctx, SourceFunction::Voltage, QUICK_RAMP_STEP, QUICK_RAMP_DELAY)?;
        vsrc.ramp_zero(ctx, SourceFunction::Voltage, QUICK_RAMP_STEP, QUICK_RAMP_DELAY)?;
        hvsrc.set_output(false)?;
        vsrc.set_output(false)?;
        ctx.set_progress(5, 5);
        Ok(())
    }

    fn analyze(&self, ctx: &mut MeasurementContext) -> Result<()> {
        analyze_iv(ctx, "current_vsrc", "voltage")
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run};
    use super::*;
    use crate::instruments::SourceMeter;

    const PARAMS: &str = "
voltage_start: 0 V
voltage_stop: 10 V
voltage_step: 2 V
waiting_time: 10 ms
bias_voltage: 2 V
hvsrc_current_compliance: 1 uA
vsrc_current_compliance: 1 uA
";

    #[test]
    fn test_bias_offset_direction() {
        assert_eq!(bias_offset(&LinearRange::new(0.0, 10.0, 2.0).unwrap()), 2.0);
        assert_eq!(bias_offset(&LinearRange::new(0.0, -10.0, -2.0).unwrap()), -2.0);
    }

    #[test]
    fn test_constant_bias() {
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp_bias", PARAMS, &mut station);
        result.unwrap();
        assert_eq!(ctx.data.get_series("voltage").len(), 6);
        assert!(ctx.data.get_series("bias_voltage").iter().all(|&b| b == 2.0));
        assert_eq!(ctx.data.meta_str("bias_mode"), Some("constant"));

        let vsrc = station.vsrc.as_deref().unwrap();
        assert_eq!(vsrc.voltage_level().unwrap(), 0.0);
        assert!(!vsrc.output().unwrap());
    }

    #[test]
    fn test_offset_bias() {
        let params = format!("{}bias_mode: offset\n", PARAMS);
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp_bias", &params, &mut station);
        result.unwrap();
        assert_eq!(ctx.data.get_series("bias_voltage"), &[4.0, 6.0, 8.0, 10.0, 12.0, 14.0]);
    }
}
