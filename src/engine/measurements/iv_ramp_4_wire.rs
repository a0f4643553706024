//! 四线法 IV 扫描：V Source 电流扫描并读取电压。

use super::{append_row, point_count, register_series};
use crate::engine::estimate::{format_estimate, Estimate};
use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::ramp::LinearRange;
use crate::engine::roles::{analyze_iv, Source, SourceRole, QUICK_RAMP_DELAY};
use crate::error::Result;
use crate::instruments::{SourceFunction, Station};
use crate::models::quantity::Unit;
use crate::utils::format::format_metric;

use std::time::Instant;

const VSRC: SourceRole = SourceRole::VSource;

pub struct IvRamp4Wire;

impl Measurement for IvRamp4Wire {
    fn measurement_type(&self) -> &'static str {
        "iv_ramp_4_wire"
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        &["vsrc"]
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_quantity("current_start", Unit::Ampere, None)?;
        registry.register_quantity("current_stop", Unit::Ampere, None)?;
        registry.register_quantity("current_step", Unit::Ampere, None)?;
        registry.register_quantity("waiting_time", Unit::Second, None)?;
        registry.register_quantity("vsrc_voltage_compliance", Unit::Volt, None)?;
        VSRC.register(registry)
    }

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 5);

        for (key, unit) in [
            ("current_start", "A"),
            ("current_stop", "A"),
            ("current_step", "A"),
            ("waiting_time", "s"),
            ("vsrc_voltage_compliance", "V"),
        ] {
            ctx.meta_quantity(key, unit)?;
        }
        VSRC.update_meta(ctx)?;

        register_series(
            ctx,
            &[("timestamp", "s"), ("current", "A"), ("voltage_vsrc", "V")],
        )?;
        ctx.register_environment()?;

        let current_start = ctx.params.quantity("current_start")?;
        let current_step = ctx.params.quantity("current_step")?;

        let mut vsrc = Source::from_slot(VSRC, &mut station.vsrc)?;
        vsrc.reset()?;
        vsrc.setup(&ctx.params)?;
        vsrc.set_function(SourceFunction::Current)?;
        vsrc.set_voltage_compliance(ctx.params.quantity("vsrc_voltage_compliance")?)?;
        ctx.set_progress(2, 5);

        if ctx.stop_requested() {
            return Ok(());
        }

        vsrc.set_output(true)?;
        ctx.sleep(0.1);
        ctx.set_progress(3, 5);

        vsrc.ramp_to(ctx, SourceFunction::Current, current_start, current_step, QUICK_RAMP_DELAY)?;
        ctx.set_progress(5, 5);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let current_stop = ctx.params.quantity("current_stop")?;
        let current_step = ctx.params.quantity("current_step")?;
        let waiting_time = ctx.params.quantity("waiting_time")?;

        if ctx.stop_requested() {
            return Ok(());
        }

        let Station { vsrc, environ, .. } = station;
        let mut vsrc = Source::from_slot(VSRC, vsrc)?;

        let ramp = LinearRange::new(vsrc.current_level()?, current_stop, current_step)?;
        let mut est = Estimate::new(point_count(&ramp)?);
        ctx.set_progress(0, est.count());

        tracing::info!(
            "ramp to end current: from {} to {} with step {}",
            format_metric(Some(ramp.begin), "A", 3),
            format_metric(Some(ramp.end), "A", 3),
            format_metric(Some(ramp.step), "A", 3)
        );
        let t0 = Instant::now();
        for current in &ramp {
            vsrc.set_current_level(current)?;
            ctx.sleep(waiting_time);
            let dt = t0.elapsed().as_secs_f64();

            est.advance();
            ctx.set_message(&format!(
                "{} | V Source {}",
                format_estimate(&est),
                format_metric(Some(current), "A", 3)
            ));
            ctx.set_progress(est.passed(), est.count());

            let vsrc_reading = vsrc.read_voltage()?;

            ctx.update_environment(environ)?;
            append_row(
                ctx,
                &[("timestamp", dt), ("current", current), ("voltage_vsrc", vsrc_reading)],
            )?;

            vsrc.check_compliance()?;
            if ctx.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let current_step = ctx.params.quantity("current_step")?;

        let mut vsrc = Source::from_slot(VSRC, &mut station.vsrc)?;
        vsrc.ramp_zero(ctx, SourceFunction::Current, current_step, QUICK_RAMP_DELAY)?;
        vsrc.set_output(false)?;
        ctx.set_progress(5, 5);
        Ok(())
    }

    fn analyze(&self, ctx: &mut MeasurementContext) -> Result<()> {
        analyze_iv(ctx, "current", "voltage_vsrc")
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run};
    use crate::instruments::SourceMeter;

    const PARAMS: &str = "
current_start: 0 A
current_stop: 1 mA
current_step: 100 uA
waiting_time: 10 ms
vsrc_voltage_compliance: 20 V
";

    #[test]
    fn test_four_wire_resistance() {
        let params = format!("{}analysis_functions: [linear_fit]\n", PARAMS);
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp_4_wire", &params, &mut station);
        result.unwrap();

        let voltage = ctx.data.get_series("voltage_vsrc");
        assert_eq!(voltage.len(), 11);
        assert!((voltage[10] - 1.5).abs() < 1e-9);
        assert_eq!(ctx.data.series_units["voltage_vsrc"], "V");

        let fit = &ctx.data.analysis["linear_fit"];
        let slope = fit["a"].as_f64().unwrap();
        assert!((slope - 1.5e3).abs() < 1e-3);
        assert!((fit["r_value"].as_f64().unwrap() - 1.0).abs() < 1e-9);

        let vsrc = station.vsrc.as_deref().unwrap();
        assert_eq!(vsrc.current_level().unwrap(), 0.0);
        assert!(!vsrc.output().unwrap());
    }

    #[test]
    fn test_voltage_compliance() {
        let params = PARAMS.replace("20 V", "1 V");
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp_4_wire", &params, &mut station);
        assert!(result.unwrap_err().is_compliance());
        assert!(ctx.data.get_series("current").len() < 11);
    }
}
