//! IV 扫描：HV Source 电压扫描并读取源表电流。

use super::{append_row, meta_quantities, point_count, register_series, step_or};
use crate::engine::estimate::{format_estimate, Estimate};
use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::ramp::LinearRange;
use crate::engine::roles::{analyze_iv, Source, SourceRole};
use crate::error::Result;
use crate::instruments::{SourceFunction, Station};
use crate::models::quantity::Unit;
use crate::utils::format::format_metric;

use std::time::Instant;

const HVSRC: SourceRole = SourceRole::HvSource;

pub struct IvRamp;

impl Measurement for IvRamp {
    fn measurement_type(&self) -> &'static str {
        "iv_ramp"
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        &["hvsrc"]
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_quantity("voltage_start", Unit::Volt, None)?;
        registry.register_quantity("voltage_stop", Unit::Volt, None)?;
        registry.register_quantity("voltage_step", Unit::Volt, None)?;
        registry.register_quantity("waiting_time", Unit::Second, Some("1 s"))?;
        registry.register_quantity("voltage_step_before", Unit::Volt, Some("0 V"))?;
        registry.register_quantity("waiting_time_before", Unit::Second, Some("100 ms"))?;
        registry.register_quantity("voltage_step_after", Unit::Volt, Some("0 V"))?;
        registry.register_quantity("waiting_time_after", Unit::Second, Some("100 ms"))?;
        registry.register_quantity("waiting_time_start", Unit::Second, Some("0 s"))?;
        registry.register_quantity("waiting_time_end", Unit::Second, Some("0 s"))?;
        registry.register_quantity("hvsrc_current_compliance", Unit::Ampere, None)?;
        registry.register_bool("hvsrc_accept_compliance", false)?;
        HVSRC.register(registry)
    }

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(0, 5);

        meta_quantities(
            ctx,
            &[
                ("voltage_start", "V"),
                ("voltage_stop", "V"),
                ("voltage_step", "V"),
                ("waiting_time", "s"),
                ("voltage_step_before", "V"),
                ("waiting_time_before", "s"),
                ("voltage_step_after", "V"),
                ("waiting_time_after", "s"),
                ("waiting_time_start", "s"),
                ("waiting_time_end", "s"),
                ("hvsrc_current_compliance", "A"),
            ],
        )?;
        ctx.meta_bool("hvsrc_accept_compliance")?;
        HVSRC.update_meta(ctx)?;

        register_series(
            ctx,
            &[("timestamp", "s"), ("voltage", "V"), ("current_hvsrc", "A")],
        )?;
        ctx.register_environment()?;

        let voltage_start = ctx.params.quantity("voltage_start")?;
        let voltage_step = ctx.params.quantity("voltage_step")?;
        let step_before = step_or(ctx.params.quantity("voltage_step_before")?, voltage_step);
        let waiting_time_before = ctx.params.quantity("waiting_time_before")?;
        let waiting_time_start = ctx.params.quantity("waiting_time_start")?;

        let mut hvsrc = Source::from_slot(HVSRC, &mut station.hvsrc)?;
        hvsrc.reset()?;
        hvsrc.setup(&ctx.params)?;
        hvsrc.set_current_compliance(ctx.params.quantity("hvsrc_current_compliance")?)?;
        ctx.set_progress(1, 5);

        hvsrc.set_output(true)?;
        ctx.sleep(0.1);
        ctx.set_progress(2, 5);

        hvsrc.ramp_to(ctx, SourceFunction::Voltage, voltage_start, step_before, waiting_time_before)?;
        ctx.set_progress(3, 5);

        ctx.wait(waiting_time_start);
        ctx.set_progress(4, 5);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let voltage_stop = ctx.params.quantity("voltage_stop")?;
        let voltage_step = ctx.params.quantity("voltage_step")?;
        let waiting_time = ctx.params.quantity("waiting_time")?;
        let accept_compliance = ctx.params.boolean("hvsrc_accept_compliance")?;

        if ctx.stop_requested() {
            return Ok(());
        }

        let Station { hvsrc, environ, .. } = station;
        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;

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
            ctx.sleep(waiting_time);
            let dt = t0.elapsed().as_secs_f64();

            ctx.update_environment(environ)?;
            let current = hvsrc.read_current()?;
            append_row(
                ctx,
                &[("timestamp", dt), ("voltage", voltage), ("current_hvsrc", current)],
            )?;

            est.advance();
            ctx.set_message(&format!(
                "{} | HV Source {}",
                format_estimate(&est),
                format_metric(Some(voltage), "V", 3)
            ));
            ctx.set_progress(est.passed(), est.count());

            if hvsrc.check_compliance_accepted(accept_compliance)? {
                break;
            }
            if ctx.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let voltage_step = ctx.params.quantity("voltage_step")?;
        let step_after = step_or(ctx.params.quantity("voltage_step_after")?, voltage_step);
        let waiting_time_after = ctx.params.quantity("waiting_time_after")?;
        let waiting_time_end = ctx.params.quantity("waiting_time_end")?;

        let mut hvsrc = Source::from_slot(HVSRC, &mut station.hvsrc)?;
        hvsrc.ramp_zero(ctx, SourceFunction::Voltage, step_after, waiting_time_after)?;
        ctx.wait(waiting_time_end);
        hvsrc.set_output(false)?;
        ctx.set_progress(5, 5);
        Ok(())
    }

    fn analyze(&self, ctx: &mut MeasurementContext) -> Result<()> {
        analyze_iv(ctx, "current_hvsrc", "voltage")
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run};
    use crate::instruments::SourceMeter;
    use crate::instruments::sim::DeviceModel;

    const PARAMS: &str = "
voltage_start: 0 V
voltage_stop: -100 V
voltage_step: 10 V
waiting_time: 100 ms
hvsrc_current_compliance: 1 uA
";

    #[test]
    fn test_iv_ramp_records_series() {
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp", PARAMS, &mut station);
        result.unwrap();

        let voltage = ctx.data.get_series("voltage");
        assert_eq!(voltage.len(), 11);
        assert_eq!(voltage[0], 0.0);
        assert_eq!(voltage[10], -100.0);
        let expected = DeviceModel::default().leakage_current(-100.0);
        assert_eq!(ctx.data.get_series("current_hvsrc")[10], expected);
        assert_eq!(ctx.data.get_series("temperature_box").len(), 11);
        assert_eq!(ctx.data.meta_str("voltage_stop"), Some("-100 V"));
        assert_eq!(ctx.data.meta_str("waiting_time"), Some("0.1 s"));
        assert_eq!(ctx.data.series_units["current_hvsrc"], "A");

        let hvsrc = station.hvsrc.as_deref().unwrap();
        assert!(!hvsrc.output().unwrap());
        assert_eq!(hvsrc.voltage_level().unwrap(), 0.0);
    }

    #[test]
    fn test_compliance_raises_unless_accepted() {
        let params = PARAMS.replace("1 uA", "50 nA").replace("-100 V", "-1500 V");
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp", &params, &mut station);
        assert!(result.unwrap_err().is_compliance());
        assert!(!ctx.data.get_series("voltage").is_empty());
        assert_eq!(station.hvsrc.as_deref().unwrap().voltage_level().unwrap(), 0.0);

        let params = format!("{}hvsrc_accept_compliance: true\n", params);
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp", &params, &mut station);
        result.unwrap();
        let last = *ctx.data.get_series("voltage").last().unwrap();
        assert!(last > -1500.0);
    }

    #[test]
    fn test_analysis_limits() {
        let params = format!(
            "{}analysis_functions:\n  - type: iv\n    limits: {{i_max: {{maximum: 1.0e-12}}}}\n",
            PARAMS
        );
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp", &params, &mut station);
        assert!(result.unwrap_err().is_analysis());
        assert!(ctx.data.analysis.contains_key("iv"));
    }
}
