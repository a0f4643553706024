//! IV 扫描：HV Source 电压扫描，静电计读取电流。

use super::{append_row, meta_quantities, point_count, register_series};
use crate::engine::estimate::{format_estimate, Estimate};
use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::ramp::LinearRange;
use crate::engine::roles::{
    analyze_iv, read_error, register_elm, update_elm_meta, Elm, Source, SourceRole,
    QUICK_RAMP_DELAY,
};
use crate::error::Result;
use crate::instruments::{SourceFunction, Station};
use crate::models::quantity::Unit;
use crate::utils::format::format_metric;

use std::time::Instant;

const HVSRC: SourceRole = SourceRole::HvSource;

pub struct IvRampElm;

impl Measurement for IvRampElm {
    fn measurement_type(&self) -> &'static str {
        "iv_ramp_elm"
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        &["hvsrc", "elm"]
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_quantity("voltage_start", Unit::Volt, None)?;
        registry.register_quantity("voltage_stop", Unit::Volt, None)?;
        registry.register_quantity("voltage_step", Unit::Volt, None)?;
        registry.register_quantity("waiting_time", Unit::Second, Some("1 s"))?;
        registry.register_quantity("hvsrc_current_compliance", Unit::Ampere, None)?;
        registry.register_bool("hvsrc_accept_compliance", false)?;
        HVSRC.register(registry)?;
        register_elm(registry)
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
                ("hvsrc_current_compliance", "A"),
            ],
        )?;
        ctx.meta_bool("hvsrc_accept_compliance")?;
        HVSRC.update_meta(ctx)?;
        update_elm_meta(ctx)?;

        register_series(
            ctx,
            &[
                ("timestamp", "s"),
                ("voltage", "V"),
                ("current_hvsrc", "A"),
                ("current_elm", "A"),
            ],
        )?;
        ctx.register_environment()?;

        let voltage_start = ctx.params.quantity("voltage_start")?;
        let voltage_step = ctx.params.quantity("voltage_step")?;

        let Station { hvsrc, elm, .. } = station;
        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;
        hvsrc.reset()?;
        hvsrc.setup(&ctx.params)?;
        hvsrc.set_current_compliance(ctx.params.quantity("hvsrc_current_compliance")?)?;
        ctx.set_progress(1, 5);

        hvsrc.set_voltage_level(0.0)?;
        hvsrc.set_output(true)?;
        ctx.sleep(0.1);
        ctx.set_progress(2, 5);

        if !ctx.stop_requested() {
            hvsrc.ramp_to(ctx, SourceFunction::Voltage, voltage_start, voltage_step, QUICK_RAMP_DELAY)?;
        }

        let mut elm = Elm::from_slot(elm)?;
        elm.prepare_reading(&ctx.params)?;
        ctx.set_progress(3, 5);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let voltage_stop = ctx.params.quantity("voltage_stop")?;
        let voltage_step = ctx.params.quantity("voltage_step")?;
        let waiting_time = ctx.params.quantity("waiting_time")?;
        let read_timeout = ctx.params.quantity("elm_read_timeout")?;
        let accept_compliance = ctx.params.boolean("hvsrc_accept_compliance")?;

        if ctx.stop_requested() {
            return Ok(());
        }

        let Station { hvsrc, elm, environ, .. } = station;
        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;
        let mut elm = Elm::from_slot(elm)?;

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

            est.advance();
            ctx.set_message(&format!(
                "{} | HV Source {}",
                format_estimate(&est),
                format_metric(Some(voltage), "V", 3)
            ));
            ctx.set_progress(est.passed(), est.count());

            let elm_reading = elm.read_current(read_timeout).map_err(|e| read_error("elm", "ELM", e))?;
            elm.check_error()?;
            let hvsrc_reading = hvsrc.read_current()?;

            ctx.update_environment(environ)?;
            append_row(
                ctx,
                &[
                    ("timestamp", dt),
                    ("voltage", voltage),
                    ("current_hvsrc", hvsrc_reading),
                    ("current_elm", elm_reading),
                ],
            )?;

            if hvsrc.check_compliance_accepted(accept_compliance)? {
                break;
            }
            if ctx.stop_requested() {
                break;
            }
        }
        ctx.set_progress(4, 5);
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let voltage_step = ctx.params.quantity("voltage_step")?;

        let Station { hvsrc, elm, .. } = station;
        let mut elm = Elm::from_slot(elm)?;
        elm.set_zero_check(true)?;

        let mut hvsrc = Source::from_slot(HVSRC, hvsrc)?;
        hvsrc.ramp_zero(ctx, SourceFunction::Voltage, voltage_step, QUICK_RAMP_DELAY)?;
        hvsrc.set_output(false)?;
        ctx.set_progress(5, 5);
        Ok(())
    }

    fn analyze(&self, ctx: &mut MeasurementContext) -> Result<()> {
        analyze_iv(ctx, "current_elm", "voltage")
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run};
    use crate::instruments::Electrometer;

    const PARAMS: &str = "
voltage_start: -5 V
voltage_stop: -50 V
voltage_step: 5 V
waiting_time: 1 s
hvsrc_current_compliance: 1 uA
";

    #[test]
    fn test_iv_ramp_elm() {
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp_elm", PARAMS, &mut station);
        result.unwrap();
        let voltage = ctx.data.get_series("voltage");
        assert_eq!(voltage.first(), Some(&-5.0));
        assert_eq!(voltage.len(), 10);
        assert_eq!(ctx.data.get_series("current_elm"), ctx.data.get_series("current_hvsrc"));
        assert_eq!(ctx.data.meta_str("elm_current_range"), Some("2E-11 A"));
        assert!(station.elm.as_deref().unwrap().zero_check().unwrap());
    }

    #[test]
    fn test_read_timeout() {
        let params = format!("{}elm_read_timeout: 0 s\n", PARAMS);
        let mut station = quiet_station();
        let (ctx, result) = run("iv_ramp_elm", &params, &mut station);
        assert!(result.unwrap_err().is_timeout());
        assert!(ctx.data.get_series("voltage").is_empty());
    }
}
