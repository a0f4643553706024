//! CV 扫描：使用 LCR 表内置偏压源。

use super::cv_ramp::inverse_square;
use super::{append_row, meta_quantities, point_count, register_series, step_or};
use crate::engine::estimate::{format_estimate, Estimate};
use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::ramp::LinearRange;
use crate::engine::roles::{analyze_cv, read_error, register_lcr, update_lcr_meta, Lcr};
use crate::error::Result;
use crate::instruments::Station;
use crate::models::quantity::Unit;
use crate::utils::format::format_metric;

use std::time::Instant;

pub struct CvRampAlt;

/// 斜降到零，偏压未开启时跳过
fn quick_ramp_zero(ctx: &MeasurementContext, lcr: &mut Lcr<'_>) -> Result<()> {
    let step = step_or(
        ctx.params.quantity("bias_voltage_step_after")?,
        ctx.params.quantity("bias_voltage_step")?,
    );
    let waiting_time_after = ctx.params.quantity("waiting_time_after")?;

    ctx.set_message("Ramp to zero...");
    if lcr.bias_state()? {
        let begin = lcr.bias_voltage()?;
        for voltage in &LinearRange::new(begin, 0.0, step)? {
            lcr.set_bias_voltage(voltage)?;
            ctx.sleep(waiting_time_after);
        }
    }
    ctx.set_message("");
    Ok(())
}

impl Measurement for CvRampAlt {
    fn measurement_type(&self) -> &'static str {
        "cv_ramp_alt"
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        &["lcr"]
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_quantity("bias_voltage_start", Unit::Volt, None)?;
        registry.register_quantity("bias_voltage_stop", Unit::Volt, None)?;
        registry.register_quantity("bias_voltage_step", Unit::Volt, None)?;
        registry.register_quantity("waiting_time", Unit::Second, Some("1 s"))?;
        registry.register_quantity("bias_voltage_step_before", Unit::Volt, Some("0 V"))?;
        registry.register_quantity("waiting_time_before", Unit::Second, Some("100 ms"))?;
        registry.register_quantity("bias_voltage_step_after", Unit::Volt, Some("0 V"))?;
        registry.register_quantity("waiting_time_after", Unit::Second, Some("100 ms"))?;
        registry.register_quantity("waiting_time_start", Unit::Second, Some("0 s"))?;
        registry.register_quantity("waiting_time_end", Unit::Second, Some("0 s"))?;
        register_lcr(registry)
    }

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 6);

        meta_quantities(
            ctx,
            &[
                ("bias_voltage_start", "V"),
                ("bias_voltage_stop", "V"),
                ("bias_voltage_step", "V"),
                ("waiting_time", "s"),
                ("bias_voltage_step_before", "V"),
                ("waiting_time_before", "s"),
                ("bias_voltage_step_after", "V"),
                ("waiting_time_after", "s"),
                ("waiting_time_start", "s"),
                ("waiting_time_end", "s"),
            ],
        )?;
        update_lcr_meta(ctx)?;

        register_series(
            ctx,
            &[
                ("timestamp", "s"),
                ("voltage_lcr", "V"),
                ("current_lcr", "A"),
                ("capacitance", "F"),
                ("capacitance2", "1"),
                ("resistance", "Ohm"),
            ],
        )?;
        ctx.register_environment()?;

        let bias_voltage_start = ctx.params.quantity("bias_voltage_start")?;
        let step_before = step_or(
            ctx.params.quantity("bias_voltage_step_before")?,
            ctx.params.quantity("bias_voltage_step")?,
        );
        let waiting_time_before = ctx.params.quantity("waiting_time_before")?;
        let waiting_time_start = ctx.params.quantity("waiting_time_start")?;

        let mut lcr = Lcr::from_slot(&mut station.lcr)?;
        quick_ramp_zero(ctx, &mut lcr)?;
        lcr.reset()?;
        ctx.set_progress(5, 6);

        lcr.setup(&ctx.params)?;
        ctx.set_progress(6, 6);

        lcr.set_bias_voltage(0.0)?;
        lcr.set_bias_state(true)?;

        let begin = lcr.bias_voltage()?;
        tracing::info!(
            "LCR Meter ramp to start voltage: from {} to {} with step {}",
            format_metric(Some(begin), "V", 3),
            format_metric(Some(bias_voltage_start), "V", 3),
            format_metric(Some(step_before), "V", 3)
        );
        for voltage in &LinearRange::new(begin, bias_voltage_start, step_before)? {
            ctx.set_message(&format!("Ramp to start... {}", format_metric(Some(voltage), "V", 3)));
            lcr.set_bias_voltage(voltage)?;
            ctx.sleep(waiting_time_before);
            if ctx.stop_requested() {
                break;
            }
        }

        ctx.wait(waiting_time_start);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 2);

        let bias_voltage_stop = ctx.params.quantity("bias_voltage_stop")?;
        let bias_voltage_step = ctx.params.quantity("bias_voltage_step")?;
        let waiting_time = ctx.params.quantity("waiting_time")?;
        let soft_filter = ctx.params.boolean("lcr_soft_filter")?;

        if ctx.stop_requested() {
            return Ok(());
        }

        let Station { lcr, environ, .. } = station;
        let mut lcr = Lcr::from_slot(lcr)?;

        let ramp = LinearRange::new(lcr.bias_voltage()?, bias_voltage_stop, bias_voltage_step)?;
        let mut est = Estimate::new(point_count(&ramp)?);
        ctx.set_progress(0, est.count());

        tracing::info!(
            "LCR Meter ramp to end voltage: from {} to {} with step {}",
            format_metric(Some(ramp.begin), "V", 3),
            format_metric(Some(ramp.end), "V", 3),
            format_metric(Some(ramp.step), "V", 3)
        );
        let t0 = Instant::now();
        for voltage in &ramp {
            lcr.set_bias_voltage(voltage)?;
            ctx.sleep(waiting_time);
            let dt = t0.elapsed().as_secs_f64();

            est.advance();
            ctx.set_message(&format!(
                "{} | LCR Meter {}",
                format_estimate(&est),
                format_metric(Some(voltage), "V", 3)
            ));
            ctx.set_progress(est.passed(), est.count());

            ctx.update_environment(environ)?;
            let current = lcr.bias_current()?;

            let (capacitance, resistance) = lcr.read(soft_filter).map_err(|e| read_error("lcr", "LCR", e))?;

            append_row(
                ctx,
                &[
                    ("timestamp", dt),
                    ("voltage_lcr", voltage),
                    ("current_lcr", current),
                    ("capacitance", capacitance),
                    ("capacitance2", inverse_square(capacitance)),
                    ("resistance", resistance),
                ],
            )?;

            if ctx.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 2);
        let waiting_time_end = ctx.params.quantity("waiting_time_end")?;

        let mut lcr = Lcr::from_slot(&mut station.lcr)?;
        quick_ramp_zero(ctx, &mut lcr)?;
        ctx.wait(waiting_time_end);
        lcr.set_bias_state(false)?;
        ctx.set_progress(2, 2);
        Ok(())
    }

    fn analyze(&self, ctx: &mut MeasurementContext) -> Result<()> {
        analyze_cv(ctx, "capacitance", "voltage_lcr")
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run, with_timeout_lcr};
    use crate::instruments::sim::DeviceModel;
    use crate::instruments::LcrMeter;

    const PARAMS: &str = "
bias_voltage_start: -1 V
bias_voltage_stop: -5 V
bias_voltage_step: 1 V
lcr_amplitude: 250 mV
lcr_frequency: 1 kHz
lcr_soft_filter: false
analysis_functions: [capacitor]
";

    #[test]
    fn test_cv_ramp_alt() {
        let mut station = quiet_station();
        let (ctx, result) = run("cv_ramp_alt", PARAMS, &mut station);
        result.unwrap();

        assert_eq!(ctx.data.get_series("voltage_lcr"), &[-1.0, -2.0, -3.0, -4.0, -5.0]);
        let model = DeviceModel::default();
        assert_eq!(ctx.data.get_series("current_lcr")[4], model.leakage_current(-5.0));
        assert_eq!(ctx.data.get_series("capacitance")[0], model.capacitance(-1.0));
        assert_eq!(ctx.data.meta_str("waiting_time_before"), Some("0.1 s"));
        assert!(ctx.data.analysis.contains_key("capacitor"));

        let lcr = station.lcr.as_deref().unwrap();
        assert!(!lcr.bias_state().unwrap());
        assert_eq!(lcr.bias_voltage().unwrap(), 0.0);
    }

    #[test]
    fn test_lcr_timeout_is_kept() {
        let mut station = quiet_station();
        with_timeout_lcr(&mut station);
        let (ctx, result) = run("cv_ramp_alt", PARAMS, &mut station);
        let err = result.unwrap_err();
        assert!(err.is_timeout(), "unexpected {:?}", err);
        assert!(ctx.data.get_series("capacitance").is_empty());
        assert_eq!(station.lcr.as_deref().unwrap().bias_voltage().unwrap(), 0.0);
    }
}
