//! CV 扫描：源表施加偏压，LCR 表读取电容与电阻。
//!
//! `cv_ramp` 使用 HV Source，`cv_ramp_vsrc` 使用 V Source，流程相同。

use super::{append_row, meta_quantities, point_count, register_series};
use crate::engine::estimate::{format_estimate, Estimate};
use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::ramp::LinearRange;
use crate::engine::roles::{
    analyze_cv, read_error, register_lcr, update_lcr_meta, Lcr, Source, SourceRole, QUICK_RAMP_DELAY,
    QUICK_RAMP_STEP,
};
use crate::error::Result;
use crate::instruments::{SourceFunction, Station};
use crate::models::quantity::Unit;
use crate::utils::format::format_metric;

use std::time::Instant;

/// 1/C²，电容为零时为 0
pub fn inverse_square(capacitance: f64) -> f64 {
    if capacitance == 0.0 {
        0.0
    } else {
        1.0 / (capacitance * capacitance)
    }
}

pub struct CvRamp {
    role: SourceRole,
}

impl CvRamp {
    pub fn hvsrc() -> Self {
        Self {
            role: SourceRole::HvSource,
        }
    }

    pub fn vsrc() -> Self {
        Self {
            role: SourceRole::VSource,
        }
    }

    fn voltage_key(&self) -> String {
        format!("voltage_{}", self.role.key())
    }

    fn current_key(&self) -> String {
        format!("current_{}", self.role.key())
    }

    fn compliance_key(&self) -> String {
        self.role.param("current_compliance")
    }
}

impl Measurement for CvRamp {
    fn measurement_type(&self) -> &'static str {
        match self.role {
            SourceRole::HvSource => "cv_ramp",
            SourceRole::VSource => "cv_ramp_vsrc",
        }
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        match self.role {
            SourceRole::HvSource => &["hvsrc", "lcr"],
            SourceRole::VSource => &["vsrc", "lcr"],
        }
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        registry.register_quantity("bias_voltage_start", Unit::Volt, None)?;
        registry.register_quantity("bias_voltage_stop", Unit::Volt, None)?;
        registry.register_quantity("bias_voltage_step", Unit::Volt, None)?;
        registry.register_quantity("waiting_time", Unit::Second, None)?;
        registry.register_quantity(&self.compliance_key(), Unit::Ampere, None)?;
        self.role.register(registry)?;
        register_lcr(registry)
    }

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_message("Initialize...");
        ctx.set_progress(1, 6);

        let compliance_key = self.compliance_key();
        meta_quantities(
            ctx,
            &[
                ("bias_voltage_start", "V"),
                ("bias_voltage_stop", "V"),
                ("bias_voltage_step", "V"),
                ("waiting_time", "s"),
                (compliance_key.as_str(), "A"),
            ],
        )?;
        self.role.update_meta(ctx)?;
        update_lcr_meta(ctx)?;

        let voltage_key = self.voltage_key();
        let current_key = self.current_key();
        register_series(
            ctx,
            &[
                ("timestamp", "s"),
                (voltage_key.as_str(), "V"),
                (current_key.as_str(), "A"),
                ("capacitance", "F"),
                ("capacitance2", "1"),
                ("resistance", "Ohm"),
            ],
        )?;
        ctx.register_environment()?;

        let slot = match self.role {
            SourceRole::HvSource => &mut station.hvsrc,
            SourceRole::VSource => &mut station.vsrc,
        };
        let mut source = Source::from_slot(self.role, slot)?;
        source.reset()?;
        ctx.set_progress(3, 6);

        source.setup(&ctx.params)?;
        if self.role == SourceRole::VSource {
            source.set_function(SourceFunction::Voltage)?;
        }
        source.set_current_compliance(ctx.params.quantity(&compliance_key)?)?;
        ctx.set_progress(4, 6);

        source.set_output(true)?;

        let mut lcr = Lcr::from_slot(&mut station.lcr)?;
        lcr.reset()?;
        ctx.set_progress(5, 6);

        lcr.setup(&ctx.params)?;
        ctx.set_progress(6, 6);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        let bias_voltage_start = ctx.params.quantity("bias_voltage_start")?;
        let bias_voltage_stop = ctx.params.quantity("bias_voltage_stop")?;
        let bias_voltage_step = ctx.params.quantity("bias_voltage_step")?;
        let waiting_time = ctx.params.quantity("waiting_time")?;
        let soft_filter = ctx.params.boolean("lcr_soft_filter")?;

        let Station {
            hvsrc,
            vsrc,
            lcr,
            environ,
            ..
        } = station;
        let slot = match self.role {
            SourceRole::HvSource => hvsrc,
            SourceRole::VSource => vsrc,
        };
        let mut source = Source::from_slot(self.role, slot)?;
        let mut lcr = Lcr::from_slot(lcr)?;

        ctx.set_message("Ramp to start...");
        source.ramp_to(ctx, SourceFunction::Voltage, bias_voltage_start, bias_voltage_step, QUICK_RAMP_DELAY)?;
        if ctx.stop_requested() {
            return Ok(());
        }

        let ramp = LinearRange::new(source.voltage_level()?, bias_voltage_stop, bias_voltage_step)?;
        let mut est = Estimate::new(point_count(&ramp)?);
        ctx.set_progress(0, est.count());

        let voltage_key = self.voltage_key();
        let current_key = self.current_key();

        tracing::info!(
            "ramp to end voltage: from {} to {} with step {}",
            format_metric(Some(ramp.begin), "V", 3),
            format_metric(Some(ramp.end), "V", 3),
            format_metric(Some(ramp.step), "V", 3)
        );
        let t0 = Instant::now();
        for voltage in &ramp {
            source.set_voltage_level(voltage)?;
            ctx.sleep(waiting_time);
            let dt = t0.elapsed().as_secs_f64();

            est.advance();
            ctx.set_message(&format!(
                "{} | {} {}",
                format_estimate(&est),
                self.role.name(),
                format_metric(Some(voltage), "V", 3)
            ));
            ctx.set_progress(est.passed(), est.count());

            // CpRp: primary Cp, secondary Rp
            let (capacitance, resistance) = lcr.read(soft_filter).map_err(|e| read_error("lcr", "LCR", e))?;
            let current = source.read_current()?;

            ctx.update_environment(environ)?;
            append_row(
                ctx,
                &[
                    ("timestamp", dt),
                    (voltage_key.as_str(), voltage),
                    (current_key.as_str(), current),
                    ("capacitance", capacitance),
                    ("capacitance2", inverse_square(capacitance)),
                    ("resistance", resistance),
                ],
            )?;

            source.check_compliance()?;
            if ctx.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 2);
        let slot = match self.role {
            SourceRole::HvSource => &mut station.hvsrc,
            SourceRole::VSource => &mut station.vsrc,
        };
        let mut source = Source::from_slot(self.role, slot)?;
        source.ramp_zero(ctx, SourceFunction::Voltage, QUICK_RAMP_STEP, QUICK_RAMP_DELAY)?;
        source.set_output(false)?;
        ctx.set_progress(2, 2);
        Ok(())
    }

    fn analyze(&self, ctx: &mut MeasurementContext) -> Result<()> {
        analyze_cv(ctx, "capacitance", &self.voltage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run, with_timeout_lcr};
    use super::*;
    use crate::engine::measurement::validate_measurement;
    use crate::instruments::sim::DeviceModel;
    use crate::models::parameter::parameters_from_yaml;
    use crate::instruments::SourceMeter;

    const PARAMS: &str = "
bias_voltage_start: 0 V
bias_voltage_stop: -400 V
bias_voltage_step: 20 V
waiting_time: 10 ms
lcr_amplitude: 250 mV
lcr_frequency: 10 kHz
analysis_functions: [cv]
";

    #[test]
    fn test_inverse_square() {
        assert_eq!(inverse_square(0.0), 0.0);
        assert_eq!(inverse_square(0.5), 4.0);
    }

    #[test]
    fn test_cv_ramp_full_depletion() {
        let params = format!("{}hvsrc_current_compliance: 10 uA\n", PARAMS);
        let mut station = quiet_station();
        let (ctx, result) = run("cv_ramp", &params, &mut station);
        result.unwrap();

        let voltage = ctx.data.get_series("voltage_hvsrc");
        assert_eq!(voltage.len(), 21);
        let capacitance = ctx.data.get_series("capacitance");
        assert_eq!(capacitance[20], DeviceModel::default().capacitance(-400.0));
        assert_eq!(ctx.data.get_series("capacitance2")[20], inverse_square(capacitance[20]));
        assert_eq!(ctx.data.series_units["capacitance2"], "1");
        assert_eq!(ctx.data.meta_str("lcr_frequency"), Some("10000 Hz"));

        let v_fd = ctx.data.analysis["cv"]["v_fd"].as_f64().unwrap();
        assert!((v_fd - 250.0).abs() < 0.1);
        assert_eq!(station.hvsrc.as_deref().unwrap().voltage_level().unwrap(), 0.0);
    }

    #[test]
    fn test_cv_ramp_vsrc() {
        let params = format!("{}vsrc_current_compliance: 10 uA\n", PARAMS)
            .replace("-400 V", "-100 V");
        let mut station = quiet_station();
        let (ctx, result) = run("cv_ramp_vsrc", &params, &mut station);
        result.unwrap();
        assert_eq!(ctx.data.get_series("voltage_vsrc").len(), 6);
        assert!(ctx.data.get_series("current_vsrc").iter().all(|i| *i <= 0.0));
        assert!(!station.vsrc.as_deref().unwrap().output().unwrap());
    }

    #[test]
    fn test_missing_lcr_parameters() {
        let yaml = "bias_voltage_start: 0 V\nbias_voltage_stop: 10 V\nbias_voltage_step: 1 V\nwaiting_time: 1 s\nhvsrc_current_compliance: 1 uA\n";
        let values = parameters_from_yaml(&serde_yaml::from_str(yaml).unwrap());
        let err = validate_measurement("cv_ramp", &values).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required parameter(s): lcr_amplitude, lcr_frequency"
        );
    }

    #[test]
    fn test_lcr_timeout_is_kept() {
        let params = format!("{}hvsrc_current_compliance: 10 uA\n", PARAMS);
        let mut station = quiet_station();
        with_timeout_lcr(&mut station);
        let (_, result) = run("cv_ramp", &params, &mut station);
        let err = result.unwrap_err();
        assert!(err.is_timeout(), "unexpected {:?}", err);
        assert_eq!(station.hvsrc.as_deref().unwrap().voltage_level().unwrap(), 0.0);
    }
}
