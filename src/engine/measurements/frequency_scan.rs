//! 频率扫描：仅设置仪器，不记录序列，结束时关闭 HV Source 输出。

use crate::engine::measurement::{Measurement, MeasurementContext};
use crate::engine::parameters::ParameterRegistry;
use crate::engine::roles::{register_lcr, Source, SourceRole};
use crate::error::Result;
use crate::instruments::Station;

pub struct FrequencyScan;

impl Measurement for FrequencyScan {
    fn measurement_type(&self) -> &'static str {
        "frequency_scan"
    }

    fn required_instruments(&self) -> &'static [&'static str] {
        &["hvsrc", "lcr"]
    }

    fn register(&self, registry: &mut ParameterRegistry) -> Result<()> {
        SourceRole::HvSource.register(registry)?;
        register_lcr(registry)
    }

    fn initialize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(0, 2);
        let hvsrc = Source::from_slot(SourceRole::HvSource, &mut station.hvsrc)?;
        tracing::info!(
            "HV Source state: voltage level {} V, output {}",
            hvsrc.voltage_level()?,
            hvsrc.output()?
        );
        ctx.set_progress(2, 2);
        Ok(())
    }

    fn measure(&self, ctx: &mut MeasurementContext, _station: &mut Station) -> Result<()> {
        ctx.set_progress(1, 1);
        Ok(())
    }

    fn finalize(&self, ctx: &mut MeasurementContext, station: &mut Station) -> Result<()> {
        ctx.set_progress(0, 1);
        let mut hvsrc = Source::from_slot(SourceRole::HvSource, &mut station.hvsrc)?;
        hvsrc.set_output(false)?;
        ctx.set_progress(1, 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_station, run};
    use crate::instruments::SourceMeter;

    #[test]
    fn test_frequency_scan_switches_output_off() {
        let mut station = quiet_station();
        station.hvsrc.as_deref_mut().unwrap().set_output(true).unwrap();
        let (ctx, result) = run(
            "frequency_scan",
            "lcr_amplitude: 250 mV\nlcr_frequency: 1 kHz\n",
            &mut station,
        );
        result.unwrap();
        assert_eq!(ctx.data.row_count(), 0);
        assert_eq!(ctx.data.measurement_type(), Some("frequency_scan"));
        assert!(!station.hvsrc.as_deref().unwrap().output().unwrap());
    }
}
