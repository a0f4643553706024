//! # 模拟测试台
//!
//! 所有模拟仪器共享同一个被测器件模型，便于在没有硬件时运行完整序列。
//!
//! ## 器件模型
//! - 二极管漏电流：`sign(V) * (k * sqrt(min(|V|, V_fd)) + |V| / R_shunt)`，
//!   超过击穿电压后指数增长
//! - 耗尽电容：`C_fd * sqrt(V_fd / (min(|V|, V_fd) + V_bi))`
//! - 四线电阻：`V = I * R`
//! - 读数带相对噪声，由固定种子的随机数生成器产生
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 和 `engine/` 测试使用
//! - 使用 `rand` 生成可复现噪声

use super::{
    ElectrometerSetup, EnvironmentData, EnvironmentMonitor, Electrometer, FilterType,
    InstrumentError, InstrumentResult, LcrMeter, LcrSetup, RouteTerminal, SenseMode,
    SourceFunction, SourceMeter, Station, SwitchMatrix,
};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// 被测器件参数
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceModel {
    /// 漏电流系数 [A/sqrt(V)]
    pub leakage: f64,
    pub shunt_resistance: f64,
    pub breakdown_voltage: f64,
    pub depletion_voltage: f64,
    /// 全耗尽电容 [F]
    pub depletion_capacitance: f64,
    pub built_in_voltage: f64,
    /// LCR 并联电阻 [Ohm]
    pub parallel_resistance: f64,
    /// 四线测量电阻 [Ohm]
    pub resistance: f64,
    /// 相对噪声幅度
    pub noise: f64,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            leakage: 1e-9,
            shunt_resistance: 1e12,
            breakdown_voltage: 1200.0,
            depletion_voltage: 250.0,
            depletion_capacitance: 50e-12,
            built_in_voltage: 0.5,
            parallel_resistance: 1e9,
            resistance: 1.5e3,
            noise: 1e-4,
        }
    }
}

impl DeviceModel {
    /// 给定偏压下的漏电流
    pub fn leakage_current(&self, voltage: f64) -> f64 {
        let magnitude = voltage.abs();
        let mut current = self.leakage * magnitude.min(self.depletion_voltage).sqrt()
            + magnitude / self.shunt_resistance;
        if magnitude > self.breakdown_voltage {
            current *= ((magnitude - self.breakdown_voltage) / 10.0).exp();
        }
        current.copysign(voltage)
    }

    /// 给定偏压下的电容
    pub fn capacitance(&self, voltage: f64) -> f64 {
        let effective = voltage.abs().min(self.depletion_voltage) + self.built_in_voltage;
        self.depletion_capacitance * (self.depletion_voltage / effective).sqrt()
    }
}

/// 偏压来源
#[derive(Debug, Clone, Copy)]
enum BiasSlot {
    HvSource,
    VSource,
    Lcr,
}

#[derive(Debug)]
struct DeviceState {
    model: DeviceModel,
    bias: [f64; 3],
    rng: StdRng,
}

impl DeviceState {
    fn voltage(&self) -> f64 {
        self.bias.iter().sum()
    }

    fn noisy(&mut self, value: f64) -> f64 {
        let noise = self.model.noise;
        if noise == 0.0 {
            return value;
        }
        value * (1.0 + self.rng.gen_range(-noise..=noise))
    }
}

/// 共享的被测器件
#[derive(Debug, Clone)]
pub struct SharedDevice(Arc<Mutex<DeviceState>>);

impl SharedDevice {
    pub fn new(model: DeviceModel, seed: u64) -> Self {
        Self(Arc::new(Mutex::new(DeviceState {
            model,
            bias: [0.0; 3],
            rng: StdRng::seed_from_u64(seed),
        })))
    }

    fn with<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> InstrumentResult<R> {
        let mut state = self
            .0
            .lock()
            .map_err(|_| InstrumentError::Communication("device model lock poisoned".to_string()))?;
        Ok(f(&mut state))
    }

    fn set_bias(&self, slot: BiasSlot, voltage: f64) -> InstrumentResult<()> {
        self.with(|state| state.bias[slot as usize] = voltage)
    }

    /// 器件上的总偏压
    pub fn voltage(&self) -> InstrumentResult<f64> {
        self.with(|state| state.voltage())
    }
}

fn no_error() -> (i32, String) {
    (0, "No error".to_string())
}

// ─────────────────────────────────────────────────────────────
// 源表
// ─────────────────────────────────────────────────────────────

/// 模拟源表
#[derive(Debug)]
pub struct SimSourceMeter {
    device: SharedDevice,
    slot: BiasSlot,
    output: bool,
    function: SourceFunction,
    voltage_level: f64,
    current_level: f64,
    current_compliance: f64,
    voltage_compliance: f64,
    errors: Vec<(i32, String)>,
}

impl SimSourceMeter {
    fn new(device: SharedDevice, slot: BiasSlot) -> Self {
        Self {
            device,
            slot,
            output: false,
            function: SourceFunction::Voltage,
            voltage_level: 0.0,
            current_level: 0.0,
            current_compliance: 1e-6,
            voltage_compliance: 20.0,
            errors: Vec::new(),
        }
    }

    fn apply_bias(&self) -> InstrumentResult<()> {
        let voltage = match (self.output, self.function) {
            (true, SourceFunction::Voltage) => self.voltage_level,
            _ => 0.0,
        };
        self.device.set_bias(self.slot, voltage)
    }

    fn measured_current(&mut self) -> InstrumentResult<f64> {
        if !self.output {
            return Ok(0.0);
        }
        match self.function {
            SourceFunction::Current => Ok(self.current_level),
            SourceFunction::Voltage => self.device.with(|state| {
                let voltage = state.voltage();
                let current = state.model.leakage_current(voltage);
                state.noisy(current)
            }),
        }
    }

    fn measured_voltage(&mut self) -> InstrumentResult<f64> {
        if !self.output {
            return Ok(0.0);
        }
        match self.function {
            SourceFunction::Voltage => Ok(self.voltage_level),
            SourceFunction::Current => {
                let current = self.current_level;
                self.device.with(|state| {
                    let voltage = current * state.model.resistance;
                    state.noisy(voltage)
                })
            }
        }
    }

    fn range_error(&mut self, message: &str) {
        self.errors.push((-222, format!("Data out of range; {}", message)));
    }
}

impl SourceMeter for SimSourceMeter {
    fn reset(&mut self) -> InstrumentResult<()> {
        self.output = false;
        self.function = SourceFunction::Voltage;
        self.voltage_level = 0.0;
        self.current_level = 0.0;
        self.errors.clear();
        self.apply_bias()
    }

    fn clear(&mut self) -> InstrumentResult<()> {
        self.errors.clear();
        Ok(())
    }

    fn next_error(&mut self) -> InstrumentResult<(i32, String)> {
        if self.errors.is_empty() {
            Ok(no_error())
        } else {
            Ok(self.errors.remove(0))
        }
    }

    fn output(&self) -> InstrumentResult<bool> {
        Ok(self.output)
    }

    fn set_output(&mut self, enabled: bool) -> InstrumentResult<()> {
        self.output = enabled;
        self.apply_bias()
    }

    fn set_source_function(&mut self, function: SourceFunction) -> InstrumentResult<()> {
        self.function = function;
        self.apply_bias()
    }

    fn voltage_level(&self) -> InstrumentResult<f64> {
        Ok(self.voltage_level)
    }

    fn set_voltage_level(&mut self, voltage: f64) -> InstrumentResult<()> {
        self.voltage_level = voltage;
        self.apply_bias()
    }

    fn current_level(&self) -> InstrumentResult<f64> {
        Ok(self.current_level)
    }

    fn set_current_level(&mut self, current: f64) -> InstrumentResult<()> {
        self.current_level = current;
        Ok(())
    }

    fn set_current_compliance(&mut self, current: f64) -> InstrumentResult<()> {
        if current <= 0.0 {
            self.range_error("current compliance");
        } else {
            self.current_compliance = current;
        }
        Ok(())
    }

    fn set_voltage_compliance(&mut self, voltage: f64) -> InstrumentResult<()> {
        if voltage <= 0.0 {
            self.range_error("voltage compliance");
        } else {
            self.voltage_compliance = voltage;
        }
        Ok(())
    }

    fn compliance_tripped(&mut self) -> InstrumentResult<bool> {
        if !self.output {
            return Ok(false);
        }
        match self.function {
            SourceFunction::Voltage => {
                let current = self
                    .device
                    .with(|state| state.model.leakage_current(state.voltage()))?;
                Ok(current.abs() >= self.current_compliance)
            }
            SourceFunction::Current => {
                let current = self.current_level;
                let voltage = self.device.with(|state| current * state.model.resistance)?;
                Ok(voltage.abs() >= self.voltage_compliance)
            }
        }
    }

    fn set_sense_mode(&mut self, _mode: SenseMode) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_route_terminal(&mut self, _terminal: RouteTerminal) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_filter_enable(&mut self, _enabled: bool) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_filter_count(&mut self, count: u32) -> InstrumentResult<()> {
        if count == 0 || count > 100 {
            self.range_error("filter count");
        }
        Ok(())
    }

    fn set_filter_type(&mut self, _filter_type: FilterType) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_source_voltage_autorange(&mut self, _enabled: bool) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_source_voltage_range(&mut self, voltage: f64) -> InstrumentResult<()> {
        if voltage <= 0.0 {
            self.range_error("source voltage range");
        }
        Ok(())
    }

    fn read_current(&mut self) -> InstrumentResult<f64> {
        let current = self.measured_current()?;
        if self.function == SourceFunction::Voltage && current.abs() > self.current_compliance {
            return Ok(self.current_compliance.copysign(current));
        }
        Ok(current)
    }

    fn read_voltage(&mut self) -> InstrumentResult<f64> {
        let voltage = self.measured_voltage()?;
        if self.function == SourceFunction::Current && voltage.abs() > self.voltage_compliance {
            return Ok(self.voltage_compliance.copysign(voltage));
        }
        Ok(voltage)
    }
}

// ─────────────────────────────────────────────────────────────
// LCR 表
// ─────────────────────────────────────────────────────────────

/// 模拟 LCR 表
#[derive(Debug)]
pub struct SimLcrMeter {
    device: SharedDevice,
    setup: Option<LcrSetup>,
    bias_voltage: f64,
    bias_state: bool,
}

impl SimLcrMeter {
    fn new(device: SharedDevice) -> Self {
        Self {
            device,
            setup: None,
            bias_voltage: 0.0,
            bias_state: false,
        }
    }

    fn apply_bias(&self) -> InstrumentResult<()> {
        let voltage = if self.bias_state { self.bias_voltage } else { 0.0 };
        self.device.set_bias(BiasSlot::Lcr, voltage)
    }
}

impl LcrMeter for SimLcrMeter {
    fn reset(&mut self) -> InstrumentResult<()> {
        self.setup = None;
        self.bias_voltage = 0.0;
        self.bias_state = false;
        self.apply_bias()
    }

    fn next_error(&mut self) -> InstrumentResult<(i32, String)> {
        Ok(no_error())
    }

    fn configure(&mut self, setup: &LcrSetup) -> InstrumentResult<()> {
        if setup.frequency <= 0.0 || setup.amplitude <= 0.0 {
            return Err(InstrumentError::Device {
                code: -222,
                message: "Data out of range".to_string(),
            });
        }
        self.setup = Some(setup.clone());
        Ok(())
    }

    fn bias_voltage(&self) -> InstrumentResult<f64> {
        Ok(self.bias_voltage)
    }

    fn set_bias_voltage(&mut self, voltage: f64) -> InstrumentResult<()> {
        self.bias_voltage = voltage;
        self.apply_bias()
    }

    fn bias_state(&self) -> InstrumentResult<bool> {
        Ok(self.bias_state)
    }

    fn set_bias_state(&mut self, enabled: bool) -> InstrumentResult<()> {
        self.bias_state = enabled;
        self.apply_bias()
    }

    fn bias_current(&mut self) -> InstrumentResult<f64> {
        if !self.bias_state {
            return Ok(0.0);
        }
        self.device.with(|state| {
            let current = state.model.leakage_current(state.voltage());
            state.noisy(current)
        })
    }

    fn acquire_reading(&mut self) -> InstrumentResult<(f64, f64)> {
        if self.setup.is_none() {
            return Err(InstrumentError::Device {
                code: -221,
                message: "Settings conflict; not configured".to_string(),
            });
        }
        self.device.with(|state| {
            let capacitance = state.model.capacitance(state.voltage());
            let resistance = state.model.parallel_resistance;
            (state.noisy(capacitance), state.noisy(resistance))
        })
    }
}

// ─────────────────────────────────────────────────────────────
// 静电计、环境、矩阵
// ─────────────────────────────────────────────────────────────

/// 模拟静电计
#[derive(Debug)]
pub struct SimElectrometer {
    device: SharedDevice,
    zero_check: bool,
    configured: bool,
}

impl Electrometer for SimElectrometer {
    fn reset(&mut self) -> InstrumentResult<()> {
        self.zero_check = false;
        self.configured = false;
        Ok(())
    }

    fn next_error(&mut self) -> InstrumentResult<(i32, String)> {
        Ok(no_error())
    }

    fn configure(&mut self, setup: &ElectrometerSetup) -> InstrumentResult<()> {
        if setup.integration_rate == 0 {
            return Err(InstrumentError::Device {
                code: -222,
                message: "Data out of range; integration rate".to_string(),
            });
        }
        self.configured = true;
        Ok(())
    }

    fn zero_check(&self) -> InstrumentResult<bool> {
        Ok(self.zero_check)
    }

    fn set_zero_check(&mut self, enabled: bool) -> InstrumentResult<()> {
        self.zero_check = enabled;
        Ok(())
    }

    fn read_current(&mut self, timeout: f64) -> InstrumentResult<f64> {
        if timeout <= 0.0 {
            return Err(InstrumentError::Timeout(format!(
                "Electrometer reading timeout, exceeded {} s",
                timeout
            )));
        }
        if self.zero_check {
            return Ok(0.0);
        }
        self.device.with(|state| {
            let current = state.model.leakage_current(state.voltage());
            state.noisy(current)
        })
    }
}

/// 模拟环境监测箱
#[derive(Debug)]
pub struct SimEnvironment {
    rng: StdRng,
}

impl EnvironmentMonitor for SimEnvironment {
    fn read(&mut self) -> InstrumentResult<EnvironmentData> {
        Ok(EnvironmentData {
            box_temperature: 22.5 + self.rng.gen_range(-0.05..=0.05),
            chuck_temperature: 20.0 + self.rng.gen_range(-0.05..=0.05),
            box_humidity: 30.0 + self.rng.gen_range(-0.5..=0.5),
        })
    }
}

/// 模拟开关矩阵
#[derive(Debug, Default)]
pub struct SimMatrix {
    closed: Vec<String>,
}

impl SimMatrix {
    /// 初始即有闭合通道的矩阵
    pub fn with_closed(channels: &[&str]) -> Self {
        Self {
            closed: channels.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl SwitchMatrix for SimMatrix {
    fn closed_channels(&mut self) -> InstrumentResult<Vec<String>> {
        Ok(self.closed.clone())
    }

    fn close_channels(&mut self, channels: &[String]) -> InstrumentResult<()> {
        for channel in channels {
            if !self.closed.contains(channel) {
                self.closed.push(channel.clone());
            }
        }
        Ok(())
    }

    fn open_all(&mut self) -> InstrumentResult<()> {
        self.closed.clear();
        Ok(())
    }
}

/// 创建所有角色齐全的模拟测试台
pub fn create_station(model: DeviceModel, seed: u64) -> Station {
    let device = SharedDevice::new(model, seed);
    Station {
        hvsrc: Some(Box::new(SimSourceMeter::new(device.clone(), BiasSlot::HvSource))),
        vsrc: Some(Box::new(SimSourceMeter::new(device.clone(), BiasSlot::VSource))),
        lcr: Some(Box::new(SimLcrMeter::new(device.clone()))),
        elm: Some(Box::new(SimElectrometer {
            device,
            zero_check: false,
            configured: false,
        })),
        environ: Some(Box::new(SimEnvironment {
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
        })),
        matrix: Some(Box::new(SimMatrix::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_model() -> DeviceModel {
        DeviceModel {
            noise: 0.0,
            ..DeviceModel::default()
        }
    }

    #[test]
    fn test_device_model() {
        let model = quiet_model();
        assert_eq!(model.leakage_current(0.0), 0.0);
        assert!(model.leakage_current(-100.0) < 0.0);
        assert!(model.leakage_current(100.0) > 0.0);
        assert!(model.capacitance(-10.0) > model.capacitance(-100.0));
        assert_eq!(model.capacitance(-300.0), model.capacitance(-500.0));
        assert!(model.leakage_current(-1300.0).abs() > 1e3 * model.leakage_current(-1000.0).abs());
    }

    #[test]
    fn test_sources_share_device() {
        let mut station = create_station(quiet_model(), 1);
        let hvsrc = station.hvsrc.as_deref_mut().unwrap();
        hvsrc.set_output(true).unwrap();
        hvsrc.set_voltage_level(-100.0).unwrap();
        let expected = quiet_model().leakage_current(-100.0);
        assert_eq!(hvsrc.read_current().unwrap(), expected);

        let elm = station.elm.as_deref_mut().unwrap();
        assert_eq!(elm.read_current(1.0).unwrap(), expected);
        elm.set_zero_check(true).unwrap();
        assert_eq!(elm.read_current(1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_compliance_trip() {
        let mut station = create_station(quiet_model(), 1);
        let hvsrc = station.hvsrc.as_deref_mut().unwrap();
        hvsrc.set_current_compliance(1e-9).unwrap();
        hvsrc.set_output(true).unwrap();
        hvsrc.set_voltage_level(-100.0).unwrap();
        assert!(hvsrc.compliance_tripped().unwrap());
        assert_eq!(hvsrc.read_current().unwrap(), -1e-9);
        hvsrc.set_voltage_level(0.0).unwrap();
        assert!(!hvsrc.compliance_tripped().unwrap());
    }

    #[test]
    fn test_four_wire_resistor() {
        let mut station = create_station(quiet_model(), 1);
        let vsrc = station.vsrc.as_deref_mut().unwrap();
        vsrc.set_source_function(SourceFunction::Current).unwrap();
        vsrc.set_voltage_compliance(10.0).unwrap();
        vsrc.set_output(true).unwrap();
        vsrc.set_current_level(1e-3).unwrap();
        assert!((vsrc.read_voltage().unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_error_queue() {
        let mut station = create_station(quiet_model(), 1);
        let hvsrc = station.hvsrc.as_deref_mut().unwrap();
        hvsrc.set_filter_count(0).unwrap();
        assert_eq!(hvsrc.next_error().unwrap().0, -222);
        assert_eq!(hvsrc.next_error().unwrap().0, 0);
    }

    #[test]
    fn test_lcr_requires_configuration() {
        let mut station = create_station(quiet_model(), 1);
        let lcr = station.lcr.as_deref_mut().unwrap();
        assert!(lcr.acquire_reading().is_err());
    }

    #[test]
    fn test_matrix() {
        let mut matrix = SimMatrix::with_closed(&["1A01"]);
        assert_eq!(matrix.closed_channels().unwrap(), vec!["1A01"]);
        matrix.open_all().unwrap();
        matrix.close_channels(&["2B04".to_string()]).unwrap();
        assert_eq!(matrix.closed_channels().unwrap(), vec!["2B04"]);
    }
}
