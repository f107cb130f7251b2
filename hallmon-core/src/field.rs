use serde::{Deserialize, Serialize};

const MILLITESLA_PER_GAUSS: f64 = 0.1;

/// Linear hall sensor model: output voltage is `zero_level` with no field and
/// moves `sensitivity` volts per gauss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallCalibration {
    /// Highest raw ADC count.
    pub full_scale: f64,
    /// Voltage at `full_scale`.
    pub reference_voltage: f64,
    /// Sensor output at zero field, volts.
    pub zero_level: f64,
    /// Volts per gauss.
    pub sensitivity: f64,
}

impl Default for HallCalibration {
    fn default() -> Self {
        Self {
            full_scale: 4095.0,
            reference_voltage: 5.0,
            zero_level: 2.5,
            sensitivity: 0.0025,
        }
    }
}

impl HallCalibration {
    pub fn voltage(&self, raw: u16) -> f64 {
        f64::from(raw) / self.full_scale * self.reference_voltage
    }

    /// Field strength in millitesla for a raw ADC count. Negative values are
    /// the opposite pole.
    pub fn millitesla(&self, raw: u16) -> f64 {
        let gauss = (self.voltage(raw) - self.zero_level) / self.sensitivity;
        gauss * MILLITESLA_PER_GAUSS
    }
}
