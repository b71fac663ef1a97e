use std::f32::consts::PI;

use crate::config::FacilityConfig;
use crate::devices::types::{Device, DeviceContext};

/// Hour of day at which HVAC load peaks.
const PEAK_HOUR: f32 = 13.0;

/// Relative HVAC power change per °C of setpoint offset.
const POWER_PER_DEGREE: f32 = 0.1;

/// HVAC plant with a smooth diurnal load curve peaked near midday.
#[derive(Debug, Clone)]
pub struct HvacPlant {
    /// Load at the overnight minimum (kW).
    pub base_kw: f32,
    /// Additional load at the midday peak (kW).
    pub amplitude_kw: f32,
    /// Nominal setpoint (°C).
    pub nominal_setpoint_c: f32,
}

impl HvacPlant {
    pub fn from_config(config: &FacilityConfig) -> Self {
        Self {
            base_kw: config.loads.hvac_base_kw.max(0.0),
            amplitude_kw: config.loads.hvac_amplitude_kw.max(0.0),
            nominal_setpoint_c: config.loads.hvac_setpoint_c,
        }
    }

    /// Baseline load at `hour` under the nominal setpoint (kW).
    pub fn baseline_kw(&self, hour: u32) -> f32 {
        let phase = 2.0 * PI * ((hour % 24) as f32 - PEAK_HOUR) / 24.0;
        self.base_kw + self.amplitude_kw * (1.0 + phase.cos()) / 2.0
    }

    /// Power multiplier for running at `setpoint_c` instead of nominal.
    ///
    /// Raising the setpoint reduces load; lowering it increases load.
    pub fn setpoint_factor(&self, setpoint_c: f32) -> f32 {
        (1.0 - POWER_PER_DEGREE * (setpoint_c - self.nominal_setpoint_c)).clamp(0.5, 1.5)
    }
}

impl Device for HvacPlant {
    fn power_kw(&mut self, context: &DeviceContext) -> f32 {
        self.baseline_kw(context.hour_of_day)
    }

    fn device_type(&self) -> &'static str {
        "HVAC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peaks_near_midday() {
        let hvac = HvacPlant::from_config(&FacilityConfig::baseline());
        assert!((hvac.baseline_kw(13) - 140.0).abs() < 1e-3);
        assert!((hvac.baseline_kw(1) - 80.0).abs() < 1e-3);
        assert!(hvac.baseline_kw(12) > hvac.baseline_kw(6));
    }

    #[test]
    fn setpoint_factor_direction() {
        let hvac = HvacPlant::from_config(&FacilityConfig::baseline());
        assert!(hvac.setpoint_factor(26.0) < 1.0);
        assert!(hvac.setpoint_factor(22.5) > 1.0);
        assert_eq!(hvac.setpoint_factor(24.0), 1.0);
    }
}
