use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::devices::types::{Device, DeviceContext};

/// Battery energy storage state.
///
/// Holds the state of charge (SOC) and last commanded power and enforces the
/// configured power limits and depth-of-discharge floor. Round-trip efficiency
/// is applied on charge; discharge draws energy 1:1.
///
/// # Power Convention
/// - Positive power: charging (load on the facility bus)
/// - Negative power: discharging (supply to the facility bus)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Usable capacity in kilowatt-hours.
    pub capacity_kwh: f32,
    /// State of charge as a fraction (0.0 to 1.0).
    pub soc: f32,
    /// Last applied or observed power (kW).
    pub power_kw: f32,
    /// Maximum charge power in kilowatts (positive value).
    pub max_charge_kw: f32,
    /// Maximum discharge power in kilowatts (positive value).
    pub max_discharge_kw: f32,
    /// Round-trip efficiency applied on charge (0..1.0).
    pub efficiency: f32,
    /// Depth-of-discharge floor (0.0 to 1.0).
    pub min_soc: f32,
}

impl StorageState {
    /// Creates the storage state from configuration at its initial SOC.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            capacity_kwh: config.capacity_kwh.max(f32::EPSILON),
            soc: config.initial_soc.clamp(0.0, 1.0),
            power_kw: 0.0,
            max_charge_kw: config.max_charge_kw.max(0.0),
            max_discharge_kw: config.max_discharge_kw.max(0.0),
            efficiency: config.round_trip_efficiency.clamp(f32::EPSILON, 1.0),
            min_soc: config.min_soc.clamp(0.0, 1.0),
        }
    }

    /// Largest charge power that fits the remaining headroom over `dt_hours`.
    pub fn charge_headroom_kw(&self, dt_hours: f32) -> f32 {
        let kwh = (1.0 - self.soc).max(0.0) * self.capacity_kwh / self.efficiency;
        (kwh / dt_hours).min(self.max_charge_kw).max(0.0)
    }

    /// Largest discharge power that keeps SOC at or above `floor_soc`.
    pub fn discharge_available_kw(&self, floor_soc: f32, dt_hours: f32) -> f32 {
        let floor = floor_soc.max(self.min_soc);
        let kwh = (self.soc - floor).max(0.0) * self.capacity_kwh;
        (kwh / dt_hours).min(self.max_discharge_kw).max(0.0)
    }

    /// Applies a power setpoint for `dt_hours` and returns the actual power.
    ///
    /// The setpoint is clamped to the rate limits, then to what the SOC
    /// allows; SOC always stays within `[0, 1]`.
    pub fn apply(&mut self, setpoint_kw: f32, dt_hours: f32) -> f32 {
        if !setpoint_kw.is_finite() || dt_hours <= 0.0 {
            self.power_kw = 0.0;
            return 0.0;
        }

        let cmd_kw = if setpoint_kw >= 0.0 {
            setpoint_kw.min(self.max_charge_kw)
        } else {
            setpoint_kw.max(-self.max_discharge_kw)
        };

        let actual_kw = if cmd_kw > 0.0 {
            let actual = cmd_kw.min(self.charge_headroom_kw(dt_hours));
            self.soc += actual * dt_hours * self.efficiency / self.capacity_kwh;
            actual
        } else if cmd_kw < 0.0 {
            let actual = (-cmd_kw).min(self.discharge_available_kw(self.min_soc, dt_hours));
            self.soc -= actual * dt_hours / self.capacity_kwh;
            -actual
        } else {
            0.0
        };

        self.soc = self.soc.clamp(0.0, 1.0);
        self.power_kw = actual_kw;
        actual_kw
    }

    /// Updates the state from measured SOC and power.
    ///
    /// Non-finite readings are ignored; SOC is clamped to `[0, 1]`.
    pub fn observe(&mut self, soc: f32, power_kw: f32) {
        if soc.is_finite() {
            self.soc = soc.clamp(0.0, 1.0);
        }
        if power_kw.is_finite() {
            self.power_kw = power_kw;
        }
    }

    /// Energy currently stored (kWh).
    pub fn stored_kwh(&self) -> f32 {
        self.soc * self.capacity_kwh
    }
}

impl Device for StorageState {
    fn power_kw(&mut self, context: &DeviceContext) -> f32 {
        self.apply(context.setpoint_kw.unwrap_or(0.0), context.dt_hours)
    }

    fn device_type(&self) -> &'static str {
        "Battery"
    }
}
