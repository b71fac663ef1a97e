use rand::{SeedableRng, rngs::StdRng};

use crate::config::FacilityConfig;
use crate::devices::types::{Device, DeviceContext, bounded_variation};

/// Grow lighting bank with a photoperiod-aware baseline.
///
/// Draws `on_kw` (with bounded variability) inside the photoperiod and a
/// fixed `off_kw` outside it.
#[derive(Debug, Clone)]
pub struct GrowLighting {
    /// Lighting load during the photoperiod (kW).
    pub on_kw: f32,
    /// Lighting load outside the photoperiod (kW).
    pub off_kw: f32,
    /// Relative variability during the photoperiod (0.05 = ±5%).
    pub variability: f32,
    /// First photoperiod hour (inclusive).
    pub photoperiod_start: u32,
    /// Last photoperiod hour (exclusive).
    pub photoperiod_end: u32,
    rng: StdRng,
}

impl GrowLighting {
    /// Builds the lighting model from facility configuration.
    pub fn from_config(config: &FacilityConfig, seed: u64) -> Self {
        Self {
            on_kw: config.loads.lighting_on_kw.max(0.0),
            off_kw: config.loads.lighting_off_kw.max(0.0),
            variability: config.loads.lighting_variability.max(0.0),
            photoperiod_start: config.facility.photoperiod_start_hour,
            photoperiod_end: config.facility.photoperiod_end_hour,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns `true` when `hour` falls inside the core photoperiod.
    pub fn in_photoperiod(&self, hour: u32) -> bool {
        let hour = hour % 24;
        hour >= self.photoperiod_start && hour < self.photoperiod_end
    }
}

impl Device for GrowLighting {
    fn power_kw(&mut self, context: &DeviceContext) -> f32 {
        if self.in_photoperiod(context.hour_of_day) {
            (self.on_kw * bounded_variation(&mut self.rng, self.variability)).max(0.0)
        } else {
            self.off_kw
        }
    }

    fn device_type(&self) -> &'static str {
        "GrowLighting"
    }
}
