use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::RenewableConfig;
use crate::devices::types::{Device, DeviceContext, daylight_frac};

/// Rooftop PV array.
///
/// Output is zero outside `[sunrise_hour, sunset_hour)` and follows a
/// half-sine peaked at solar noon, scaled by nameplate capacity and a
/// weather factor drawn from `[weather_min, weather_max]`.
#[derive(Debug, Clone)]
pub struct SolarArray {
    /// Nameplate capacity in kilowatts.
    pub capacity_kw: f32,
    /// Sunrise hour (inclusive).
    pub sunrise_hour: u32,
    /// Sunset hour (exclusive).
    pub sunset_hour: u32,
    /// Lowest weather factor applied to clear-sky output.
    pub weather_min: f32,
    /// Highest weather factor applied to clear-sky output.
    pub weather_max: f32,
    rng: StdRng,
}

impl SolarArray {
    /// Creates a PV array from renewable configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Renewable generation parameters
    /// * `seed` - Random seed for reproducible weather draws
    pub fn from_config(config: &RenewableConfig, seed: u64) -> Self {
        let weather_min = config.weather_factor_min.clamp(0.0, 1.0);
        Self {
            capacity_kw: config.solar_capacity_kw.max(0.0),
            sunrise_hour: config.sunrise_hour,
            sunset_hour: config.sunset_hour,
            weather_min,
            weather_max: config.weather_factor_max.clamp(weather_min, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Clear-sky output at `hour` (kW).
    pub fn clear_sky_kw(&self, hour: u32) -> f32 {
        self.capacity_kw * daylight_frac(hour, self.sunrise_hour, self.sunset_hour)
    }
}

impl Device for SolarArray {
    fn power_kw(&mut self, context: &DeviceContext) -> f32 {
        let clear = self.clear_sky_kw(context.hour_of_day);
        if clear <= 0.0 {
            return 0.0;
        }
        let weather = self.rng.random_range(self.weather_min..=self.weather_max);
        clear * weather
    }

    fn device_type(&self) -> &'static str {
        "SolarPV"
    }
}
