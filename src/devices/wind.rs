use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::RenewableConfig;
use crate::devices::types::{Device, DeviceContext};

/// Small wind turbine with a linear power curve between cut-in and cut-out.
#[derive(Debug, Clone)]
pub struct WindTurbine {
    pub capacity_kw: f32,
    pub mean_speed_ms: f32,
    pub cut_in_ms: f32,
    pub cut_out_ms: f32,
    rng: StdRng,
}

impl WindTurbine {
    pub fn from_config(config: &RenewableConfig, seed: u64) -> Self {
        Self {
            capacity_kw: config.wind_capacity_kw.max(0.0),
            mean_speed_ms: config.mean_wind_speed_ms.max(0.0),
            cut_in_ms: config.cut_in_speed_ms,
            cut_out_ms: config.cut_out_speed_ms,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Output at wind speed `speed_ms` (kW).
    ///
    /// Zero below cut-in and above cut-out, linear from zero at cut-in to
    /// nameplate at cut-out.
    pub fn power_at_speed(&self, speed_ms: f32) -> f32 {
        if speed_ms < self.cut_in_ms || speed_ms > self.cut_out_ms {
            return 0.0;
        }
        let span = self.cut_out_ms - self.cut_in_ms;
        if span <= 0.0 {
            return 0.0;
        }
        self.capacity_kw * (speed_ms - self.cut_in_ms) / span
    }
}

impl Device for WindTurbine {
    fn power_kw(&mut self, _context: &DeviceContext) -> f32 {
        if self.capacity_kw <= 0.0 {
            return 0.0;
        }
        let speed = self.mean_speed_ms * self.rng.random_range(0.5..=1.5);
        self.power_at_speed(speed)
    }

    fn device_type(&self) -> &'static str {
        "Wind"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turbine() -> WindTurbine {
        let cfg = RenewableConfig {
            wind_capacity_kw: 50.0,
            ..RenewableConfig::default()
        };
        WindTurbine::from_config(&cfg, 3)
    }

    #[test]
    fn power_curve_cut_in_and_out() {
        let t = turbine();
        assert_eq!(t.power_at_speed(2.9), 0.0);
        assert_eq!(t.power_at_speed(3.0), 0.0);
        assert!((t.power_at_speed(14.0) - 25.0).abs() < 1e-4);
        assert!((t.power_at_speed(25.0) - 50.0).abs() < 1e-4);
        assert_eq!(t.power_at_speed(25.1), 0.0);
    }

    #[test]
    fn no_capacity_no_output() {
        let mut t = WindTurbine::from_config(&RenewableConfig::default(), 3);
        assert_eq!(t.power_kw(&DeviceContext::new(12)), 0.0);
    }

    #[test]
    fn sampled_output_bounded() {
        let mut t = turbine();
        for hour in 0..48 {
            let kw = t.power_kw(&DeviceContext::new(hour));
            assert!((0.0..=50.0).contains(&kw));
        }
    }
}
