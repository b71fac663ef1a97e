//! Time-of-use rate schedule and demand-charge window.

use serde::{Deserialize, Serialize};

/// Price band a given hour of day falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBand {
    OffPeak,
    MidPeak,
    OnPeak,
}

/// One contiguous band of the rate schedule, covering `[start_hour, end_hour)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateBand {
    /// Band classification.
    pub band: PriceBand,
    /// First hour of day covered (inclusive, 0-23).
    pub start_hour: u32,
    /// Last hour of day covered (exclusive, 1-24).
    pub end_hour: u32,
    /// Energy rate inside the band ($/kWh).
    pub rate: f32,
}

impl RateBand {
    fn covers(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

/// Utility tariff: time-of-use energy rates plus a demand-charge window.
///
/// Hours not covered by any band are billed at `off_peak_rate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TariffConfig {
    /// Rate for hours outside every configured band ($/kWh).
    pub off_peak_rate: f32,
    /// Mid- and on-peak bands keyed by hour of day.
    pub bands: Vec<RateBand>,
    /// Relative market variance layered on the band rate (0.10 = ±10%).
    #[serde(default = "default_market_variance")]
    pub market_variance: f32,
    /// Demand charge applied per kW of hourly net demand inside the window ($/kW).
    pub demand_charge_per_kw: f32,
    /// First hour of the demand-charge window (inclusive).
    pub demand_charge_start_hour: u32,
    /// Last hour of the demand-charge window (exclusive).
    pub demand_charge_end_hour: u32,
}

fn default_market_variance() -> f32 {
    0.10
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            off_peak_rate: 0.08,
            bands: vec![
                RateBand {
                    band: PriceBand::MidPeak,
                    start_hour: 7,
                    end_hour: 16,
                    rate: 0.12,
                },
                RateBand {
                    band: PriceBand::OnPeak,
                    start_hour: 16,
                    end_hour: 21,
                    rate: 0.22,
                },
                RateBand {
                    band: PriceBand::MidPeak,
                    start_hour: 21,
                    end_hour: 23,
                    rate: 0.12,
                },
            ],
            market_variance: default_market_variance(),
            demand_charge_per_kw: 0.05,
            demand_charge_start_hour: 12,
            demand_charge_end_hour: 20,
        }
    }
}

impl TariffConfig {
    /// Returns the band covering `hour` (wrapped to 0-23).
    pub fn band_at(&self, hour: u32) -> PriceBand {
        let hour = hour % 24;
        self.bands
            .iter()
            .find(|b| b.covers(hour))
            .map_or(PriceBand::OffPeak, |b| b.band)
    }

    /// Returns the scheduled energy rate at `hour` before market variance ($/kWh).
    pub fn rate_at(&self, hour: u32) -> f32 {
        let hour = hour % 24;
        self.bands
            .iter()
            .find(|b| b.covers(hour))
            .map_or(self.off_peak_rate, |b| b.rate)
    }

    /// Returns the demand charge at `hour`, zero outside the demand-charge window.
    pub fn demand_charge_at(&self, hour: u32) -> f32 {
        let hour = hour % 24;
        if hour >= self.demand_charge_start_hour && hour < self.demand_charge_end_hour {
            self.demand_charge_per_kw
        } else {
            0.0
        }
    }

    /// Returns `true` when `hour` is billed at the on-peak rate.
    pub fn is_peak(&self, hour: u32) -> bool {
        self.band_at(hour) == PriceBand::OnPeak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncovered_hours_fall_back_to_off_peak() {
        let tariff = TariffConfig::default();
        assert_eq!(tariff.band_at(3), PriceBand::OffPeak);
        assert_eq!(tariff.rate_at(3), 0.08);
        assert_eq!(tariff.band_at(23), PriceBand::OffPeak);
    }

    #[test]
    fn on_peak_band_covers_evening() {
        let tariff = TariffConfig::default();
        assert_eq!(tariff.band_at(16), PriceBand::OnPeak);
        assert_eq!(tariff.band_at(17), PriceBand::OnPeak);
        assert_eq!(tariff.band_at(20), PriceBand::OnPeak);
        assert_eq!(tariff.band_at(21), PriceBand::MidPeak);
        assert!(tariff.is_peak(17));
        assert_eq!(tariff.rate_at(17), 0.22);
    }

    #[test]
    fn hours_wrap_at_24() {
        let tariff = TariffConfig::default();
        assert_eq!(tariff.band_at(17 + 24), PriceBand::OnPeak);
    }

    #[test]
    fn demand_charge_only_inside_window() {
        let tariff = TariffConfig::default();
        assert_eq!(tariff.demand_charge_at(11), 0.0);
        assert_eq!(tariff.demand_charge_at(12), 0.05);
        assert_eq!(tariff.demand_charge_at(19), 0.05);
        assert_eq!(tariff.demand_charge_at(20), 0.0);
    }
}
