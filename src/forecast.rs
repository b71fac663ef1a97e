//! Rolling-horizon forecasts of load, generation, price, and DR likelihood.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::config::FacilityConfig;
use crate::devices::{Device, DeviceContext, GrowLighting, HvacPlant, SolarArray, WindTurbine};
use crate::devices::types::bounded_variation;
use crate::dispatch::clock::local_time;
use crate::dispatch::types::{EnergyForecast, EnergyMeasurement, GridStress};
use crate::error::{EngineError, Result};
use crate::tariff::PriceBand;

/// Source of forecasts consumed by the dispatch engine.
///
/// Production code wraps a real forecasting service; tests inject fixtures.
pub trait ForecastSource: Send {
    /// Produces a forecast for `config.facility.horizon_hours` hours from `now`.
    ///
    /// # Arguments
    ///
    /// * `config` - Facility configuration in force for this cycle
    /// * `now` - Wall-clock time of the cycle
    /// * `latest` - Last known measurement, if any
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the forecast cannot be produced.
    fn forecast(
        &mut self,
        config: &FacilityConfig,
        now: DateTime<Utc>,
        latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast>;
}

/// Model-based forecast generator.
///
/// Structural fields (hour of day, price band, photoperiod) depend only on
/// configuration and the wall-clock hour. Load variability, weather, market
/// variance, and grid stress are drawn from a seeded RNG.
#[derive(Debug, Clone)]
pub struct ForecastGenerator {
    rng: StdRng,
}

impl ForecastGenerator {
    /// Creates a generator seeded from `config.facility.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the rate schedule or the
    /// storage/generation capacities are missing or unusable.
    pub fn new(config: &FacilityConfig) -> Result<Self> {
        Self::with_seed(config, config.facility.seed)
    }

    /// Creates a generator with an explicit seed.
    ///
    /// # Errors
    ///
    /// Same as [`ForecastGenerator::new`].
    pub fn with_seed(config: &FacilityConfig, seed: u64) -> Result<Self> {
        check_static_config(config)?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Generates a forecast starting at the local hour of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if static configuration is
    /// missing or unusable.
    pub fn generate(
        &mut self,
        config: &FacilityConfig,
        now: DateTime<Utc>,
        latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast> {
        check_static_config(config)?;

        let horizon = config.facility.horizon_hours;
        let local = local_time(now, config.facility.utc_offset_minutes);
        let start_hour = local.hour();
        let high_demand_month = config
            .demand_response
            .high_demand_months
            .contains(&local.month());

        let mut lighting = GrowLighting::from_config(config, self.rng.random());
        let mut hvac = HvacPlant::from_config(config);
        let mut solar = SolarArray::from_config(&config.renewables, self.rng.random());
        let mut wind = WindTurbine::from_config(&config.renewables, self.rng.random());
        let variance = config.tariff.market_variance;
        let dr = &config.demand_response;

        let mut forecast = EnergyForecast {
            generated_at: now,
            start_hour,
            hour_of_day: Vec::with_capacity(horizon),
            photoperiod: Vec::with_capacity(horizon),
            price_band: Vec::with_capacity(horizon),
            expected_demand_kw: Vec::with_capacity(horizon),
            lighting_kw: Vec::with_capacity(horizon),
            hvac_kw: Vec::with_capacity(horizon),
            solar_kw: Vec::with_capacity(horizon),
            wind_kw: Vec::with_capacity(horizon),
            price: Vec::with_capacity(horizon),
            demand_charge: Vec::with_capacity(horizon),
            grid_stress: Vec::with_capacity(horizon),
            dr_probability: Vec::with_capacity(horizon),
            carbon_intensity: carbon_intensity(config, latest),
        };

        for i in 0..horizon {
            let hour = (start_hour + i as u32) % 24;
            let ctx = DeviceContext::new(hour);
            let band = config.tariff.band_at(hour);

            let lighting_kw = lighting.power_kw(&ctx);
            let hvac_kw = hvac.power_kw(&ctx);
            let demand_kw = lighting_kw + hvac_kw + config.loads.other_loads_kw;

            let price = config.tariff.rate_at(hour) * bounded_variation(&mut self.rng, variance);

            let mut probability = dr.base_event_probability;
            if band == PriceBand::OnPeak {
                probability *= dr.peak_multiplier;
            }
            if high_demand_month {
                probability *= dr.seasonal_multiplier;
            }

            forecast.hour_of_day.push(hour);
            forecast.photoperiod.push(lighting.in_photoperiod(hour));
            forecast.price_band.push(band);
            forecast.expected_demand_kw.push(demand_kw);
            forecast.lighting_kw.push(lighting_kw);
            forecast.hvac_kw.push(hvac_kw);
            forecast.solar_kw.push(solar.power_kw(&ctx));
            forecast.wind_kw.push(wind.power_kw(&ctx));
            forecast.price.push(price.max(0.0));
            forecast.demand_charge.push(config.tariff.demand_charge_at(hour));
            forecast.grid_stress.push(sample_stress(&mut self.rng, band));
            forecast.dr_probability.push(probability.clamp(0.0, 1.0));
        }

        debug!(
            horizon,
            start_hour,
            high_demand_month,
            "forecast generated"
        );
        Ok(forecast)
    }
}

impl ForecastSource for ForecastGenerator {
    fn forecast(
        &mut self,
        config: &FacilityConfig,
        now: DateTime<Utc>,
        latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast> {
        self.generate(config, now, latest)
    }
}

/// Replays a fixed forecast, re-stamped with the cycle time.
#[derive(Debug, Clone)]
pub struct FixedForecast {
    forecast: EnergyForecast,
}

impl FixedForecast {
    pub fn new(forecast: EnergyForecast) -> Self {
        Self { forecast }
    }
}

impl ForecastSource for FixedForecast {
    fn forecast(
        &mut self,
        _config: &FacilityConfig,
        now: DateTime<Utc>,
        _latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast> {
        Ok(EnergyForecast {
            generated_at: now,
            ..self.forecast.clone()
        })
    }
}

/// Fails fast when static configuration needed for forecasting is unusable.
fn check_static_config(config: &FacilityConfig) -> Result<()> {
    let missing = |what: &str| Err(EngineError::Configuration(what.to_string()));

    if config.facility.horizon_hours == 0 {
        return missing("facility.horizon_hours must be > 0");
    }
    let tariff = &config.tariff;
    if !(tariff.off_peak_rate.is_finite() && tariff.off_peak_rate > 0.0) {
        return missing("tariff.off_peak_rate is missing or not positive");
    }
    if tariff
        .bands
        .iter()
        .any(|b| !(b.rate.is_finite() && b.rate > 0.0) || b.start_hour >= b.end_hour)
    {
        return missing("tariff.bands contains an unusable rate band");
    }
    if !(config.storage.capacity_kwh.is_finite() && config.storage.capacity_kwh > 0.0) {
        return missing("storage.capacity_kwh is missing or not positive");
    }
    let r = &config.renewables;
    if !(r.solar_capacity_kw.is_finite() && r.wind_capacity_kw.is_finite()) {
        return missing("renewables capacities must be finite");
    }
    if r.sunrise_hour >= r.sunset_hour {
        return missing("renewables.sunrise_hour must be before renewables.sunset_hour");
    }
    Ok(())
}

fn carbon_intensity(config: &FacilityConfig, latest: Option<&EnergyMeasurement>) -> f32 {
    latest
        .map(|m| m.carbon_intensity)
        .filter(|c| c.is_finite() && *c >= 0.0)
        .unwrap_or(config.facility.default_carbon_intensity)
}

/// Samples a grid stress level, biased upward in higher price bands.
fn sample_stress(rng: &mut StdRng, band: PriceBand) -> GridStress {
    // Cumulative thresholds for Normal, Elevated, High; the rest is Critical.
    let [normal, elevated, high] = match band {
        PriceBand::OffPeak => [0.80, 0.95, 1.0],
        PriceBand::MidPeak => [0.50, 0.80, 0.95],
        PriceBand::OnPeak => [0.20, 0.50, 0.85],
    };
    let r: f32 = rng.random();
    if r < normal {
        GridStress::Normal
    } else if r < elevated {
        GridStress::Elevated
    } else if r < high {
        GridStress::High
    } else {
        GridStress::Critical
    }
}
