//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};

use grow_dispatch::config::FacilityConfig;
use grow_dispatch::dispatch::clock::ManualClock;
use grow_dispatch::dispatch::engine::DispatchEngine;
use grow_dispatch::dispatch::executor::RecordingActuators;
use grow_dispatch::dispatch::types::{EnergyForecast, EnergyMeasurement, GridStress, LoadBreakdown};
use grow_dispatch::error::{EngineError, Result};
use grow_dispatch::forecast::ForecastSource;
use grow_dispatch::tariff::PriceBand;

/// Fixed start of every fixture run: 2024-07-01 00:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
}

/// Flat forecast: 250 kW demand (100 lighting, 100 HVAC), no renewables.
pub fn flat_forecast(horizon: usize, price: f32, dr_probability: f32) -> EnergyForecast {
    EnergyForecast {
        generated_at: start(),
        start_hour: 0,
        hour_of_day: (0..horizon as u32).map(|h| h % 24).collect(),
        photoperiod: (0..horizon).map(|h| (6..18).contains(&(h % 24))).collect(),
        price_band: vec![PriceBand::OffPeak; horizon],
        expected_demand_kw: vec![250.0; horizon],
        lighting_kw: vec![100.0; horizon],
        hvac_kw: vec![100.0; horizon],
        solar_kw: vec![0.0; horizon],
        wind_kw: vec![0.0; horizon],
        price: vec![price; horizon],
        demand_charge: vec![0.0; horizon],
        grid_stress: vec![GridStress::Normal; horizon],
        dr_probability: vec![dr_probability; horizon],
        carbon_intensity: 0.4,
    }
}

/// Measurement with the given subsystem loads and battery SOC.
pub fn measurement(at: DateTime<Utc>, loads: LoadBreakdown, soc: f32) -> EnergyMeasurement {
    let total = loads.total_kw();
    EnergyMeasurement {
        timestamp: at,
        total_power_kw: total,
        active_power_kw: total * 0.97,
        reactive_power_kvar: total * 0.24,
        power_factor: 0.97,
        frequency_hz: 60.0,
        voltage_v: 480.0,
        loads,
        solar_kw: 0.0,
        wind_kw: 0.0,
        battery_soc: soc,
        battery_power_kw: 0.0,
        grid_import_kw: total,
        grid_export_kw: 0.0,
        electricity_rate: 0.10,
        cost_to_date: 0.0,
        peak_demand_today_kw: total,
        carbon_intensity: 0.4,
        renewable_share: 0.0,
    }
}

/// Typical mid-day facility loads (420 kW total).
pub fn typical_loads() -> LoadBreakdown {
    LoadBreakdown {
        lighting_kw: 250.0,
        hvac_kw: 120.0,
        pumps_kw: 25.0,
        process_kw: 15.0,
        auxiliary_kw: 10.0,
    }
}

/// Lighting-only loads, for curtailment capacity arithmetic.
pub fn lighting_only(lighting_kw: f32) -> LoadBreakdown {
    LoadBreakdown {
        lighting_kw,
        ..LoadBreakdown::default()
    }
}

/// Engine on a manual clock at [`start`], recording every actuator command.
pub fn engine_with(
    config: FacilityConfig,
    forecaster: Box<dyn ForecastSource>,
) -> (Arc<DispatchEngine>, Arc<ManualClock>, Arc<RecordingActuators>) {
    let clock = Arc::new(ManualClock::new(start()));
    let actuators = Arc::new(RecordingActuators::new());
    let engine = DispatchEngine::new(config, forecaster, actuators.clone(), clock.clone()).unwrap();
    (Arc::new(engine), clock, actuators)
}

/// Returns `forecast` re-stamped with the cycle time, matching the horizon.
fn stamped(forecast: &EnergyForecast, now: DateTime<Utc>) -> EnergyForecast {
    EnergyForecast {
        generated_at: now,
        ..forecast.clone()
    }
}

/// Blocks inside `forecast` until released, signalling when it is entered.
pub struct GatedForecast {
    pub forecast: EnergyForecast,
    pub entered: Sender<()>,
    pub release: Receiver<()>,
}

impl ForecastSource for GatedForecast {
    fn forecast(
        &mut self,
        _config: &FacilityConfig,
        now: DateTime<Utc>,
        _latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        Ok(stamped(&self.forecast, now))
    }
}

/// Sleeps for `delay` before every forecast.
pub struct SlowForecast {
    pub forecast: EnergyForecast,
    pub delay: StdDuration,
}

impl ForecastSource for SlowForecast {
    fn forecast(
        &mut self,
        _config: &FacilityConfig,
        now: DateTime<Utc>,
        _latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast> {
        std::thread::sleep(self.delay);
        Ok(stamped(&self.forecast, now))
    }
}

/// Fails the first `failures` forecasts, then succeeds.
pub struct FlakyForecast {
    pub forecast: EnergyForecast,
    pub failures: usize,
}

impl ForecastSource for FlakyForecast {
    fn forecast(
        &mut self,
        _config: &FacilityConfig,
        now: DateTime<Utc>,
        _latest: Option<&EnergyMeasurement>,
    ) -> Result<EnergyForecast> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(EngineError::Forecast("upstream forecast service unavailable".into()));
        }
        Ok(stamped(&self.forecast, now))
    }
}
