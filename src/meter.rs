//! Measurement ingress: the `MeasurementSource` boundary and two sources.
//!
//! [`SimulatedMeter`] synthesizes seeded telemetry from the device models and
//! reacts to commands sent through its paired [`SimulatedActuators`].
//! [`ReplayMeter`] plays back fixture measurements, including gaps.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::{FacilityConfig, LoadCategory};
use crate::devices::types::gaussian_noise;
use crate::devices::{Device, DeviceContext, GrowLighting, HvacPlant, SolarArray, StorageState, WindTurbine};
use crate::dispatch::clock::local_time;
use crate::dispatch::executor::Actuators;
use crate::dispatch::power_balance::{grid_split, net_demand_kw};
use crate::dispatch::types::{EnergyMeasurement, LoadBreakdown};
use crate::error::ActuatorError;

/// Share of the fixed "other" load drawn by pumps, process, and auxiliary loads.
const PUMPS_SHARE: f32 = 0.5;
const PROCESS_SHARE: f32 = 0.3;
const AUXILIARY_SHARE: f32 = 0.2;

const NOMINAL_FREQUENCY_HZ: f32 = 60.0;
const NOMINAL_VOLTAGE_V: f32 = 480.0;

/// Supplies one measurement per polling tick.
///
/// `None` signals a missed tick; the engine then reuses the last measurement.
pub trait MeasurementSource: Send {
    fn poll(&mut self, now: DateTime<Utc>) -> Option<EnergyMeasurement>;
}

/// Actuator state the simulated plant responds to.
#[derive(Debug)]
struct PlantState {
    lighting_dimming: f32,
    hvac_setpoint_c: Option<f32>,
    battery_setpoint_kw: f32,
    curtailed_kw: HashMap<String, f32>,
}

impl Default for PlantState {
    fn default() -> Self {
        Self {
            lighting_dimming: 1.0,
            hvac_setpoint_c: None,
            battery_setpoint_kw: 0.0,
            curtailed_kw: HashMap::new(),
        }
    }
}

/// Seeded plant simulator used for demos and dry runs.
#[derive(Debug)]
pub struct SimulatedMeter {
    config: FacilityConfig,
    lighting: GrowLighting,
    hvac: HvacPlant,
    solar: SolarArray,
    wind: WindTurbine,
    battery: StorageState,
    rng: StdRng,
    plant: Arc<Mutex<PlantState>>,
    tick_hours: f32,
    cost_to_date: f32,
    peak_today_kw: f32,
    day: Option<NaiveDate>,
    drop_every: Option<u64>,
    polls: u64,
}

impl SimulatedMeter {
    /// Creates a simulator seeded from `config.facility.seed`.
    pub fn new(config: &FacilityConfig) -> Self {
        let seed = config.facility.seed;
        Self {
            config: config.clone(),
            lighting: GrowLighting::from_config(config, seed.wrapping_add(1)),
            hvac: HvacPlant::from_config(config),
            solar: SolarArray::from_config(&config.renewables, seed.wrapping_add(2)),
            wind: WindTurbine::from_config(&config.renewables, seed.wrapping_add(3)),
            battery: StorageState::from_config(&config.storage),
            rng: StdRng::seed_from_u64(seed.wrapping_add(4)),
            plant: Arc::new(Mutex::new(PlantState::default())),
            tick_hours: config.engine.tick_seconds as f32 / 3600.0,
            cost_to_date: 0.0,
            peak_today_kw: 0.0,
            day: None,
            drop_every: None,
            polls: 0,
        }
    }

    /// Drops every `every`-th poll to simulate missed ticks.
    pub fn with_gaps(mut self, every: u64) -> Self {
        self.drop_every = (every > 0).then_some(every);
        self
    }

    /// Actuators wired to this simulated plant.
    pub fn actuators(&self) -> SimulatedActuators {
        SimulatedActuators {
            plant: Arc::clone(&self.plant),
        }
    }

    fn category_of(&self, load_id: &str) -> Option<LoadCategory> {
        self.config.curtailable_load(load_id).map(|l| l.category)
    }

    fn sample(&mut self, now: DateTime<Utc>) -> EnergyMeasurement {
        let local = local_time(now, self.config.facility.utc_offset_minutes);
        let hour = local.hour();
        let ctx = DeviceContext::new(hour);

        let (dimming, setpoint, battery_setpoint, curtailed) = {
            let plant = self.plant.lock();
            (
                plant.lighting_dimming,
                plant.hvac_setpoint_c,
                plant.battery_setpoint_kw,
                plant.curtailed_kw.clone(),
            )
        };

        let other = self.config.loads.other_loads_kw.max(0.0);
        let setpoint = setpoint.unwrap_or(self.hvac.nominal_setpoint_c);
        let hvac_noise = 1.0 + gaussian_noise(&mut self.rng, 0.02);
        let mut loads = LoadBreakdown {
            lighting_kw: self.lighting.power_kw(&ctx) * dimming,
            hvac_kw: (self.hvac.power_kw(&ctx) * self.hvac.setpoint_factor(setpoint) * hvac_noise)
                .max(0.0),
            pumps_kw: other * PUMPS_SHARE,
            process_kw: other * PROCESS_SHARE,
            auxiliary_kw: other * AUXILIARY_SHARE,
        };
        for (load_id, kw) in &curtailed {
            let Some(category) = self.category_of(load_id) else {
                continue;
            };
            let slot = match category {
                LoadCategory::Lighting => &mut loads.lighting_kw,
                LoadCategory::Hvac => &mut loads.hvac_kw,
                LoadCategory::Pumps => &mut loads.pumps_kw,
                LoadCategory::Process => &mut loads.process_kw,
                LoadCategory::Auxiliary => &mut loads.auxiliary_kw,
            };
            *slot = (*slot - kw).max(0.0);
        }

        let solar_kw = self.solar.power_kw(&ctx);
        let wind_kw = self.wind.power_kw(&ctx);
        let battery_kw = self.battery.apply(battery_setpoint, self.tick_hours);
        let total_kw = loads.total_kw();
        let net_kw = net_demand_kw(total_kw, solar_kw + wind_kw, battery_kw);
        let (import_kw, export_kw) = grid_split(net_kw);
        let rate = self.config.tariff.rate_at(hour);

        let today = local.date();
        if self.day != Some(today) {
            self.day = Some(today);
            self.cost_to_date = 0.0;
            self.peak_today_kw = 0.0;
        }
        self.cost_to_date += import_kw * rate * self.tick_hours;
        self.peak_today_kw = self.peak_today_kw.max(total_kw);

        let power_factor: f32 = self.rng.random_range(0.95..=0.99);
        let renewable_share = if total_kw > 0.0 {
            ((solar_kw + wind_kw) / total_kw).min(1.0)
        } else {
            0.0
        };
        let carbon = self.config.facility.default_carbon_intensity
            * (1.0 + self.rng.random_range(-0.1..=0.1));

        EnergyMeasurement {
            timestamp: now,
            total_power_kw: total_kw,
            active_power_kw: total_kw * power_factor,
            reactive_power_kvar: total_kw * (1.0 - power_factor * power_factor).sqrt(),
            power_factor,
            frequency_hz: NOMINAL_FREQUENCY_HZ + gaussian_noise(&mut self.rng, 0.02),
            voltage_v: NOMINAL_VOLTAGE_V * (1.0 + gaussian_noise(&mut self.rng, 0.005)),
            loads,
            solar_kw,
            wind_kw,
            battery_soc: self.battery.soc,
            battery_power_kw: battery_kw,
            grid_import_kw: import_kw,
            grid_export_kw: export_kw,
            electricity_rate: rate,
            cost_to_date: self.cost_to_date,
            peak_demand_today_kw: self.peak_today_kw,
            carbon_intensity: carbon.max(0.0),
            renewable_share,
        }
    }
}

impl MeasurementSource for SimulatedMeter {
    fn poll(&mut self, now: DateTime<Utc>) -> Option<EnergyMeasurement> {
        self.polls += 1;
        if self.drop_every.is_some_and(|n| self.polls % n == 0) {
            return None;
        }
        Some(self.sample(now))
    }
}

/// Actuators driving a [`SimulatedMeter`]'s plant. Always acknowledge.
#[derive(Debug, Clone)]
pub struct SimulatedActuators {
    plant: Arc<Mutex<PlantState>>,
}

impl Actuators for SimulatedActuators {
    fn set_lighting_dimming(&self, level: f32) -> Result<(), ActuatorError> {
        self.plant.lock().lighting_dimming = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_hvac_setpoint(&self, celsius: f32) -> Result<(), ActuatorError> {
        self.plant.lock().hvac_setpoint_c = Some(celsius);
        Ok(())
    }

    fn set_battery_power(&self, kw: f32) -> Result<(), ActuatorError> {
        self.plant.lock().battery_setpoint_kw = kw;
        Ok(())
    }

    fn curtail_load(&self, load_id: &str, reduction_kw: f32) -> Result<(), ActuatorError> {
        self.plant
            .lock()
            .curtailed_kw
            .insert(load_id.to_string(), reduction_kw.max(0.0));
        Ok(())
    }

    fn restore_load(&self, load_id: &str) -> Result<(), ActuatorError> {
        self.plant.lock().curtailed_kw.remove(load_id);
        Ok(())
    }
}

/// Plays back a fixed sequence of measurements; `None` entries are gaps.
#[derive(Debug, Clone, Default)]
pub struct ReplayMeter {
    queue: VecDeque<Option<EnergyMeasurement>>,
}

impl ReplayMeter {
    pub fn new(sequence: Vec<Option<EnergyMeasurement>>) -> Self {
        Self {
            queue: sequence.into(),
        }
    }

    /// Replays `measurements` with no gaps.
    pub fn from_measurements(measurements: Vec<EnergyMeasurement>) -> Self {
        Self::new(measurements.into_iter().map(Some).collect())
    }

    /// Remaining entries, gaps included.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl MeasurementSource for ReplayMeter {
    fn poll(&mut self, _now: DateTime<Utc>) -> Option<EnergyMeasurement> {
        self.queue.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn simulated_measurements_are_consistent() {
        let cfg = FacilityConfig::baseline();
        let mut meter = SimulatedMeter::new(&cfg);
        for h in 0..48 {
            let m = meter.poll(start() + Duration::hours(h)).unwrap();
            assert!((m.loads.total_kw() - m.total_power_kw).abs() < 1e-3);
            assert!((0.0..=1.0).contains(&m.battery_soc));
            assert!((0.0..=1.0).contains(&m.renewable_share));
            assert!(m.grid_import_kw >= 0.0 && m.grid_export_kw >= 0.0);
            assert!(m.peak_demand_today_kw >= m.total_power_kw);
        }
    }

    #[test]
    fn cost_resets_each_day() {
        let cfg = FacilityConfig::baseline();
        let mut meter = SimulatedMeter::new(&cfg);
        let mut last = 0.0;
        for h in 0..24 {
            let m = meter.poll(start() + Duration::hours(h)).unwrap();
            assert!(m.cost_to_date >= last);
            last = m.cost_to_date;
        }
        let next_day = meter.poll(start() + Duration::hours(24)).unwrap();
        assert!(next_day.cost_to_date < last);
    }

    #[test]
    fn actuators_change_plant() {
        let cfg = FacilityConfig::baseline();
        let mut meter = SimulatedMeter::new(&cfg);
        let noon = start() + Duration::hours(12);
        let before = meter.poll(noon).unwrap();

        let actuators = meter.actuators();
        actuators.set_lighting_dimming(0.5).unwrap();
        actuators.curtail_load("irrigation_pumps", 10.0).unwrap();
        let after = meter.poll(noon).unwrap();
        assert!(after.loads.lighting_kw < before.loads.lighting_kw * 0.6);
        assert!((after.loads.pumps_kw - (before.loads.pumps_kw - 10.0)).abs() < 1e-3);

        actuators.restore_load("irrigation_pumps").unwrap();
        let restored = meter.poll(noon).unwrap();
        assert!((restored.loads.pumps_kw - before.loads.pumps_kw).abs() < 1e-3);
    }

    #[test]
    fn battery_follows_setpoint() {
        let cfg = FacilityConfig::baseline();
        let mut meter = SimulatedMeter::new(&cfg);
        meter.actuators().set_battery_power(-50.0).unwrap();
        let m = meter.poll(start()).unwrap();
        assert!((m.battery_power_kw + 50.0).abs() < 1e-3);
        assert!(m.battery_soc < cfg.storage.initial_soc);
    }

    #[test]
    fn gaps_drop_every_nth_poll() {
        let cfg = FacilityConfig::baseline();
        let mut meter = SimulatedMeter::new(&cfg).with_gaps(3);
        let got: Vec<bool> = (0..6)
            .map(|h| meter.poll(start() + Duration::hours(h)).is_some())
            .collect();
        assert_eq!(got, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn replay_yields_gaps_then_exhausts() {
        let cfg = FacilityConfig::baseline();
        let mut sim = SimulatedMeter::new(&cfg);
        let m = sim.poll(start()).unwrap();
        let mut replay = ReplayMeter::new(vec![Some(m.clone()), None, Some(m.clone())]);
        assert_eq!(replay.remaining(), 3);
        assert_eq!(replay.poll(start()), Some(m.clone()));
        assert_eq!(replay.poll(start()), None);
        assert_eq!(replay.poll(start()), Some(m));
        assert_eq!(replay.poll(start()), None);
    }
}
