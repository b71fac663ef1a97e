//! Core dispatch types: measurements, forecasts, and dispatch plans.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LoadCategory;
use crate::error::{EngineError, Result, ensure_finite};
use crate::history::Timestamped;
use crate::tariff::PriceBand;

/// Instantaneous load per facility subsystem (kW).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBreakdown {
    pub lighting_kw: f32,
    pub hvac_kw: f32,
    pub pumps_kw: f32,
    pub process_kw: f32,
    pub auxiliary_kw: f32,
}

impl LoadBreakdown {
    /// Sum of all subsystem loads.
    pub fn total_kw(&self) -> f32 {
        self.lighting_kw + self.hvac_kw + self.pumps_kw + self.process_kw + self.auxiliary_kw
    }

    /// Load of the subsystem matching `category`.
    pub fn category_kw(&self, category: LoadCategory) -> f32 {
        match category {
            LoadCategory::Lighting => self.lighting_kw,
            LoadCategory::Hvac => self.hvac_kw,
            LoadCategory::Pumps => self.pumps_kw,
            LoadCategory::Process => self.process_kw,
            LoadCategory::Auxiliary => self.auxiliary_kw,
        }
    }
}

/// Immutable snapshot delivered once per polling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyMeasurement {
    pub timestamp: DateTime<Utc>,
    /// Total facility demand (kW).
    pub total_power_kw: f32,
    pub active_power_kw: f32,
    pub reactive_power_kvar: f32,
    pub power_factor: f32,
    pub frequency_hz: f32,
    pub voltage_v: f32,
    pub loads: LoadBreakdown,
    pub solar_kw: f32,
    pub wind_kw: f32,
    /// Battery state of charge (0.0 to 1.0).
    pub battery_soc: f32,
    /// Battery power (kW; positive=charge, negative=discharge).
    pub battery_power_kw: f32,
    pub grid_import_kw: f32,
    pub grid_export_kw: f32,
    /// Current electricity rate ($/kWh).
    pub electricity_rate: f32,
    /// Cumulative energy cost to date ($).
    pub cost_to_date: f32,
    pub peak_demand_today_kw: f32,
    /// Grid carbon intensity (kg CO2 per kWh).
    pub carbon_intensity: f32,
    /// Share of demand met by on-site renewables (0.0 to 1.0).
    pub renewable_share: f32,
}

impl Timestamped for EnergyMeasurement {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Categorical grid stress level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStress {
    Normal,
    Elevated,
    High,
    Critical,
}

/// Forecast over a fixed horizon of hourly buckets.
///
/// Index `h` of every per-hour vector refers to the same hour, `h` hours after
/// `start_hour`. Forecasts are never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyForecast {
    pub generated_at: DateTime<Utc>,
    /// Local hour of day of index 0.
    pub start_hour: u32,
    pub hour_of_day: Vec<u32>,
    /// Whether each hour falls inside the core photoperiod.
    pub photoperiod: Vec<bool>,
    pub price_band: Vec<PriceBand>,
    pub expected_demand_kw: Vec<f32>,
    pub lighting_kw: Vec<f32>,
    pub hvac_kw: Vec<f32>,
    pub solar_kw: Vec<f32>,
    pub wind_kw: Vec<f32>,
    /// Electricity price ($/kWh).
    pub price: Vec<f32>,
    /// Demand charge ($/kW), zero outside the demand-charge window.
    pub demand_charge: Vec<f32>,
    pub grid_stress: Vec<GridStress>,
    pub dr_probability: Vec<f32>,
    /// Grid carbon intensity assumed over the horizon (kg/kWh).
    pub carbon_intensity: f32,
}

impl Timestamped for EnergyForecast {
    fn timestamp(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

impl EnergyForecast {
    /// Number of hourly buckets.
    pub fn horizon(&self) -> usize {
        self.expected_demand_kw.len()
    }

    /// On-site renewable generation at hour `h` (kW).
    pub fn renewable_kw(&self, h: usize) -> f32 {
        self.solar_kw[h] + self.wind_kw[h]
    }

    /// Checks that every per-hour vector has `horizon` entries with finite,
    /// in-range values.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forecast`] on a length mismatch or out-of-range
    /// value and [`EngineError::NonFinite`] on NaN/infinite values.
    pub fn validate(&self, horizon: usize) -> Result<()> {
        let lengths = [
            ("hour_of_day", self.hour_of_day.len()),
            ("photoperiod", self.photoperiod.len()),
            ("price_band", self.price_band.len()),
            ("expected_demand_kw", self.expected_demand_kw.len()),
            ("lighting_kw", self.lighting_kw.len()),
            ("hvac_kw", self.hvac_kw.len()),
            ("solar_kw", self.solar_kw.len()),
            ("wind_kw", self.wind_kw.len()),
            ("price", self.price.len()),
            ("demand_charge", self.demand_charge.len()),
            ("grid_stress", self.grid_stress.len()),
            ("dr_probability", self.dr_probability.len()),
        ];
        for (name, len) in lengths {
            if len != horizon {
                return Err(EngineError::Forecast(format!(
                    "{name} has {len} entries, horizon is {horizon}"
                )));
            }
        }

        for h in 0..horizon {
            ensure_finite(self.expected_demand_kw[h], h, "expected demand")?;
            ensure_finite(self.lighting_kw[h], h, "lighting load")?;
            ensure_finite(self.hvac_kw[h], h, "HVAC load")?;
            ensure_finite(self.solar_kw[h], h, "solar generation")?;
            ensure_finite(self.wind_kw[h], h, "wind generation")?;
            ensure_finite(self.price[h], h, "price")?;
            ensure_finite(self.demand_charge[h], h, "demand charge")?;
            ensure_finite(self.dr_probability[h], h, "DR probability")?;

            if self.price[h] < 0.0 {
                return Err(EngineError::Forecast(format!("negative price at hour {h}")));
            }
            if !(0.0..=1.0).contains(&self.dr_probability[h]) {
                return Err(EngineError::Forecast(format!(
                    "DR probability {} at hour {h} outside [0, 1]",
                    self.dr_probability[h]
                )));
            }
        }
        ensure_finite(self.carbon_intensity, 0, "carbon intensity")?;
        Ok(())
    }
}

/// HVAC operating mode chosen for one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Baseline,
    PreCool,
    Relax,
}

/// Set points and projected accounting for one hour of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyDispatch {
    /// Forecast index this hour was computed from.
    pub index: usize,
    pub hour_of_day: u32,
    /// Dispatched lighting power (kW).
    pub lighting_kw: f32,
    /// Lighting level as a fraction of forecasted baseline (0.0 to 1.0).
    pub lighting_dimming: f32,
    pub hvac_kw: f32,
    pub hvac_setpoint_c: f32,
    pub hvac_mode: HvacMode,
    /// Battery power (kW; positive=charge, negative=discharge).
    pub battery_kw: f32,
    /// Battery SOC after this hour.
    pub battery_soc: f32,
    /// DR curtailment scheduled for this hour (kW).
    pub curtailed_kw: f32,
    /// Net grid demand after all dispatch decisions (kW).
    pub net_demand_kw: f32,
    pub energy_cost: f32,
    pub demand_cost: f32,
    /// Cost of the same hour with no optimization.
    pub baseline_cost: f32,
}

impl HourlyDispatch {
    /// Projected cost of this hour.
    pub fn cost(&self) -> f32 {
        self.energy_cost + self.demand_cost
    }
}

/// A scheduled DR curtailment inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurtailmentEntry {
    /// Forecast index.
    pub hour: usize,
    pub load_id: String,
    pub reduction_kw: f32,
    /// Incentive value: reduction × incentive rate ($).
    pub incentive: f32,
    /// Production-loss cost: reduction × curtailment cost ($).
    pub production_cost: f32,
}

impl CurtailmentEntry {
    /// Net value of the curtailment ($).
    pub fn net_value(&self) -> f32 {
        self.incentive - self.production_cost
    }
}

/// Dispatch plan produced by one optimization cycle.
///
/// Immutable once published; the executor reads the slice in force at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub timestamp: DateTime<Utc>,
    /// `generated_at` of the forecast this plan was computed from.
    pub forecast_generated_at: DateTime<Utc>,
    /// Configuration revision in force when the plan was computed.
    pub config_revision: u64,
    pub horizon: usize,
    pub hours: Vec<HourlyDispatch>,
    pub projected_cost: f32,
    pub baseline_cost: f32,
    pub cost_savings: f32,
    pub peak_demand_kw: f32,
    pub baseline_peak_kw: f32,
    pub peak_reduction_kw: f32,
    pub carbon_reduction_kg: f32,
    /// Renewable generation ÷ (generation + demand) over the horizon.
    pub renewable_utilization: f32,
    pub dr_participation: bool,
    pub dr_revenue: f32,
    pub curtailments: Vec<CurtailmentEntry>,
    /// Forecast indices whose net demand still exceeds the peak demand limit.
    pub peak_limit_exceeded_hours: Vec<usize>,
}

impl Timestamped for OptimizationResult {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl OptimizationResult {
    /// The slice the executor applies now.
    pub fn current_hour(&self) -> Option<&HourlyDispatch> {
        self.hours.first()
    }

    /// The slice in force at `now`, counting whole hours since publication.
    ///
    /// Returns `None` once `now` is past the horizon.
    pub fn hour_at(&self, now: DateTime<Utc>) -> Option<&HourlyDispatch> {
        let elapsed = (now - self.timestamp).num_hours().max(0);
        usize::try_from(elapsed).ok().and_then(|i| self.hours.get(i))
    }

    /// Savings of the executed (first) hour versus its baseline.
    pub fn current_hour_savings(&self) -> f32 {
        self.current_hour()
            .map_or(0.0, |h| h.baseline_cost - h.cost())
    }

    /// Curtailments scheduled for forecast index `hour`.
    pub fn curtailments_at(&self, hour: usize) -> impl Iterator<Item = &CurtailmentEntry> {
        self.curtailments.iter().filter(move |c| c.hour == hour)
    }
}

impl fmt::Display for HourlyDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "h={:>2} ({:02}:00) | light={:>6.1} kW ({:>3.0}%)  hvac={:>6.1} kW @ {:.1}C  \
             bat={:>6.1} kW (SoC={:.1}%)  curtail={:>5.1} kW | net={:>6.1} kW  cost=${:.2} (base ${:.2})",
            self.index,
            self.hour_of_day,
            self.lighting_kw,
            self.lighting_dimming * 100.0,
            self.hvac_kw,
            self.hvac_setpoint_c,
            self.battery_kw,
            self.battery_soc * 100.0,
            self.curtailed_kw,
            self.net_demand_kw,
            self.cost(),
            self.baseline_cost,
        )
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Dispatch Plan ({}h, rev {}) ---", self.horizon, self.config_revision)?;
        writeln!(
            f,
            "Projected cost:        ${:.2} (baseline ${:.2}, savings ${:.2})",
            self.projected_cost, self.baseline_cost, self.cost_savings
        )?;
        writeln!(
            f,
            "Peak demand:           {:.1} kW (baseline {:.1} kW)",
            self.peak_demand_kw, self.baseline_peak_kw
        )?;
        writeln!(f, "Carbon reduction:      {:.1} kg", self.carbon_reduction_kg)?;
        writeln!(
            f,
            "Renewable utilization: {:.1}%",
            self.renewable_utilization * 100.0
        )?;
        write!(
            f,
            "DR curtailments:       {} (revenue ${:.2})",
            self.curtailments.len(),
            self.dr_revenue
        )
    }
}
