//! TOML-based facility configuration and preset definitions.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tariff::{PriceBand, TariffConfig};

/// Top-level facility configuration parsed from TOML.
///
/// `tariff`, `storage`, and `renewables` are required: a file missing any of
/// them fails to parse instead of silently running on defaults. Every other
/// section falls back to the baseline values. Load from TOML with
/// [`FacilityConfig::from_toml_file`] or use [`FacilityConfig::baseline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FacilityConfig {
    /// Site-wide parameters.
    #[serde(default)]
    pub facility: FacilitySection,
    /// Control-loop cadence, retention, and alerting.
    #[serde(default)]
    pub engine: EngineSection,
    /// Subsystem load profile parameters.
    #[serde(default)]
    pub loads: LoadProfileConfig,
    /// Utility rate schedule.
    pub tariff: TariffConfig,
    /// Battery storage parameters.
    pub storage: StorageConfig,
    /// On-site renewable generation parameters.
    pub renewables: RenewableConfig,
    /// Dispatch heuristic tuning.
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Demand-response program parameters.
    #[serde(default)]
    pub demand_response: DemandResponseConfig,
    /// Loads that may be curtailed for demand response.
    #[serde(default)]
    pub curtailable_loads: Vec<CurtailableLoad>,
}

/// Site-wide parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FacilitySection {
    /// Human-readable facility name.
    pub name: String,
    /// Local time offset from UTC in minutes, used for hour-of-day lookups.
    pub utc_offset_minutes: i32,
    /// Forecast/dispatch horizon in hourly buckets.
    pub horizon_hours: usize,
    /// First hour of the core photoperiod (inclusive).
    pub photoperiod_start_hour: u32,
    /// Last hour of the core photoperiod (exclusive).
    pub photoperiod_end_hour: u32,
    /// Contracted peak demand limit (kW).
    pub peak_demand_limit_kw: f32,
    /// Grid carbon intensity assumed until a measurement reports one (kg/kWh).
    pub default_carbon_intensity: f32,
    /// Master random seed for forecast variance and simulated telemetry.
    pub seed: u64,
}

impl Default for FacilitySection {
    fn default() -> Self {
        Self {
            name: "Grow Facility".to_string(),
            utc_offset_minutes: 0,
            horizon_hours: 24,
            photoperiod_start_hour: 6,
            photoperiod_end_hour: 18,
            peak_demand_limit_kw: 500.0,
            default_carbon_intensity: 0.4,
            seed: 42,
        }
    }
}

/// Upper bound on `engine.retention_days` (ten years).
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Control-loop cadence, retention, and alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Control-loop tick interval in seconds.
    pub tick_seconds: u64,
    /// Maximum retained measurements.
    pub measurement_capacity: usize,
    /// Maximum retained forecasts and plans.
    pub plan_capacity: usize,
    /// Entries older than this many days are dropped from every history.
    pub retention_days: u32,
    /// Optional hard deadline for one optimization cycle (ms).
    pub cycle_deadline_ms: Option<u64>,
    /// Consecutive failed cycles before an operator alert is raised.
    pub alert_after_failures: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_seconds: 3600,
            measurement_capacity: 10_080,
            plan_capacity: 720,
            retention_days: 7,
            cycle_deadline_ms: None,
            alert_after_failures: 3,
        }
    }
}

/// Subsystem load profile parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadProfileConfig {
    /// Lighting load during the photoperiod (kW).
    pub lighting_on_kw: f32,
    /// Lighting load outside the photoperiod (kW).
    pub lighting_off_kw: f32,
    /// Relative lighting variability (0.05 = ±5%).
    pub lighting_variability: f32,
    /// HVAC load at the overnight minimum (kW).
    pub hvac_base_kw: f32,
    /// Additional HVAC load at the midday peak (kW).
    pub hvac_amplitude_kw: f32,
    /// Nominal HVAC setpoint (°C).
    pub hvac_setpoint_c: f32,
    /// Fixed pumps, process, and auxiliary load (kW).
    pub other_loads_kw: f32,
}

impl Default for LoadProfileConfig {
    fn default() -> Self {
        Self {
            lighting_on_kw: 300.0,
            lighting_off_kw: 20.0,
            lighting_variability: 0.05,
            hvac_base_kw: 80.0,
            hvac_amplitude_kw: 60.0,
            hvac_setpoint_c: 24.0,
            other_loads_kw: 50.0,
        }
    }
}

/// Battery storage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Usable energy capacity (kWh).
    pub capacity_kwh: f32,
    /// State of charge assumed before the first measurement (0.0–1.0).
    pub initial_soc: f32,
    /// Maximum charging power (kW).
    pub max_charge_kw: f32,
    /// Maximum discharging power (kW).
    pub max_discharge_kw: f32,
    /// Round-trip efficiency applied on charge (0.0–1.0).
    pub round_trip_efficiency: f32,
    /// Depth-of-discharge floor (0.0–1.0).
    #[serde(default)]
    pub min_soc: f32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 400.0,
            initial_soc: 0.5,
            max_charge_kw: 100.0,
            max_discharge_kw: 100.0,
            round_trip_efficiency: 0.9,
            min_soc: 0.1,
        }
    }
}

/// On-site renewable generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewableConfig {
    /// Solar nameplate capacity (kW).
    pub solar_capacity_kw: f32,
    /// Sunrise hour (inclusive).
    pub sunrise_hour: u32,
    /// Sunset hour (exclusive).
    pub sunset_hour: u32,
    /// Lower bound of the weather factor applied to clear-sky output.
    #[serde(default = "default_weather_min")]
    pub weather_factor_min: f32,
    /// Upper bound of the weather factor applied to clear-sky output.
    #[serde(default = "default_weather_max")]
    pub weather_factor_max: f32,
    /// Wind nameplate capacity (kW).
    #[serde(default)]
    pub wind_capacity_kw: f32,
    /// Expected mean wind speed (m/s).
    #[serde(default = "default_mean_wind")]
    pub mean_wind_speed_ms: f32,
    /// Turbine cut-in speed (m/s).
    #[serde(default = "default_cut_in")]
    pub cut_in_speed_ms: f32,
    /// Turbine cut-out speed (m/s).
    #[serde(default = "default_cut_out")]
    pub cut_out_speed_ms: f32,
}

fn default_weather_min() -> f32 {
    0.7
}
fn default_weather_max() -> f32 {
    1.0
}
fn default_mean_wind() -> f32 {
    6.0
}
fn default_cut_in() -> f32 {
    3.0
}
fn default_cut_out() -> f32 {
    25.0
}

impl Default for RenewableConfig {
    fn default() -> Self {
        Self {
            solar_capacity_kw: 150.0,
            sunrise_hour: 6,
            sunset_hour: 20,
            weather_factor_min: default_weather_min(),
            weather_factor_max: default_weather_max(),
            wind_capacity_kw: 0.0,
            mean_wind_speed_ms: default_mean_wind(),
            cut_in_speed_ms: default_cut_in(),
            cut_out_speed_ms: default_cut_out(),
        }
    }
}

/// Dispatch heuristic tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Price above which lighting dimming and HVAC relaxation engage ($/kWh).
    pub high_price_threshold: f32,
    /// DR probability above which dimming and HVAC shifting engage.
    pub dr_pressure_probability: f32,
    /// Fractional lighting reduction per $/kWh above the threshold.
    pub dimming_per_dollar: f32,
    /// Lowest lighting level outside the photoperiod (fraction of baseline).
    pub min_dimming: f32,
    /// Lowest lighting level inside the photoperiod (fraction of baseline).
    pub photoperiod_min_dimming: f32,
    /// Hours `[0, overnight_end_hour)` count as overnight for pre-cooling.
    pub overnight_end_hour: u32,
    /// Setpoint change while pre-cooling (°C, negative).
    pub precool_setpoint_offset_c: f32,
    /// HVAC power multiplier while pre-cooling.
    pub precool_power_factor: f32,
    /// Setpoint change while relaxing at peak (°C, positive).
    pub relax_setpoint_offset_c: f32,
    /// HVAC power multiplier while relaxing at peak.
    pub relax_power_factor: f32,
    /// Number of upcoming hours averaged for battery price comparison.
    pub price_lookahead_hours: usize,
    /// Charge when price is below this ratio of the lookahead average.
    pub charge_price_ratio: f32,
    /// Discharge when price is above this ratio of the lookahead average.
    pub discharge_price_ratio: f32,
    /// SOC floor for price-driven discharge.
    pub arbitrage_reserve_soc: f32,
    /// SOC floor for net-demand offset discharge.
    pub peak_shave_reserve_soc: f32,
    /// DR probability above which curtailment opportunities are evaluated.
    pub dr_opportunity_probability: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            high_price_threshold: 0.15,
            dr_pressure_probability: 0.3,
            dimming_per_dollar: 2.0,
            min_dimming: 0.7,
            photoperiod_min_dimming: 0.85,
            overnight_end_hour: 6,
            precool_setpoint_offset_c: -1.5,
            precool_power_factor: 1.1,
            relax_setpoint_offset_c: 2.0,
            relax_power_factor: 0.8,
            price_lookahead_hours: 6,
            charge_price_ratio: 0.8,
            discharge_price_ratio: 1.2,
            arbitrage_reserve_soc: 0.2,
            peak_shave_reserve_soc: 0.5,
            dr_opportunity_probability: 0.5,
        }
    }
}

/// Demand-response program parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemandResponseConfig {
    /// Program name reported on events.
    pub program_name: String,
    /// Incentive paid per kWh of curtailed load ($/kWh).
    pub incentive_rate_per_kwh: f32,
    /// Participation ratio at or above which an event is compliant.
    pub compliant_ratio: f32,
    /// Participation ratio at or above which an event is partial.
    pub partial_ratio: f32,
    /// Baseline hourly DR event probability.
    pub base_event_probability: f32,
    /// Probability multiplier applied during on-peak hours.
    pub peak_multiplier: f32,
    /// Months (1-12) with elevated DR activity.
    pub high_demand_months: Vec<u32>,
    /// Probability multiplier applied during high-demand months.
    pub seasonal_multiplier: f32,
}

impl Default for DemandResponseConfig {
    fn default() -> Self {
        Self {
            program_name: "Capacity Bidding".to_string(),
            incentive_rate_per_kwh: 0.20,
            compliant_ratio: 0.9,
            partial_ratio: 0.5,
            base_event_probability: 0.05,
            peak_multiplier: 4.0,
            high_demand_months: vec![6, 7, 8],
            seasonal_multiplier: 3.0,
        }
    }
}

/// Category of a curtailable load, matching the measured subsystem breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCategory {
    Lighting,
    Hvac,
    Pumps,
    Process,
    Auxiliary,
}

/// A flexible load that may be shed for demand response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurtailableLoad {
    /// Unique load identifier.
    pub id: String,
    /// Subsystem the load belongs to.
    pub category: LoadCategory,
    /// Maximum curtailment as a percentage of the load (0–100).
    pub max_curtailment_pct: f32,
    /// Cost of lost production per curtailed kWh ($/kWh).
    pub curtailment_cost_per_kwh: f32,
    /// Time from command to effective reduction (minutes).
    #[serde(default)]
    pub response_time_minutes: u32,
    /// Minimum time between two curtailments of this load (minutes).
    #[serde(default)]
    pub min_interval_minutes: u32,
    /// Priority tier; lower tiers are curtailed first.
    #[serde(default)]
    pub priority: u8,
}

impl CurtailableLoad {
    /// Maximum curtailment as a fraction (0.0–1.0).
    pub fn max_curtailment_fraction(&self) -> f32 {
        self.max_curtailment_pct / 100.0
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, thiserror::Error)]
#[error("config error: {field} - {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"storage.capacity_kwh"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl FacilityConfig {
    /// Returns the baseline facility: 24h horizon, lighting/HVAC/pump flexibility.
    pub fn baseline() -> Self {
        Self {
            facility: FacilitySection::default(),
            engine: EngineSection::default(),
            loads: LoadProfileConfig::default(),
            tariff: TariffConfig::default(),
            storage: StorageConfig::default(),
            renewables: RenewableConfig::default(),
            optimizer: OptimizerConfig::default(),
            demand_response: DemandResponseConfig::default(),
            curtailable_loads: vec![
                CurtailableLoad {
                    id: "lighting".to_string(),
                    category: LoadCategory::Lighting,
                    max_curtailment_pct: 20.0,
                    curtailment_cost_per_kwh: 0.05,
                    response_time_minutes: 1,
                    min_interval_minutes: 60,
                    priority: 1,
                },
                CurtailableLoad {
                    id: "hvac_flex".to_string(),
                    category: LoadCategory::Hvac,
                    max_curtailment_pct: 15.0,
                    curtailment_cost_per_kwh: 0.08,
                    response_time_minutes: 10,
                    min_interval_minutes: 120,
                    priority: 2,
                },
                CurtailableLoad {
                    id: "irrigation_pumps".to_string(),
                    category: LoadCategory::Pumps,
                    max_curtailment_pct: 50.0,
                    curtailment_cost_per_kwh: 0.02,
                    response_time_minutes: 2,
                    min_interval_minutes: 60,
                    priority: 0,
                },
            ],
        }
    }

    /// Returns the summer-peak preset: larger PV array and an active DR season.
    pub fn summer_peak() -> Self {
        let mut cfg = Self::baseline();
        cfg.renewables = RenewableConfig {
            solar_capacity_kw: 300.0,
            sunrise_hour: 5,
            sunset_hour: 21,
            ..RenewableConfig::default()
        };
        cfg.demand_response = DemandResponseConfig {
            base_event_probability: 0.1,
            high_demand_months: (1..=12).collect(),
            ..DemandResponseConfig::default()
        };
        cfg.storage = StorageConfig {
            capacity_kwh: 800.0,
            max_charge_kw: 200.0,
            max_discharge_kw: 200.0,
            ..StorageConfig::default()
        };
        cfg
    }

    /// Returns the no-flex preset: no curtailable loads configured.
    pub fn no_flex() -> Self {
        Self {
            curtailable_loads: Vec::new(),
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "summer_peak", "no_flex"];

    /// Loads a facility from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "summer_peak" => Ok(Self::summer_peak()),
            "no_flex" => Ok(Self::no_flex()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a facility from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a facility from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid, contains unknown fields,
    /// or omits a required section.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Looks up a curtailable load by id.
    pub fn curtailable_load(&self, id: &str) -> Option<&CurtailableLoad> {
        self.curtailable_loads.iter().find(|l| l.id == id)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let f = &self.facility;
        check(f.horizon_hours > 0, "facility.horizon_hours", "must be > 0");
        check(
            f.photoperiod_start_hour < f.photoperiod_end_hour && f.photoperiod_end_hour <= 24,
            "facility.photoperiod_start_hour",
            "must be < facility.photoperiod_end_hour <= 24",
        );
        check(
            f.peak_demand_limit_kw > 0.0,
            "facility.peak_demand_limit_kw",
            "must be > 0",
        );
        check(
            f.default_carbon_intensity >= 0.0,
            "facility.default_carbon_intensity",
            "must be >= 0",
        );

        let e = &self.engine;
        check(e.tick_seconds > 0, "engine.tick_seconds", "must be > 0");
        check(
            e.measurement_capacity > 0,
            "engine.measurement_capacity",
            "must be > 0",
        );
        check(e.plan_capacity > 0, "engine.plan_capacity", "must be > 0");
        check(
            (1..=MAX_RETENTION_DAYS).contains(&e.retention_days),
            "engine.retention_days",
            "must be between 1 and 3650",
        );

        let l = &self.loads;
        check(
            l.lighting_on_kw >= 0.0 && l.lighting_off_kw >= 0.0,
            "loads.lighting_on_kw",
            "lighting loads must be >= 0",
        );
        check(
            (0.0..0.5).contains(&l.lighting_variability),
            "loads.lighting_variability",
            "must be in [0.0, 0.5)",
        );
        check(
            l.hvac_base_kw >= 0.0 && l.hvac_amplitude_kw >= 0.0,
            "loads.hvac_base_kw",
            "HVAC loads must be >= 0",
        );

        let t = &self.tariff;
        check(t.off_peak_rate > 0.0, "tariff.off_peak_rate", "must be > 0");
        check(
            (0.0..1.0).contains(&t.market_variance),
            "tariff.market_variance",
            "must be in [0.0, 1.0)",
        );
        for (i, b) in t.bands.iter().enumerate() {
            if b.start_hour >= b.end_hour || b.end_hour > 24 {
                errors.push(ConfigError::new(
                    format!("tariff.bands[{i}]"),
                    "start_hour must be < end_hour <= 24",
                ));
            }
            if b.rate <= 0.0 {
                errors.push(ConfigError::new(format!("tariff.bands[{i}].rate"), "must be > 0"));
            }
            if b.band == PriceBand::OffPeak {
                errors.push(ConfigError::new(
                    format!("tariff.bands[{i}].band"),
                    "off_peak is implied by tariff.off_peak_rate",
                ));
            }
        }
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };
        check(
            t.demand_charge_start_hour <= t.demand_charge_end_hour && t.demand_charge_end_hour <= 24,
            "tariff.demand_charge_start_hour",
            "must be <= tariff.demand_charge_end_hour <= 24",
        );

        let s = &self.storage;
        check(s.capacity_kwh > 0.0, "storage.capacity_kwh", "must be > 0");
        check(
            (0.0..=1.0).contains(&s.initial_soc),
            "storage.initial_soc",
            "must be in [0.0, 1.0]",
        );
        check(
            s.max_charge_kw >= 0.0 && s.max_discharge_kw >= 0.0,
            "storage.max_charge_kw",
            "charge/discharge limits must be >= 0",
        );
        check(
            s.round_trip_efficiency > 0.0 && s.round_trip_efficiency <= 1.0,
            "storage.round_trip_efficiency",
            "must be in (0.0, 1.0]",
        );
        check(
            (0.0..1.0).contains(&s.min_soc),
            "storage.min_soc",
            "must be in [0.0, 1.0)",
        );

        let r = &self.renewables;
        check(
            r.solar_capacity_kw >= 0.0 && r.wind_capacity_kw >= 0.0,
            "renewables.solar_capacity_kw",
            "capacities must be >= 0",
        );
        check(
            r.sunrise_hour < r.sunset_hour && r.sunset_hour <= 24,
            "renewables.sunrise_hour",
            "must be < renewables.sunset_hour <= 24",
        );
        check(
            0.0 < r.weather_factor_min && r.weather_factor_min <= r.weather_factor_max && r.weather_factor_max <= 1.0,
            "renewables.weather_factor_min",
            "must satisfy 0 < min <= max <= 1",
        );
        check(
            r.cut_in_speed_ms < r.cut_out_speed_ms,
            "renewables.cut_in_speed_ms",
            "must be < renewables.cut_out_speed_ms",
        );

        let o = &self.optimizer;
        check(
            0.0 < o.min_dimming && o.min_dimming <= o.photoperiod_min_dimming && o.photoperiod_min_dimming <= 1.0,
            "optimizer.min_dimming",
            "must satisfy 0 < min_dimming <= photoperiod_min_dimming <= 1",
        );
        check(
            o.price_lookahead_hours > 0,
            "optimizer.price_lookahead_hours",
            "must be > 0",
        );
        check(
            o.charge_price_ratio < o.discharge_price_ratio,
            "optimizer.charge_price_ratio",
            "must be < optimizer.discharge_price_ratio",
        );
        check(
            s.min_soc <= o.arbitrage_reserve_soc && o.arbitrage_reserve_soc <= o.peak_shave_reserve_soc && o.peak_shave_reserve_soc <= 1.0,
            "optimizer.arbitrage_reserve_soc",
            "must satisfy storage.min_soc <= arbitrage <= peak_shave <= 1",
        );

        let d = &self.demand_response;
        check(
            d.incentive_rate_per_kwh >= 0.0,
            "demand_response.incentive_rate_per_kwh",
            "must be >= 0",
        );
        check(
            0.0 < d.partial_ratio && d.partial_ratio <= d.compliant_ratio && d.compliant_ratio <= 1.0,
            "demand_response.partial_ratio",
            "must satisfy 0 < partial <= compliant <= 1",
        );
        check(
            (0.0..=1.0).contains(&d.base_event_probability),
            "demand_response.base_event_probability",
            "must be in [0.0, 1.0]",
        );
        check(
            d.high_demand_months.iter().all(|m| (1..=12).contains(m)),
            "demand_response.high_demand_months",
            "months must be in 1..=12",
        );

        for (i, load) in self.curtailable_loads.iter().enumerate() {
            if load.id.is_empty() {
                errors.push(ConfigError::new(format!("curtailable_loads[{i}].id"), "must not be empty"));
            }
            if !(0.0..=100.0).contains(&load.max_curtailment_pct) {
                errors.push(ConfigError::new(
                    format!("curtailable_loads[{i}].max_curtailment_pct"),
                    "must be in [0, 100]",
                ));
            }
            if load.curtailment_cost_per_kwh < 0.0 {
                errors.push(ConfigError::new(
                    format!("curtailable_loads[{i}].curtailment_cost_per_kwh"),
                    "must be >= 0",
                ));
            }
            if self.curtailable_loads[..i].iter().any(|other| other.id == load.id) {
                errors.push(ConfigError::new(
                    format!("curtailable_loads[{i}].id"),
                    format!("duplicate load id \"{}\"", load.id),
                ));
            }
        }

        errors
    }
}
