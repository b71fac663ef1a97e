//! Greedy multi-resource dispatch heuristic.
//!
//! Hours are processed strictly in order: the battery state of charge after
//! hour `h` is the starting state for hour `h + 1`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::FacilityConfig;
use crate::devices::StorageState;
use crate::dispatch::power_balance::{exceeds_limit, hourly_cost, net_demand_kw};
use crate::dispatch::types::{
    CurtailmentEntry, EnergyForecast, EnergyMeasurement, HourlyDispatch, HvacMode,
    OptimizationResult,
};
use crate::error::{Result, ensure_finite};

/// Length of one plan bucket in hours.
const DT_HOURS: f32 = 1.0;

/// Computes dispatch plans for one facility configuration.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptimizer<'a> {
    config: &'a FacilityConfig,
    revision: u64,
}

struct LightingDecision {
    kw: f32,
    dimming: f32,
}

struct HvacDecision {
    kw: f32,
    setpoint_c: f32,
    mode: HvacMode,
}

impl<'a> DispatchOptimizer<'a> {
    pub fn new(config: &'a FacilityConfig) -> Self {
        Self {
            config,
            revision: 0,
        }
    }

    /// Tags produced plans with configuration `revision`.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Computes a dispatch plan over the configured horizon.
    ///
    /// `storage` is the battery state at the start of the plan; it is not
    /// modified. The carbon metric uses the measured grid carbon intensity,
    /// falling back to the forecast's value when the reading is unusable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forecast`](crate::error::EngineError::Forecast)
    /// if the forecast does not match the configured horizon and
    /// [`EngineError::NonFinite`](crate::error::EngineError::NonFinite) if any
    /// intermediate value is NaN or infinite. No plan is produced in either case.
    pub fn optimize(
        &self,
        measurement: &EnergyMeasurement,
        forecast: &EnergyForecast,
        storage: &StorageState,
        now: DateTime<Utc>,
    ) -> Result<OptimizationResult> {
        let horizon = self.config.facility.horizon_hours;
        forecast.validate(horizon)?;
        ensure_finite(storage.soc, 0, "battery SOC")?;

        let opt = &self.config.optimizer;
        let peak_limit = self.config.facility.peak_demand_limit_kw;
        let under_pressure = (0..horizon).any(|h| {
            forecast.price[h] > opt.high_price_threshold
                || forecast.dr_probability[h] > opt.dr_pressure_probability
        });

        let mut battery = storage.clone();
        let mut last_curtailed: HashMap<&str, usize> = HashMap::new();
        let mut hours = Vec::with_capacity(horizon);
        let mut curtailments = Vec::new();
        let mut exceeded = Vec::new();

        let mut projected_cost = 0.0_f32;
        let mut baseline_cost = 0.0_f32;
        let mut peak = f32::NEG_INFINITY;
        let mut baseline_peak = f32::NEG_INFINITY;
        let mut import_kwh = 0.0_f32;
        let mut baseline_import_kwh = 0.0_f32;
        let mut generation_kwh = 0.0_f32;
        let mut demand_kwh = 0.0_f32;

        for h in 0..horizon {
            let price = forecast.price[h];
            let renewable_kw = forecast.renewable_kw(h);

            let lighting = self.plan_lighting(forecast, h);
            let hvac = self.plan_hvac(forecast, h, under_pressure);
            let other_kw =
                (forecast.expected_demand_kw[h] - forecast.lighting_kw[h] - forecast.hvac_kw[h])
                    .max(0.0);
            let load_kw = lighting.kw + hvac.kw + other_kw;

            let battery_kw = self.plan_battery(&mut battery, forecast, h, load_kw - renewable_kw);

            let curtailment = if forecast.dr_probability[h] > opt.dr_opportunity_probability {
                self.best_curtailment(h, lighting.kw + hvac.kw, &last_curtailed)
            } else {
                None
            };
            let curtailed_kw = curtailment.as_ref().map_or(0.0, |c| c.reduction_kw);

            let net_kw = ensure_finite(
                net_demand_kw(load_kw, renewable_kw, battery_kw) - curtailed_kw,
                h,
                "net demand",
            )?;
            let (energy_cost, demand_cost) = hourly_cost(net_kw, price, forecast.demand_charge[h]);

            let baseline_net = forecast.expected_demand_kw[h] - renewable_kw;
            let (base_energy, base_demand) =
                hourly_cost(baseline_net, price, forecast.demand_charge[h]);
            let hour_baseline_cost = ensure_finite(base_energy + base_demand, h, "baseline cost")?;
            let hour_cost = ensure_finite(energy_cost + demand_cost, h, "hourly cost")?;

            projected_cost += hour_cost;
            baseline_cost += hour_baseline_cost;
            peak = peak.max(net_kw);
            baseline_peak = baseline_peak.max(baseline_net);
            import_kwh += net_kw.max(0.0) * DT_HOURS;
            baseline_import_kwh += baseline_net.max(0.0) * DT_HOURS;
            generation_kwh += renewable_kw * DT_HOURS;
            demand_kwh += forecast.expected_demand_kw[h] * DT_HOURS;

            if exceeds_limit(net_kw, peak_limit) {
                exceeded.push(h);
            }

            debug!(
                hour = h,
                hour_of_day = forecast.hour_of_day[h],
                lighting_dimming = lighting.dimming,
                hvac_mode = ?hvac.mode,
                battery_kw,
                soc = battery.soc,
                curtailed_kw,
                net_kw,
                "hour dispatched"
            );

            hours.push(HourlyDispatch {
                index: h,
                hour_of_day: forecast.hour_of_day[h],
                lighting_kw: lighting.kw,
                lighting_dimming: lighting.dimming,
                hvac_kw: hvac.kw,
                hvac_setpoint_c: hvac.setpoint_c,
                hvac_mode: hvac.mode,
                battery_kw,
                battery_soc: battery.soc,
                curtailed_kw,
                net_demand_kw: net_kw,
                energy_cost,
                demand_cost,
                baseline_cost: hour_baseline_cost,
            });

            if let Some(entry) = curtailment {
                if let Some(load) = self.config.curtailable_load(&entry.load_id) {
                    last_curtailed.insert(load.id.as_str(), h);
                }
                curtailments.push(entry);
            }
        }

        let projected_cost = ensure_finite(projected_cost, horizon, "projected cost")?;
        let baseline_cost = ensure_finite(baseline_cost, horizon, "baseline cost")?;
        let peak = if peak.is_finite() { peak } else { 0.0 };
        let baseline_peak = if baseline_peak.is_finite() { baseline_peak } else { 0.0 };

        let measured = measurement.carbon_intensity;
        let intensity = if measured.is_finite() && measured >= 0.0 {
            measured
        } else {
            forecast.carbon_intensity
        };
        let renewable_utilization = if generation_kwh + demand_kwh > 0.0 {
            generation_kwh / (generation_kwh + demand_kwh)
        } else {
            0.0
        };
        let dr_revenue: f32 = curtailments.iter().map(|c| c.incentive).sum();

        Ok(OptimizationResult {
            timestamp: now,
            forecast_generated_at: forecast.generated_at,
            config_revision: self.revision,
            horizon,
            hours,
            projected_cost,
            baseline_cost,
            cost_savings: baseline_cost - projected_cost,
            peak_demand_kw: peak,
            baseline_peak_kw: baseline_peak,
            peak_reduction_kw: baseline_peak - peak,
            carbon_reduction_kg: ensure_finite(
                (baseline_import_kwh - import_kwh) * intensity,
                horizon,
                "carbon reduction",
            )?,
            renewable_utilization,
            dr_participation: !curtailments.is_empty(),
            dr_revenue,
            curtailments,
            peak_limit_exceeded_hours: exceeded,
        })
    }

    fn plan_lighting(&self, forecast: &EnergyForecast, h: usize) -> LightingDecision {
        let opt = &self.config.optimizer;
        let baseline = forecast.lighting_kw[h];
        let price = forecast.price[h];

        if price <= opt.high_price_threshold
            && forecast.dr_probability[h] <= opt.dr_pressure_probability
        {
            return LightingDecision {
                kw: baseline,
                dimming: 1.0,
            };
        }

        let floor = if forecast.photoperiod[h] {
            opt.photoperiod_min_dimming
        } else {
            opt.min_dimming
        };
        let excess = (price - opt.high_price_threshold).max(0.0);
        let dimming = (1.0 - opt.dimming_per_dollar * excess).clamp(floor, 1.0);
        LightingDecision {
            kw: baseline * dimming,
            dimming,
        }
    }

    fn plan_hvac(&self, forecast: &EnergyForecast, h: usize, under_pressure: bool) -> HvacDecision {
        let opt = &self.config.optimizer;
        let baseline = forecast.hvac_kw[h];
        let nominal = self.config.loads.hvac_setpoint_c;
        let price = forecast.price[h];

        let peak_hour = price > opt.high_price_threshold
            || forecast.dr_probability[h] > opt.dr_pressure_probability;
        let cheap_overnight = forecast.hour_of_day[h] < opt.overnight_end_hour
            && price < opt.high_price_threshold;

        if peak_hour {
            HvacDecision {
                kw: baseline * opt.relax_power_factor,
                setpoint_c: nominal + opt.relax_setpoint_offset_c,
                mode: HvacMode::Relax,
            }
        } else if under_pressure && cheap_overnight {
            HvacDecision {
                kw: baseline * opt.precool_power_factor,
                setpoint_c: nominal + opt.precool_setpoint_offset_c,
                mode: HvacMode::PreCool,
            }
        } else {
            HvacDecision {
                kw: baseline,
                setpoint_c: nominal,
                mode: HvacMode::Baseline,
            }
        }
    }

    /// Chooses and applies the battery setpoint for hour `h`, returning the
    /// actual power (positive=charge, negative=discharge).
    fn plan_battery(
        &self,
        battery: &mut StorageState,
        forecast: &EnergyForecast,
        h: usize,
        net_before_kw: f32,
    ) -> f32 {
        let opt = &self.config.optimizer;
        let price = forecast.price[h];
        let average = lookahead_average(&forecast.price, h, opt.price_lookahead_hours);

        let mut setpoint = 0.0;
        if price < opt.charge_price_ratio * average && battery.soc < 1.0 {
            setpoint = battery.charge_headroom_kw(DT_HOURS);
        } else if price > opt.discharge_price_ratio * average
            && battery.soc > opt.arbitrage_reserve_soc.max(battery.min_soc)
        {
            setpoint = -battery.discharge_available_kw(opt.arbitrage_reserve_soc, DT_HOURS);
        }

        // Offset remaining positive net demand when well above the peak reserve.
        let residual = net_before_kw + setpoint;
        if setpoint <= 0.0 && residual > 0.0 && battery.soc > opt.peak_shave_reserve_soc {
            let remaining = battery.discharge_available_kw(battery.min_soc, DT_HOURS) + setpoint;
            setpoint -= residual.min(remaining).max(0.0);
        }

        battery.apply(setpoint, DT_HOURS)
    }

    /// Highest-value profitable curtailment for hour `h`, if any.
    fn best_curtailment(
        &self,
        h: usize,
        flexible_kw: f32,
        last_curtailed: &HashMap<&str, usize>,
    ) -> Option<CurtailmentEntry> {
        let rate = self.config.demand_response.incentive_rate_per_kwh;

        self.config
            .curtailable_loads
            .iter()
            .filter(|load| {
                let gap = min_gap_hours(load.min_interval_minutes);
                last_curtailed
                    .get(load.id.as_str())
                    .is_none_or(|&last| h - last >= gap)
            })
            .filter_map(|load| {
                let reduction_kw = flexible_kw * load.max_curtailment_fraction();
                let incentive = reduction_kw * rate * DT_HOURS;
                let production_cost = reduction_kw * load.curtailment_cost_per_kwh * DT_HOURS;
                (reduction_kw > 0.0 && incentive > production_cost).then(|| CurtailmentEntry {
                    hour: h,
                    load_id: load.id.clone(),
                    reduction_kw,
                    incentive,
                    production_cost,
                })
            })
            .reduce(|best, entry| {
                if entry.net_value() > best.net_value() {
                    entry
                } else {
                    best
                }
            })
    }
}

/// Mean price over the `lookahead` hours after `h`, truncated at the horizon.
///
/// Falls back to `prices[h]` when no later hours exist.
pub fn lookahead_average(prices: &[f32], h: usize, lookahead: usize) -> f32 {
    let end = (h + 1 + lookahead).min(prices.len());
    let window = prices.get(h + 1..end).unwrap_or(&[]);
    if window.is_empty() {
        prices.get(h).copied().unwrap_or(0.0)
    } else {
        window.iter().sum::<f32>() / window.len() as f32
    }
}

/// Whole plan hours a load must rest between curtailments.
fn min_gap_hours(min_interval_minutes: u32) -> usize {
    (min_interval_minutes.div_ceil(60) as usize).max(1)
}
