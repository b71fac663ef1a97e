//! Integration tests for optimizer scenarios and plan-wide properties.

mod common;

use rand::{Rng, SeedableRng, rngs::StdRng};

use grow_dispatch::config::{CurtailableLoad, FacilityConfig, LoadCategory};
use grow_dispatch::devices::StorageState;
use grow_dispatch::dispatch::optimizer::DispatchOptimizer;
use grow_dispatch::dispatch::types::{EnergyForecast, OptimizationResult};
use grow_dispatch::forecast::{ForecastGenerator, ForecastSource};
use grow_dispatch::tariff::PriceBand;

fn optimize(cfg: &FacilityConfig, forecast: &EnergyForecast, soc: f32) -> OptimizationResult {
    let mut storage = StorageState::from_config(&cfg.storage);
    storage.soc = soc;
    let m = common::measurement(common::start(), common::typical_loads(), soc);
    DispatchOptimizer::new(cfg)
        .optimize(&m, forecast, &storage, common::start())
        .unwrap()
}

fn lighting_only_facility() -> FacilityConfig {
    let mut cfg = FacilityConfig::baseline();
    cfg.facility.peak_demand_limit_kw = 500.0;
    cfg.demand_response.incentive_rate_per_kwh = 0.20;
    cfg.curtailable_loads = vec![CurtailableLoad {
        id: "lighting".into(),
        category: LoadCategory::Lighting,
        max_curtailment_pct: 20.0,
        curtailment_cost_per_kwh: 0.05,
        response_time_minutes: 1,
        min_interval_minutes: 60,
        priority: 1,
    }];
    cfg
}

#[test]
fn on_peak_overload_selects_lighting_curtailment() {
    let cfg = lighting_only_facility();
    let mut f = common::flat_forecast(24, 0.10, 0.05);
    f.expected_demand_kw[17] = 600.0;
    f.lighting_kw[17] = 350.0;
    f.hvac_kw[17] = 150.0;
    f.price[17] = 0.22;
    f.price_band[17] = PriceBand::OnPeak;
    f.dr_probability[17] = 0.7;

    let plan = optimize(&cfg, &f, 0.5);
    let selected: Vec<_> = plan.curtailments_at(17).collect();
    assert_eq!(selected.len(), 1);
    let entry = selected[0];
    assert_eq!(entry.load_id, "lighting");
    assert!(entry.reduction_kw > 0.0);
    assert!((entry.incentive - 0.20 * entry.reduction_kw).abs() < 1e-3);
    assert!((entry.production_cost - 0.05 * entry.reduction_kw).abs() < 1e-3);
    assert!(entry.incentive > entry.production_cost);
    assert!(plan.dr_participation);
    assert!(plan.hours[17].curtailed_kw > 0.0);
}

#[test]
fn expensive_hour_discharges_full_battery() {
    let cfg = FacilityConfig::baseline();
    let mut f = common::flat_forecast(24, 0.10, 0.05);
    f.price[0] = 0.22;

    let plan = optimize(&cfg, &f, 0.9);
    let first = &plan.hours[0];
    assert!(first.battery_kw < 0.0, "expected discharge, got {} kW", first.battery_kw);
    assert!(first.battery_soc < 0.9);
}

#[test]
fn peak_limit_hours_are_reported() {
    let cfg = lighting_only_facility();
    let mut f = common::flat_forecast(24, 0.10, 0.05);
    f.expected_demand_kw[12] = 900.0;
    let plan = optimize(&cfg, &f, 0.1);
    assert!(plan.peak_limit_exceeded_hours.contains(&12));
    assert!(!plan.peak_limit_exceeded_hours.contains(&3));
}

/// Random forecast with prices and DR probabilities spread across thresholds.
fn random_forecast(rng: &mut StdRng, horizon: usize) -> EnergyForecast {
    let mut f = common::flat_forecast(horizon, 0.10, 0.0);
    for h in 0..horizon {
        let lighting: f32 = rng.random_range(0.0..=400.0);
        let hvac: f32 = rng.random_range(0.0..=200.0);
        f.lighting_kw[h] = lighting;
        f.hvac_kw[h] = hvac;
        f.expected_demand_kw[h] = lighting + hvac + rng.random_range(0.0..=80.0);
        f.solar_kw[h] = rng.random_range(0.0..=250.0);
        f.price[h] = rng.random_range(0.02..=0.40);
        f.dr_probability[h] = rng.random_range(0.0..=1.0);
        f.demand_charge[h] = rng.random_range(0.0..=0.1);
    }
    f
}

#[test]
fn plan_properties_hold_for_random_inputs() {
    let mut rng = StdRng::seed_from_u64(2024);
    let cfg = FacilityConfig::summer_peak();

    for _ in 0..200 {
        let forecast = random_forecast(&mut rng, cfg.facility.horizon_hours);
        let soc: f32 = rng.random_range(0.0..=1.0);
        let plan = optimize(&cfg, &forecast, soc);

        for hour in &plan.hours {
            assert!(
                (0.0..=1.0).contains(&hour.battery_soc),
                "SOC {} out of bounds at hour {}",
                hour.battery_soc,
                hour.index
            );
        }
        for entry in &plan.curtailments {
            assert!(forecast.dr_probability[entry.hour] > 0.5);
            assert!(entry.incentive > entry.production_cost);
        }
        for (h, p) in forecast.dr_probability.iter().enumerate() {
            if *p <= 0.5 {
                assert_eq!(plan.curtailments_at(h).count(), 0);
                assert_eq!(plan.hours[h].curtailed_kw, 0.0);
            }
        }
    }
}

#[test]
fn forecast_structure_is_repeatable() {
    let cfg = FacilityConfig::baseline();
    let now = common::start() + chrono::Duration::hours(14);
    let mut first = ForecastGenerator::with_seed(&cfg, 1).unwrap();
    let mut second = ForecastGenerator::with_seed(&cfg, 99).unwrap();

    let a = first.forecast(&cfg, now, None).unwrap();
    let b = second.forecast(&cfg, now, None).unwrap();
    assert_eq!(a.hour_of_day, b.hour_of_day);
    assert_eq!(a.price_band, b.price_band);
    assert_eq!(a.photoperiod, b.photoperiod);
    assert_eq!(a.start_hour, 14);
}

#[test]
fn savings_and_peaks_are_consistent() {
    let cfg = FacilityConfig::summer_peak();
    let mut generator = ForecastGenerator::new(&cfg).unwrap();
    let forecast = generator.forecast(&cfg, common::start(), None).unwrap();
    let plan = optimize(&cfg, &forecast, 0.5);

    assert!((plan.cost_savings - (plan.baseline_cost - plan.projected_cost)).abs() < 1e-2);
    assert!((plan.peak_reduction_kw - (plan.baseline_peak_kw - plan.peak_demand_kw)).abs() < 1e-3);
    let summed: f32 = plan.hours.iter().map(|h| h.cost()).sum();
    assert!((summed - plan.projected_cost).abs() < 1e-1);
    assert!((0.0..=1.0).contains(&plan.renewable_utilization));
}
