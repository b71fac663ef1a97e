//! Windowed reporting summaries over engine history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::demand_response::DemandResponseEvent;
use super::types::{EnergyMeasurement, OptimizationResult};

/// Savings ratio (vs. executed-hour baseline) that earns the full savings score.
const FULL_SCORE_SAVINGS_RATIO: f32 = 0.25;
const RENEWABLE_WEIGHT: f32 = 30.0;
const SAVINGS_WEIGHT: f32 = 40.0;
const PEAK_WEIGHT: f32 = 30.0;

/// Aggregate indicators over a reporting window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Number of measurements in the window.
    pub measurement_count: usize,
    /// Facility consumption (kWh).
    pub total_consumption_kwh: f32,
    /// Grid import (kWh).
    pub grid_import_kwh: f32,
    /// Energy cost of grid import at the measured rates ($).
    pub total_cost: f32,
    /// Highest measured facility demand (kW).
    pub peak_demand_kw: f32,
    /// Savings of executed plan hours versus their baselines ($).
    pub cost_savings: f32,
    /// Incentives from completed DR events ($).
    pub dr_revenue: f32,
    /// DR events overlapping the window.
    pub dr_events: usize,
    /// Mean renewable share of demand (0.0 to 1.0).
    pub average_renewable_share: f32,
    /// Bounded 0-100 score combining renewable share, savings, and peak margin.
    pub efficiency_score: f32,
}

impl ReportSummary {
    /// Computes the summary from records already filtered to the window.
    ///
    /// # Arguments
    ///
    /// * `window` - `(start, end)` of the reporting window
    /// * `measurements` - Measurements inside the window
    /// * `plans` - Plans published inside the window
    /// * `events` - DR events overlapping the window
    /// * `tick_hours` - Interval each measurement represents (hours)
    /// * `peak_limit_kw` - Contracted peak demand limit
    pub fn from_records<'a>(
        window: (DateTime<Utc>, DateTime<Utc>),
        measurements: impl IntoIterator<Item = &'a EnergyMeasurement>,
        plans: impl IntoIterator<Item = &'a OptimizationResult>,
        events: impl IntoIterator<Item = &'a DemandResponseEvent>,
        tick_hours: f32,
        peak_limit_kw: f32,
    ) -> Self {
        let mut count = 0_usize;
        let mut consumption = 0.0_f32;
        let mut import = 0.0_f32;
        let mut cost = 0.0_f32;
        let mut peak = 0.0_f32;
        let mut share_sum = 0.0_f32;

        for m in measurements {
            count += 1;
            consumption += m.total_power_kw.max(0.0) * tick_hours;
            import += m.grid_import_kw.max(0.0) * tick_hours;
            cost += m.grid_import_kw.max(0.0) * m.electricity_rate * tick_hours;
            peak = peak.max(m.total_power_kw);
            share_sum += m.renewable_share.clamp(0.0, 1.0);
        }

        let mut savings = 0.0_f32;
        let mut executed_baseline = 0.0_f32;
        for plan in plans {
            savings += plan.current_hour_savings();
            if let Some(hour) = plan.current_hour() {
                executed_baseline += hour.baseline_cost;
            }
        }

        let mut dr_revenue = 0.0_f32;
        let mut dr_events = 0_usize;
        for event in events {
            dr_events += 1;
            if event.status.is_terminal() {
                dr_revenue += event.incentive_earned;
            }
        }

        let average_share = if count > 0 {
            share_sum / count as f32
        } else {
            0.0
        };

        Self {
            window_start: window.0,
            window_end: window.1,
            measurement_count: count,
            total_consumption_kwh: consumption,
            grid_import_kwh: import,
            total_cost: cost,
            peak_demand_kw: peak,
            cost_savings: savings,
            dr_revenue,
            dr_events,
            average_renewable_share: average_share,
            efficiency_score: efficiency_score(
                average_share,
                savings,
                executed_baseline,
                peak,
                peak_limit_kw,
            ),
        }
    }
}

/// Scores renewable share, savings ratio, and peak margin into `[0, 100]`.
pub fn efficiency_score(
    renewable_share: f32,
    savings: f32,
    baseline_cost: f32,
    peak_kw: f32,
    peak_limit_kw: f32,
) -> f32 {
    let renewable = renewable_share.clamp(0.0, 1.0);
    let savings_ratio = if baseline_cost > 0.0 {
        (savings / baseline_cost / FULL_SCORE_SAVINGS_RATIO).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let peak_margin = if peak_kw > 0.0 {
        (peak_limit_kw / peak_kw).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let score = RENEWABLE_WEIGHT * renewable + SAVINGS_WEIGHT * savings_ratio + PEAK_WEIGHT * peak_margin;
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Energy Report ---")?;
        writeln!(f, "Window:                {} .. {}", self.window_start, self.window_end)?;
        writeln!(f, "Measurements:          {}", self.measurement_count)?;
        writeln!(
            f,
            "Consumption:           {:.1} kWh (grid {:.1} kWh)",
            self.total_consumption_kwh, self.grid_import_kwh
        )?;
        writeln!(f, "Energy cost:           ${:.2}", self.total_cost)?;
        writeln!(f, "Peak demand:           {:.1} kW", self.peak_demand_kw)?;
        writeln!(f, "Cost savings:          ${:.2}", self.cost_savings)?;
        writeln!(
            f,
            "DR revenue:            ${:.2} ({} events)",
            self.dr_revenue, self.dr_events
        )?;
        writeln!(
            f,
            "Renewable share:       {:.1}%",
            self.average_renewable_share * 100.0
        )?;
        write!(f, "Efficiency score:      {:.0}/100", self.efficiency_score)
    }
}
