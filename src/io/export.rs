//! CSV export for dispatch plans.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::dispatch::types::{HvacMode, OptimizationResult};

/// Column header for one row per hourly slice.
const HEADER: &str = "index,hour_of_day,lighting_kw,lighting_dimming,hvac_kw,\
                      hvac_setpoint_c,hvac_mode,battery_kw,battery_soc,curtailed_kw,\
                      net_demand_kw,energy_cost,demand_cost,baseline_cost,over_peak_limit";

/// Exports a plan's hourly slices to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(plan: &OptimizationResult, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(plan, buf)
}

/// Writes a plan's hourly slices as CSV to any writer.
///
/// Output is deterministic for identical plans.
///
/// # Arguments
///
/// * `plan` - Published dispatch plan
/// * `writer` - Destination implementing `Write`
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(plan: &OptimizationResult, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for h in &plan.hours {
        let over_limit = plan.peak_limit_exceeded_hours.contains(&h.index);
        wtr.write_record(&[
            h.index.to_string(),
            h.hour_of_day.to_string(),
            format!("{:.4}", h.lighting_kw),
            format!("{:.4}", h.lighting_dimming),
            format!("{:.4}", h.hvac_kw),
            format!("{:.2}", h.hvac_setpoint_c),
            mode_label(h.hvac_mode).to_string(),
            format!("{:.4}", h.battery_kw),
            format!("{:.4}", h.battery_soc),
            format!("{:.4}", h.curtailed_kw),
            format!("{:.4}", h.net_demand_kw),
            format!("{:.4}", h.energy_cost),
            format!("{:.4}", h.demand_cost),
            format!("{:.4}", h.baseline_cost),
            over_limit.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn mode_label(mode: HvacMode) -> &'static str {
    match mode {
        HvacMode::Baseline => "baseline",
        HvacMode::PreCool => "pre_cool",
        HvacMode::Relax => "relax",
    }
}
