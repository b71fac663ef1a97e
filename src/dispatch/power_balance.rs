//! Facility power balance computation.

/// Computes net grid demand from facility load, generation, and storage.
///
/// All inputs are in kW:
/// - `load_kw` - Facility consumption (positive)
/// - `renewable_kw` - On-site generation (positive)
/// - `battery_kw` - Battery power (positive=charge, negative=discharge)
///
/// # Returns
///
/// Net grid demand in kW (positive=import, negative=export)
pub fn net_demand_kw(load_kw: f32, renewable_kw: f32, battery_kw: f32) -> f32 {
    load_kw - renewable_kw + battery_kw
}

/// Splits net demand into non-negative `(import_kw, export_kw)`.
pub fn grid_split(net_kw: f32) -> (f32, f32) {
    if net_kw >= 0.0 {
        (net_kw, 0.0)
    } else {
        (0.0, -net_kw)
    }
}

/// Hourly energy and demand cost of `net_kw` at `price` and `demand_charge`.
///
/// Energy is billed on import only; the demand term is linear in net demand,
/// so exporting hours inside the demand-charge window reduce it.
pub fn hourly_cost(net_kw: f32, price: f32, demand_charge: f32) -> (f32, f32) {
    (net_kw.max(0.0) * price, net_kw * demand_charge)
}

/// Returns `true` when net demand exceeds the contracted peak limit.
pub fn exceeds_limit(net_kw: f32, limit_kw: f32) -> bool {
    net_kw > limit_kw
}
