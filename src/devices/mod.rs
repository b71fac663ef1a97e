//! Physical models of the facility's flexible loads, generation, and storage.

/// Battery energy storage state.
pub mod battery;
/// HVAC diurnal load model.
pub mod hvac;
/// Grow lighting photoperiod model.
pub mod lighting;
/// Solar photovoltaic generation model.
pub mod solar;
pub mod types;
/// Wind turbine power curve.
pub mod wind;

pub use battery::StorageState;
pub use hvac::HvacPlant;
pub use lighting::GrowLighting;
pub use solar::SolarArray;
pub use types::{Device, DeviceContext};
pub use wind::WindTurbine;
