//! Common types and traits for facility resource models.

use rand::{Rng, rngs::StdRng};

/// Contextual information passed to devices during power calculations.
///
/// # Fields
/// * `hour_of_day` - Local hour of day being evaluated (0-23)
/// * `dt_hours` - Duration the returned power is held for (hours)
/// * `setpoint_kw` - Optional power setpoint for controllable devices (kW)
pub struct DeviceContext {
    pub hour_of_day: u32,
    pub dt_hours: f32,
    pub setpoint_kw: Option<f32>,
}

impl DeviceContext {
    /// Creates a one-hour context for `hour_of_day` with no setpoint.
    pub fn new(hour_of_day: u32) -> Self {
        Self {
            hour_of_day: hour_of_day % 24,
            dt_hours: 1.0,
            setpoint_kw: None,
        }
    }

    /// Creates a context carrying a power setpoint held for `dt_hours`.
    pub fn with_setpoint(hour_of_day: u32, dt_hours: f32, setpoint_kw: f32) -> Self {
        Self {
            hour_of_day: hour_of_day % 24,
            dt_hours,
            setpoint_kw: Some(setpoint_kw),
        }
    }
}

/// A facility resource that consumes, produces, or stores electricity.
pub trait Device {
    /// Returns the device power for the given context.
    ///
    /// Loads return their consumption and generators their output, both as
    /// non-negative kW. Storage returns its actual power with positive meaning
    /// charge and negative meaning discharge.
    ///
    /// # Arguments
    ///
    /// * `context` - Hour of day, step length, and optional setpoint
    ///
    /// # Returns
    ///
    /// Power in kilowatts (kW) for the given context
    fn power_kw(&mut self, context: &DeviceContext) -> f32;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;
}

/// Generates Gaussian noise using the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and the given deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f32) -> f32 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f32 = rng.random::<f32>().clamp(1e-6, 1.0);
    let u2: f32 = rng.random::<f32>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
    z0 * std_dev
}

/// Draws a multiplier uniformly from `[1 - spread, 1 + spread]`.
pub fn bounded_variation(rng: &mut StdRng, spread: f32) -> f32 {
    if spread <= 0.0 {
        return 1.0;
    }
    1.0 + rng.random_range(-spread..=spread)
}

/// Fraction of peak solar output at `hour` for a `[sunrise, sunset)` window.
///
/// Follows a half-sine evaluated at the middle of each hour, so the curve is
/// unimodal and peaks at solar noon. Zero outside the window.
pub fn daylight_frac(hour: u32, sunrise: u32, sunset: u32) -> f32 {
    let hour = hour % 24;
    if hour < sunrise || hour >= sunset || sunset <= sunrise {
        return 0.0;
    }
    let span = (sunset - sunrise) as f32;
    let x = (hour - sunrise) as f32 + 0.5;
    (std::f32::consts::PI * x / span).sin().max(0.0)
}
