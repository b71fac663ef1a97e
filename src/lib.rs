//! Energy dispatch and demand-response engine for indoor grow facilities.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod devices;
/// Optimization engine, demand response, dispatch, and reporting.
pub mod dispatch;
pub mod error;
pub mod forecast;
pub mod history;
pub mod io;
pub mod meter;
pub mod tariff;
