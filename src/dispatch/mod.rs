//! Optimization, demand response, and dispatch for one facility.
//!
//! The [`DispatchEngine`] ties the pieces together; [`ControlLoop`] drives it.

pub mod clock;
pub mod control_loop;
pub mod demand_response;
pub mod engine;
pub mod executor;
pub mod kpi;
pub mod optimizer;
pub mod power_balance;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control_loop::ControlLoop;
pub use demand_response::{
    DemandResponseEvent, DemandResponseManager, DrEventType, DrNotification, EventStatus,
};
pub use engine::{DispatchEngine, TickReport};
pub use executor::{
    ActuatorCommand, Actuators, DispatchExecutor, DispatchReport, LoggingActuators,
    RecordingActuators,
};
pub use kpi::ReportSummary;
pub use optimizer::DispatchOptimizer;
pub use types::{
    CurtailmentEntry, EnergyForecast, EnergyMeasurement, GridStress, HourlyDispatch, HvacMode,
    LoadBreakdown, OptimizationResult,
};
