//! Actuator boundary: translates plan slices and DR curtailments into commands.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::demand_response::ActiveCurtailment;
use crate::dispatch::types::HourlyDispatch;
use crate::error::ActuatorError;
use crate::history::Timestamped;

/// External actuator collaborators: lighting controller, HVAC controller,
/// battery management system, and load control relays.
///
/// Commands are fire-and-acknowledge; an `Err` means the collaborator did not
/// acknowledge. Implementations use interior mutability so one instance can
/// be shared by the control loop and DR interrupts.
pub trait Actuators: Send + Sync {
    /// Sets lighting level as a fraction of baseline (0.0 to 1.0).
    fn set_lighting_dimming(&self, level: f32) -> Result<(), ActuatorError>;
    /// Sets the HVAC setpoint (°C).
    fn set_hvac_setpoint(&self, celsius: f32) -> Result<(), ActuatorError>;
    /// Sets battery power (kW; positive=charge, negative=discharge).
    fn set_battery_power(&self, kw: f32) -> Result<(), ActuatorError>;
    /// Sheds `reduction_kw` from load `load_id`.
    fn curtail_load(&self, load_id: &str, reduction_kw: f32) -> Result<(), ActuatorError>;
    /// Returns load `load_id` to normal operation.
    fn restore_load(&self, load_id: &str) -> Result<(), ActuatorError>;
}

/// One actuator command, in the units the optimizer produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ActuatorCommand {
    LightingDimming { level: f32 },
    HvacSetpoint { celsius: f32 },
    BatteryPower { kw: f32 },
    Curtail { load_id: String, reduction_kw: f32 },
    Restore { load_id: String },
}

impl ActuatorCommand {
    /// Trait method name the command maps to.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LightingDimming { .. } => "set_lighting_dimming",
            Self::HvacSetpoint { .. } => "set_hvac_setpoint",
            Self::BatteryPower { .. } => "set_battery_power",
            Self::Curtail { .. } => "curtail_load",
            Self::Restore { .. } => "restore_load",
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LightingDimming { level } => write!(f, "lighting dimming {:.0}%", level * 100.0),
            Self::HvacSetpoint { celsius } => write!(f, "HVAC setpoint {celsius:.1}C"),
            Self::BatteryPower { kw } => write!(f, "battery {kw:+.1} kW"),
            Self::Curtail {
                load_id,
                reduction_kw,
            } => write!(f, "curtail {load_id} by {reduction_kw:.1} kW"),
            Self::Restore { load_id } => write!(f, "restore {load_id}"),
        }
    }
}

/// Outcome of one dispatch step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub timestamp: DateTime<Utc>,
    /// Commands acknowledged by the collaborators.
    pub applied: Vec<ActuatorCommand>,
    /// Commands that were not acknowledged.
    pub failures: Vec<ActuatorError>,
}

impl DispatchReport {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            applied: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns `true` when every command was acknowledged.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A recorded actuator failure, kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailure {
    pub timestamp: DateTime<Utc>,
    pub error: ActuatorError,
}

impl Timestamped for DispatchFailure {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Applies plan slices and curtailments to the actuator collaborators.
///
/// Performs no decision logic. Failures are logged and reported, never
/// retried here; the next tick re-sends fresh setpoints.
#[derive(Clone)]
pub struct DispatchExecutor {
    actuators: Arc<dyn Actuators>,
}

impl fmt::Debug for DispatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchExecutor").finish_non_exhaustive()
    }
}

impl DispatchExecutor {
    pub fn new(actuators: Arc<dyn Actuators>) -> Self {
        Self { actuators }
    }

    /// Sends one command to its collaborator.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's [`ActuatorError`] if it did not acknowledge.
    pub fn send(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        match command {
            ActuatorCommand::LightingDimming { level } => self.actuators.set_lighting_dimming(*level),
            ActuatorCommand::HvacSetpoint { celsius } => self.actuators.set_hvac_setpoint(*celsius),
            ActuatorCommand::BatteryPower { kw } => self.actuators.set_battery_power(*kw),
            ActuatorCommand::Curtail {
                load_id,
                reduction_kw,
            } => self.actuators.curtail_load(load_id, *reduction_kw),
            ActuatorCommand::Restore { load_id } => self.actuators.restore_load(load_id),
        }
    }

    /// Applies the current hour's set points plus every active curtailment.
    pub fn apply_hour(
        &self,
        hour: &HourlyDispatch,
        curtailments: &[ActiveCurtailment],
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let mut commands = vec![
            ActuatorCommand::LightingDimming {
                level: hour.lighting_dimming,
            },
            ActuatorCommand::HvacSetpoint {
                celsius: hour.hvac_setpoint_c,
            },
            ActuatorCommand::BatteryPower {
                kw: hour.battery_kw,
            },
        ];
        commands.extend(curtailments.iter().map(|c| ActuatorCommand::Curtail {
            load_id: c.load_id.clone(),
            reduction_kw: c.reduction_kw,
        }));
        self.apply_all(commands, now)
    }

    /// Sends `commands` in order, collecting acknowledgements and failures.
    pub fn apply_all(&self, commands: Vec<ActuatorCommand>, now: DateTime<Utc>) -> DispatchReport {
        let mut report = DispatchReport::new(now);
        for command in commands {
            match self.send(&command) {
                Ok(()) => report.applied.push(command),
                Err(e) => {
                    warn!(command = command.name(), reason = %e.reason, "actuator did not acknowledge");
                    report.failures.push(e);
                }
            }
        }
        report
    }
}

/// In-memory actuators that record every acknowledged command.
///
/// Commands named with [`RecordingActuators::fail_command`] are rejected.
#[derive(Debug, Default)]
pub struct RecordingActuators {
    commands: Mutex<Vec<ActuatorCommand>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingActuators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future command with trait method `name` fail.
    pub fn fail_command(&self, name: &'static str) {
        self.failing.lock().insert(name);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Snapshot of acknowledged commands, oldest first.
    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().clone()
    }

    fn record(&self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        let name = command.name();
        if self.failing.lock().contains(name) {
            return Err(ActuatorError::new(name, "injected failure"));
        }
        self.commands.lock().push(command);
        Ok(())
    }
}

impl Actuators for RecordingActuators {
    fn set_lighting_dimming(&self, level: f32) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::LightingDimming { level })
    }

    fn set_hvac_setpoint(&self, celsius: f32) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::HvacSetpoint { celsius })
    }

    fn set_battery_power(&self, kw: f32) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::BatteryPower { kw })
    }

    fn curtail_load(&self, load_id: &str, reduction_kw: f32) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::Curtail {
            load_id: load_id.to_string(),
            reduction_kw,
        })
    }

    fn restore_load(&self, load_id: &str) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::Restore {
            load_id: load_id.to_string(),
        })
    }
}

/// Actuators that only log commands, for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActuators;

impl LoggingActuators {
    fn log(command: &ActuatorCommand) -> Result<(), ActuatorError> {
        info!(command = command.name(), "{command}");
        Ok(())
    }
}

impl Actuators for LoggingActuators {
    fn set_lighting_dimming(&self, level: f32) -> Result<(), ActuatorError> {
        Self::log(&ActuatorCommand::LightingDimming { level })
    }

    fn set_hvac_setpoint(&self, celsius: f32) -> Result<(), ActuatorError> {
        Self::log(&ActuatorCommand::HvacSetpoint { celsius })
    }

    fn set_battery_power(&self, kw: f32) -> Result<(), ActuatorError> {
        Self::log(&ActuatorCommand::BatteryPower { kw })
    }

    fn curtail_load(&self, load_id: &str, reduction_kw: f32) -> Result<(), ActuatorError> {
        Self::log(&ActuatorCommand::Curtail {
            load_id: load_id.to_string(),
            reduction_kw,
        })
    }

    fn restore_load(&self, load_id: &str) -> Result<(), ActuatorError> {
        Self::log(&ActuatorCommand::Restore {
            load_id: load_id.to_string(),
        })
    }
}
