//! Engine error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by an external actuator collaborator.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("actuator did not acknowledge {command}: {reason}")]
pub struct ActuatorError {
    /// Command that failed (e.g. `"set_hvac_setpoint"`).
    pub command: String,
    /// Reason given by the collaborator.
    pub reason: String,
}

impl ActuatorError {
    pub fn new(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced by the dispatch engine.
///
/// Forecast and optimization failures are scoped to a single cycle; the
/// previously published plan stays authoritative and the next tick retries.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ConfigError>),

    #[error("optimization cycle already in progress")]
    Busy,

    #[error("forecast error: {0}")]
    Forecast(String),

    #[error("non-finite {quantity} at hour {hour}")]
    NonFinite { hour: usize, quantity: &'static str },

    #[error("optimization cycle took {elapsed_ms} ms, deadline is {deadline_ms} ms")]
    DeadlineExceeded { elapsed_ms: u64, deadline_ms: u64 },

    #[error("no measurement available yet")]
    NoMeasurement,

    #[error("no dispatch plan published yet")]
    NoPlan,

    #[error("invalid demand response notification: {0}")]
    InvalidEvent(String),

    #[error("unknown demand response event \"{0}\"")]
    UnknownEvent(String),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// Returns `true` when the caller should simply retry on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy
                | Self::Forecast(_)
                | Self::NonFinite { .. }
                | Self::DeadlineExceeded { .. }
                | Self::NoMeasurement
                | Self::NoPlan
                | Self::Actuator(_)
        )
    }
}

impl From<Vec<ConfigError>> for EngineError {
    fn from(errors: Vec<ConfigError>) -> Self {
        Self::InvalidConfig(errors)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Returns `value` if finite, otherwise a [`EngineError::NonFinite`] for `hour`.
pub(crate) fn ensure_finite(value: f32, hour: usize, quantity: &'static str) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NonFinite { hour, quantity })
    }
}
