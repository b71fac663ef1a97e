//! API query and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::devices::StorageState;

/// Default number of records returned by list endpoints.
pub const DEFAULT_LIMIT: usize = 24;

/// Optional `limit` query parameter for list endpoints.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    /// Maximum records returned, most recent last.
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// Optional trailing window for the summary endpoint.
#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Window length in hours (default 24).
    pub hours: Option<i64>,
}

/// Engine health and configuration revision.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub facility: String,
    pub config_revision: u64,
    pub consecutive_failures: u32,
    /// `true` once consecutive failed cycles reach the alert threshold.
    pub alert: bool,
    pub latest_measurement_at: Option<DateTime<Utc>>,
    pub latest_plan_at: Option<DateTime<Utc>>,
    pub storage: StorageState,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
