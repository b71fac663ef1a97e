//! The dispatch engine service.
//!
//! Owns the measurement, forecast, and plan histories, runs single-flight
//! optimization cycles, and accepts DR notifications at any time. Construct
//! one per facility and share it behind an `Arc`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::FacilityConfig;
use crate::devices::StorageState;
use crate::dispatch::clock::Clock;
use crate::dispatch::demand_response::{DemandResponseEvent, DemandResponseManager, DrNotification};
use crate::dispatch::executor::{Actuators, DispatchExecutor, DispatchFailure, DispatchReport};
use crate::dispatch::kpi::ReportSummary;
use crate::dispatch::optimizer::DispatchOptimizer;
use crate::dispatch::types::{EnergyForecast, EnergyMeasurement, OptimizationResult};
use crate::error::{EngineError, Result};
use crate::forecast::{ForecastGenerator, ForecastSource};
use crate::history::History;
use crate::meter::MeasurementSource;

/// Configuration in force together with its revision number.
#[derive(Debug)]
struct ConfigSlot {
    config: Arc<FacilityConfig>,
    revision: u64,
}

/// Outcome of one control tick.
#[derive(Debug)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    /// `false` when the meter missed this tick and the last measurement was reused.
    pub measurement_fresh: bool,
    /// Plan published this tick, if the cycle succeeded.
    pub plan: Option<Arc<OptimizationResult>>,
    /// Why the cycle produced no plan, if it failed.
    pub cycle_error: Option<EngineError>,
    /// Commands sent this tick; `None` when no plan covers the current hour.
    pub dispatch: Option<DispatchReport>,
    /// DR events that finished this tick.
    pub completed_events: Vec<DemandResponseEvent>,
}

/// Energy dispatch service for one facility.
pub struct DispatchEngine {
    config: RwLock<ConfigSlot>,
    cycle_guard: Mutex<()>,
    forecaster: Mutex<Box<dyn ForecastSource>>,
    storage: Mutex<StorageState>,
    measurements: RwLock<History<EnergyMeasurement>>,
    forecasts: RwLock<History<EnergyForecast>>,
    plans: RwLock<History<Arc<OptimizationResult>>>,
    dispatch_failures: RwLock<History<DispatchFailure>>,
    dr: Mutex<DemandResponseManager>,
    executor: DispatchExecutor,
    clock: Arc<dyn Clock>,
    consecutive_failures: AtomicU32,
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("revision", &self.config_revision())
            .field("measurements", &self.measurements.read().len())
            .field("plans", &self.plans.read().len())
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Creates an engine from validated configuration and its collaborators.
    ///
    /// History capacities and retention are fixed here from `config.engine`;
    /// later reloads do not resize them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] listing every invalid field.
    pub fn new(
        config: FacilityConfig,
        forecaster: Box<dyn ForecastSource>,
        actuators: Arc<dyn Actuators>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(EngineError::InvalidConfig(errors));
        }

        let engine = &config.engine;
        let retention = Duration::days(i64::from(engine.retention_days));
        let measurement_capacity = engine.measurement_capacity.max(1);
        let plan_capacity = engine.plan_capacity.max(1);

        Ok(Self {
            storage: Mutex::new(StorageState::from_config(&config.storage)),
            measurements: RwLock::new(History::new(measurement_capacity, retention)),
            forecasts: RwLock::new(History::new(plan_capacity, retention)),
            plans: RwLock::new(History::new(plan_capacity, retention)),
            dispatch_failures: RwLock::new(History::new(plan_capacity, retention)),
            dr: Mutex::new(DemandResponseManager::new(plan_capacity)),
            cycle_guard: Mutex::new(()),
            forecaster: Mutex::new(forecaster),
            executor: DispatchExecutor::new(actuators),
            clock,
            consecutive_failures: AtomicU32::new(0),
            config: RwLock::new(ConfigSlot {
                config: Arc::new(config),
                revision: 1,
            }),
        })
    }

    /// Creates an engine forecasting with a seeded [`ForecastGenerator`].
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the configuration is invalid or unusable
    /// for forecasting.
    pub fn with_forecast_generator(
        config: FacilityConfig,
        actuators: Arc<dyn Actuators>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let generator = ForecastGenerator::new(&config)?;
        Self::new(config, Box::new(generator), actuators, clock)
    }

    /// Configuration currently in force.
    pub fn config(&self) -> Arc<FacilityConfig> {
        Arc::clone(&self.config.read().config)
    }

    /// Revision of the configuration currently in force, starting at 1.
    pub fn config_revision(&self) -> u64 {
        self.config.read().revision
    }

    /// Swaps in a new configuration and returns its revision.
    ///
    /// Plans already published keep the revision they were produced under.
    /// A cycle in flight finishes with the configuration it started with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] and keeps the current
    /// configuration if `config` does not validate.
    pub fn reload_config(&self, config: FacilityConfig) -> Result<u64> {
        let errors = config.validate();
        if !errors.is_empty() {
            warn!(errors = errors.len(), "configuration reload rejected");
            return Err(EngineError::InvalidConfig(errors));
        }
        let mut slot = self.config.write();
        slot.config = Arc::new(config);
        slot.revision += 1;
        info!(revision = slot.revision, "configuration reloaded");
        Ok(slot.revision)
    }

    /// Appends a measurement and updates the observed battery state.
    ///
    /// Never waits for a running optimization cycle.
    pub fn ingest(&self, measurement: EnergyMeasurement) {
        self.storage
            .lock()
            .observe(measurement.battery_soc, measurement.battery_power_kw);
        self.measurements.write().push(measurement);
    }

    pub fn latest_measurement(&self) -> Option<EnergyMeasurement> {
        self.measurements.read().latest().cloned()
    }

    /// Runs one Forecast → Optimize cycle and publishes the plan.
    ///
    /// Overlapping calls are rejected, not queued. A failed cycle publishes
    /// nothing; the previous plan stays authoritative.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Busy`] if another cycle is in progress
    /// - [`EngineError::NoMeasurement`] before the first measurement arrives
    /// - forecast, non-finite, or deadline errors from the cycle itself
    pub fn run_cycle(&self) -> Result<Arc<OptimizationResult>> {
        let Some(_guard) = self.cycle_guard.try_lock() else {
            warn!("optimization cycle rejected: another cycle is in progress");
            return Err(EngineError::Busy);
        };

        match self.optimize_once() {
            Ok(plan) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                info!(
                    revision = plan.config_revision,
                    projected_cost = plan.projected_cost,
                    savings = plan.cost_savings,
                    peak_kw = plan.peak_demand_kw,
                    curtailments = plan.curtailments.len(),
                    "dispatch plan published"
                );
                Ok(plan)
            }
            Err(e) => {
                self.record_cycle_failure(&e);
                Err(e)
            }
        }
    }

    fn optimize_once(&self) -> Result<Arc<OptimizationResult>> {
        let started = Instant::now();
        let now = self.clock.now();
        let (config, revision) = {
            let slot = self.config.read();
            (Arc::clone(&slot.config), slot.revision)
        };
        let measurement = self.latest_measurement().ok_or(EngineError::NoMeasurement)?;

        let forecast = self
            .forecaster
            .lock()
            .forecast(&config, now, Some(&measurement))?;
        forecast.validate(config.facility.horizon_hours)?;
        self.forecasts.write().push(forecast.clone());

        let storage = self.storage.lock().clone();
        let plan = DispatchOptimizer::new(&config)
            .with_revision(revision)
            .optimize(&measurement, &forecast, &storage, now)?;

        if let Some(deadline_ms) = config.engine.cycle_deadline_ms {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            if elapsed_ms > deadline_ms {
                return Err(EngineError::DeadlineExceeded {
                    elapsed_ms,
                    deadline_ms,
                });
            }
        }

        let plan = Arc::new(plan);
        self.plans.write().push(Arc::clone(&plan));
        if let Some(hour) = plan.current_hour() {
            self.storage.lock().power_kw = hour.battery_kw;
        }
        Ok(plan)
    }

    fn record_cycle_failure(&self, e: &EngineError) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(error = %e, consecutive = failures, "optimization cycle failed, keeping previous plan");
        let threshold = self.config().engine.alert_after_failures;
        if threshold > 0 && failures >= threshold {
            error!(
                consecutive = failures,
                threshold, "no dispatch plan produced for {failures} consecutive cycles"
            );
        }
    }

    /// Number of consecutive failed cycles since the last published plan.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// `true` while consecutive failures are at or above the alert threshold.
    pub fn alert_active(&self) -> bool {
        let threshold = self.config().engine.alert_after_failures;
        threshold > 0 && self.consecutive_failures() >= threshold
    }

    /// Sends the slice of the latest plan in force now, plus active curtailments.
    ///
    /// Actuator failures are recorded in the dispatch failure history and
    /// returned in the report; they never roll back the plan.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoPlan`] if no plan covers the current hour.
    pub fn execute(&self) -> Result<DispatchReport> {
        let now = self.clock.now();
        let plan = self.latest_plan().ok_or(EngineError::NoPlan)?;
        let hour = plan.hour_at(now).ok_or(EngineError::NoPlan)?;
        let curtailments = self.dr.lock().active_curtailments();

        let report = self.executor.apply_hour(hour, &curtailments, now);
        if !report.is_clean() {
            let mut failures = self.dispatch_failures.write();
            for e in &report.failures {
                failures.push(DispatchFailure {
                    timestamp: now,
                    error: e.clone(),
                });
            }
        }
        debug!(
            applied = report.applied.len(),
            failed = report.failures.len(),
            index = hour.index,
            "dispatch applied"
        );
        Ok(report)
    }

    /// Runs one full control tick: Measurement → DR → Forecast/Optimize → Dispatch.
    ///
    /// Never panics and never returns an error; failures are carried in the
    /// report. A missed measurement is not fabricated into history.
    pub fn tick(&self, source: &mut dyn MeasurementSource) -> TickReport {
        let now = self.clock.now();
        let measurement_fresh = match source.poll(now) {
            Some(m) => {
                self.ingest(m);
                true
            }
            None => {
                warn!(%now, "measurement missed, reusing last known measurement");
                false
            }
        };

        let completed_events = self.poll_dr_events();
        let (plan, cycle_error) = match self.run_cycle() {
            Ok(plan) => (Some(plan), None),
            Err(e) => (None, Some(e)),
        };
        let dispatch = match self.execute() {
            Ok(report) => Some(report),
            Err(e) => {
                debug!(error = %e, "nothing dispatched this tick");
                None
            }
        };

        TickReport {
            timestamp: now,
            measurement_fresh,
            plan,
            cycle_error,
            dispatch,
            completed_events,
        }
    }

    /// Registers a DR notification; curtailments go out immediately if the
    /// window has started.
    ///
    /// Does not wait for, or alter, an in-flight optimization cycle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidEvent`] for a malformed notification.
    pub fn notify_dr_event(&self, notification: DrNotification) -> Result<DemandResponseEvent> {
        let config = self.config();
        let latest = self.latest_measurement();
        let now = self.clock.now();
        self.dr
            .lock()
            .notify(notification, &config, latest.as_ref(), &self.executor, now)
    }

    /// Activates and completes DR events per the current time.
    pub fn poll_dr_events(&self) -> Vec<DemandResponseEvent> {
        let config = self.config();
        let latest = self.latest_measurement();
        let now = self.clock.now();
        self.dr
            .lock()
            .poll(&config, latest.as_ref(), &self.executor, now)
    }

    /// Looks up a DR event by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownEvent`] if no retained event has `id`.
    pub fn dr_event(&self, id: &str) -> Result<DemandResponseEvent> {
        self.dr
            .lock()
            .event(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEvent(id.to_string()))
    }

    /// Retained DR events, oldest first.
    pub fn dr_events(&self) -> Vec<DemandResponseEvent> {
        self.dr.lock().events().cloned().collect()
    }

    /// Up to `n` most recent measurements, oldest first.
    pub fn recent_measurements(&self, n: usize) -> Vec<EnergyMeasurement> {
        self.measurements.read().recent(n).cloned().collect()
    }

    pub fn latest_plan(&self) -> Option<Arc<OptimizationResult>> {
        self.plans.read().latest().cloned()
    }

    /// Up to `n` most recent plans, oldest first.
    pub fn recent_plans(&self, n: usize) -> Vec<Arc<OptimizationResult>> {
        self.plans.read().recent(n).cloned().collect()
    }

    pub fn latest_forecast(&self) -> Option<EnergyForecast> {
        self.forecasts.read().latest().cloned()
    }

    /// Up to `n` most recent actuator failures, oldest first.
    pub fn recent_dispatch_failures(&self, n: usize) -> Vec<DispatchFailure> {
        self.dispatch_failures.read().recent(n).cloned().collect()
    }

    /// Battery state as last observed and commanded.
    pub fn storage_state(&self) -> StorageState {
        self.storage.lock().clone()
    }

    /// Summarizes the trailing `window` ending now.
    ///
    /// The window start is clamped to the Unix epoch, so an oversized
    /// window covers all retained history.
    pub fn summary(&self, window: Duration) -> ReportSummary {
        let end = self.clock.now();
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let start = end
            .checked_sub_signed(window)
            .map_or(epoch, |start| start.max(epoch));
        let config = self.config();
        let tick_hours = config.engine.tick_seconds as f32 / 3600.0;

        let measurements = self.measurements.read();
        let plans = self.plans.read();
        let dr = self.dr.lock();
        ReportSummary::from_records(
            (start, end),
            measurements.since(start),
            plans.since(start).map(Arc::as_ref),
            dr.events().filter(|e| e.end > start && e.start <= end),
            tick_hours,
            config.facility.peak_demand_limit_kw,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::clock::ManualClock;
    use crate::dispatch::demand_response::{DrEventType, EventStatus};
    use crate::dispatch::executor::RecordingActuators;
    use crate::meter::{ReplayMeter, SimulatedMeter};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    fn engine() -> (DispatchEngine, Arc<ManualClock>, Arc<RecordingActuators>) {
        let clock = Arc::new(ManualClock::new(start()));
        let actuators = Arc::new(RecordingActuators::new());
        let engine = DispatchEngine::with_forecast_generator(
            FacilityConfig::baseline(),
            actuators.clone(),
            clock.clone(),
        )
        .unwrap();
        (engine, clock, actuators)
    }

    fn measurement(config: &FacilityConfig, at: DateTime<Utc>) -> EnergyMeasurement {
        use crate::meter::MeasurementSource;
        SimulatedMeter::new(config).poll(at).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut cfg = FacilityConfig::baseline();
        cfg.facility.horizon_hours = 0;
        let err = DispatchEngine::with_forecast_generator(
            cfg,
            Arc::new(RecordingActuators::new()),
            Arc::new(ManualClock::new(start())),
        )
        .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn unbounded_retention_is_rejected_and_long_retention_ingests() {
        let mut cfg = FacilityConfig::baseline();
        cfg.engine.retention_days = u32::MAX;
        let err = DispatchEngine::with_forecast_generator(
            cfg.clone(),
            Arc::new(RecordingActuators::new()),
            Arc::new(ManualClock::new(start())),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));

        cfg.engine.retention_days = crate::config::MAX_RETENTION_DAYS;
        let engine = DispatchEngine::with_forecast_generator(
            cfg.clone(),
            Arc::new(RecordingActuators::new()),
            Arc::new(ManualClock::new(start())),
        )
        .unwrap();
        engine.ingest(measurement(&cfg, start()));
        assert_eq!(engine.recent_measurements(10).len(), 1);
    }

    #[test]
    fn cycle_without_measurement_fails_retryably() {
        let (engine, _, _) = engine();
        let err = engine.run_cycle().unwrap_err();
        assert!(matches!(err, EngineError::NoMeasurement));
        assert!(err.is_retryable());
        assert_eq!(engine.consecutive_failures(), 1);
        assert!(engine.latest_plan().is_none());
    }

    #[test]
    fn cycle_publishes_plan_and_forecast() {
        let (engine, _, _) = engine();
        engine.ingest(measurement(&engine.config(), start()));
        let plan = engine.run_cycle().unwrap();
        assert_eq!(plan.horizon, 24);
        assert_eq!(plan.config_revision, 1);
        assert!(engine.latest_forecast().is_some());
        assert_eq!(engine.recent_plans(10).len(), 1);
        assert_eq!(engine.consecutive_failures(), 0);
    }

    #[test]
    fn reload_bumps_revision_without_touching_published_plans() {
        let (engine, clock, _) = engine();
        engine.ingest(measurement(&engine.config(), start()));
        let first = engine.run_cycle().unwrap();

        let mut cfg = FacilityConfig::baseline();
        cfg.facility.peak_demand_limit_kw = 200.0;
        assert_eq!(engine.reload_config(cfg).unwrap(), 2);

        clock.advance(Duration::hours(1));
        let second = engine.run_cycle().unwrap();
        assert_eq!(first.config_revision, 1);
        assert_eq!(second.config_revision, 2);
        assert_eq!(engine.recent_plans(10)[0].config_revision, 1);
    }

    #[test]
    fn invalid_reload_keeps_current_config() {
        let (engine, _, _) = engine();
        let mut cfg = FacilityConfig::baseline();
        cfg.storage.capacity_kwh = -1.0;
        assert!(matches!(
            engine.reload_config(cfg),
            Err(EngineError::InvalidConfig(_))
        ));
        assert_eq!(engine.config_revision(), 1);
    }

    #[test]
    fn execute_without_plan_is_no_plan() {
        let (engine, _, actuators) = engine();
        assert!(matches!(engine.execute(), Err(EngineError::NoPlan)));
        assert!(actuators.commands().is_empty());
    }

    #[test]
    fn tick_reuses_last_measurement_on_gap() {
        let (engine, clock, _) = engine();
        let m = measurement(&engine.config(), start());
        let mut meter = ReplayMeter::new(vec![Some(m), None]);

        let first = engine.tick(&mut meter);
        assert!(first.measurement_fresh);
        assert!(first.plan.is_some());

        clock.advance(Duration::hours(1));
        let second = engine.tick(&mut meter);
        assert!(!second.measurement_fresh);
        assert!(second.plan.is_some());
        assert!(second.dispatch.is_some());
        assert_eq!(engine.recent_measurements(10).len(), 1);
    }

    #[test]
    fn actuator_failures_are_recorded() {
        let (engine, _, actuators) = engine();
        actuators.fail_command("set_hvac_setpoint");
        engine.ingest(measurement(&engine.config(), start()));
        engine.run_cycle().unwrap();

        let report = engine.execute().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.applied.len(), 2);
        let failures = engine.recent_dispatch_failures(10);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.command, "set_hvac_setpoint");
        assert!(engine.latest_plan().is_some());
    }

    #[test]
    fn unknown_dr_event_lookup() {
        let (engine, _, _) = engine();
        assert!(matches!(
            engine.dr_event("nope"),
            Err(EngineError::UnknownEvent(id)) if id == "nope"
        ));
    }

    #[test]
    fn dr_event_runs_to_completion_through_ticks() {
        let (engine, clock, _) = engine();
        let mut meter = SimulatedMeter::new(&engine.config());
        engine.tick(&mut meter);

        let event = engine
            .notify_dr_event(DrNotification {
                id: Some("evt".into()),
                event_type: DrEventType::Economic,
                start: start(),
                end: start() + Duration::hours(2),
                target_reduction_kw: 20.0,
            })
            .unwrap();
        assert_eq!(event.status, EventStatus::Active);

        clock.advance(Duration::hours(2));
        let report = engine.tick(&mut meter);
        assert_eq!(report.completed_events.len(), 1);
        assert!(engine.dr_event("evt").unwrap().status.is_terminal());
    }

    #[test]
    fn summary_covers_window() {
        let (engine, clock, _) = engine();
        let mut meter = SimulatedMeter::new(&engine.config());
        for _ in 0..6 {
            engine.tick(&mut meter);
            clock.advance(Duration::hours(1));
        }
        let summary = engine.summary(Duration::hours(24));
        assert_eq!(summary.measurement_count, 6);
        assert!(summary.total_consumption_kwh > 0.0);
        assert!((0.0..=100.0).contains(&summary.efficiency_score));
    }

    #[test]
    fn oversized_summary_window_covers_all_history() {
        let (engine, clock, _) = engine();
        let mut meter = SimulatedMeter::new(&engine.config());
        for _ in 0..3 {
            engine.tick(&mut meter);
            clock.advance(Duration::hours(1));
        }
        let summary = engine.summary(Duration::hours(100_000_000_000));
        assert_eq!(summary.window_start, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(summary.measurement_count, 3);

        let summary = engine.summary(Duration::MAX);
        assert_eq!(summary.window_start, DateTime::<Utc>::UNIX_EPOCH);
    }
}
