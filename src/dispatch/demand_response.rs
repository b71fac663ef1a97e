//! Demand-response event lifecycle and load selection.
//!
//! Each event moves `Scheduled → Active → {Compliant, Partial, NonCompliant}`.
//! Events are only mutated while their window is open and are frozen once
//! they reach a terminal status.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CurtailableLoad, DemandResponseConfig, FacilityConfig, LoadCategory};
use crate::dispatch::executor::{ActuatorCommand, DispatchExecutor};
use crate::dispatch::types::EnergyMeasurement;
use crate::error::{EngineError, Result};

/// Kind of DR call issued by the utility or aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrEventType {
    Economic,
    Emergency,
    CapacityBidding,
    PeakReduction,
}

/// Lifecycle status of a DR event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Active,
    Compliant,
    Partial,
    NonCompliant,
}

impl EventStatus {
    /// Returns `true` for the frozen end states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Compliant | Self::Partial | Self::NonCompliant)
    }
}

/// External DR event notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrNotification {
    /// Caller-supplied identifier; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: DrEventType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Requested reduction (kW).
    pub target_reduction_kw: f32,
}

/// One load shed for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCurtailment {
    pub load_id: String,
    pub category: LoadCategory,
    /// Acknowledged reduction (kW).
    pub reduction_kw: f32,
    pub dispatched_at: DateTime<Utc>,
    /// Dispatch time plus the load's response time.
    pub effective_at: DateTime<Utc>,
}

/// A DR event and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandResponseEvent {
    pub id: String,
    pub event_type: DrEventType,
    pub program: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub target_reduction_kw: f32,
    /// Sum of acknowledged curtailments (kW).
    pub actual_reduction_kw: f32,
    /// `actual_reduction_kw / target_reduction_kw`.
    pub participation_rate: f32,
    /// `actual × incentive rate × duration hours` ($), set at completion.
    pub incentive_earned: f32,
    pub status: EventStatus,
    pub curtailments: Vec<LoadCurtailment>,
    /// Loads whose curtailment command was not acknowledged.
    pub failed_loads: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DemandResponseEvent {
    /// Event window length in hours.
    pub fn duration_hours(&self) -> f32 {
        (self.end - self.start).num_seconds() as f32 / 3600.0
    }

    /// Ids of every load curtailed for this event.
    pub fn curtailed_load_ids(&self) -> Vec<&str> {
        self.curtailments.iter().map(|c| c.load_id.as_str()).collect()
    }

    fn refresh_participation(&mut self) {
        self.actual_reduction_kw = self.curtailments.iter().map(|c| c.reduction_kw).sum();
        self.participation_rate = if self.target_reduction_kw > 0.0 {
            self.actual_reduction_kw / self.target_reduction_kw
        } else {
            1.0
        };
    }
}

/// A curtailment currently held by an active event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCurtailment {
    pub event_id: String,
    pub load_id: String,
    pub reduction_kw: f32,
}

/// Classifies an event by its participation rate.
///
/// `>= compliant_ratio` is compliant, `>= partial_ratio` partial, anything
/// lower non-compliant.
pub fn classify(participation_rate: f32, program: &DemandResponseConfig) -> EventStatus {
    if participation_rate >= program.compliant_ratio {
        EventStatus::Compliant
    } else if participation_rate >= program.partial_ratio {
        EventStatus::Partial
    } else {
        EventStatus::NonCompliant
    }
}

/// Tracks DR events and the loads curtailed for them.
#[derive(Debug, Clone)]
pub struct DemandResponseManager {
    events: VecDeque<DemandResponseEvent>,
    capacity: usize,
    last_curtailed: HashMap<String, DateTime<Utc>>,
    next_seq: u64,
}

impl DemandResponseManager {
    /// Creates a manager retaining at most `capacity` finished events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            last_curtailed: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Registers an event notification.
    ///
    /// The event activates immediately if its window has already started, so
    /// curtailments go out without waiting for the next control tick.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidEvent`] for an empty or past window, a
    /// negative or non-finite target, or a duplicate id.
    pub fn notify(
        &mut self,
        notification: DrNotification,
        config: &FacilityConfig,
        measurement: Option<&EnergyMeasurement>,
        executor: &DispatchExecutor,
        now: DateTime<Utc>,
    ) -> Result<DemandResponseEvent> {
        if notification.end <= notification.start {
            return Err(EngineError::InvalidEvent("window end must be after start".into()));
        }
        if notification.end <= now {
            return Err(EngineError::InvalidEvent("window has already ended".into()));
        }
        let target = notification.target_reduction_kw;
        if !target.is_finite() || target < 0.0 {
            return Err(EngineError::InvalidEvent(format!(
                "target reduction {target} kW must be finite and >= 0"
            )));
        }

        let id = match notification.id {
            Some(id) => id,
            None => self.generate_id(),
        };
        if self.event(&id).is_some() {
            return Err(EngineError::InvalidEvent(format!("duplicate event id \"{id}\"")));
        }

        let mut event = DemandResponseEvent {
            id,
            event_type: notification.event_type,
            program: config.demand_response.program_name.clone(),
            start: notification.start,
            end: notification.end,
            target_reduction_kw: target,
            actual_reduction_kw: 0.0,
            participation_rate: 0.0,
            incentive_earned: 0.0,
            status: EventStatus::Scheduled,
            curtailments: Vec::new(),
            failed_loads: Vec::new(),
            completed_at: None,
        };
        info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            target_kw = target,
            start = %event.start,
            end = %event.end,
            "DR event registered"
        );

        if event.start <= now {
            activate(&mut event, &mut self.last_curtailed, config, measurement, executor, now);
        }

        let snapshot = event.clone();
        self.events.push_back(event);
        self.evict();
        Ok(snapshot)
    }

    /// Advances every event to the state implied by `now`.
    ///
    /// Returns the events that reached a terminal status during this call.
    pub fn poll(
        &mut self,
        config: &FacilityConfig,
        measurement: Option<&EnergyMeasurement>,
        executor: &DispatchExecutor,
        now: DateTime<Utc>,
    ) -> Vec<DemandResponseEvent> {
        let mut finished = Vec::new();
        for event in &mut self.events {
            if event.status == EventStatus::Scheduled && event.start <= now && now < event.end {
                activate(event, &mut self.last_curtailed, config, measurement, executor, now);
            }
            if !event.status.is_terminal() && event.end <= now {
                complete(event, &config.demand_response, executor, now);
                finished.push(event.clone());
            }
        }
        self.evict();
        finished
    }

    /// Curtailments held by currently active events.
    pub fn active_curtailments(&self) -> Vec<ActiveCurtailment> {
        self.events
            .iter()
            .filter(|e| e.status == EventStatus::Active)
            .flat_map(|e| {
                e.curtailments.iter().map(|c| ActiveCurtailment {
                    event_id: e.id.clone(),
                    load_id: c.load_id.clone(),
                    reduction_kw: c.reduction_kw,
                })
            })
            .collect()
    }

    pub fn event(&self, id: &str) -> Option<&DemandResponseEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &DemandResponseEvent> {
        self.events.iter()
    }

    fn generate_id(&mut self) -> String {
        loop {
            let id = format!("dr-{}", self.next_seq);
            self.next_seq += 1;
            if self.event(&id).is_none() {
                return id;
            }
        }
    }

    /// Drops the oldest finished events beyond capacity.
    ///
    /// Scheduled and active events are never dropped.
    fn evict(&mut self) {
        let mut excess = self.events.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        self.events.retain(|e| {
            if excess > 0 && e.status.is_terminal() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

/// Selects and dispatches curtailments for an event entering its window.
///
/// Loads are taken by ascending priority tier, then ascending curtailment
/// cost, until the target is met. A load is skipped while inside its minimum
/// interval since its last curtailment.
fn activate(
    event: &mut DemandResponseEvent,
    last_curtailed: &mut HashMap<String, DateTime<Utc>>,
    config: &FacilityConfig,
    measurement: Option<&EnergyMeasurement>,
    executor: &DispatchExecutor,
    now: DateTime<Utc>,
) {
    event.status = EventStatus::Active;

    let mut loads: Vec<&CurtailableLoad> = config.curtailable_loads.iter().collect();
    loads.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.curtailment_cost_per_kwh.total_cmp(&b.curtailment_cost_per_kwh))
    });

    let mut remaining = event.target_reduction_kw;
    for load in loads {
        if remaining <= 0.0 {
            break;
        }
        let rested = last_curtailed.get(&load.id).is_none_or(|last| {
            now - *last >= Duration::minutes(i64::from(load.min_interval_minutes))
        });
        if !rested {
            debug!(event_id = %event.id, load_id = %load.id, "load inside minimum interval, skipped");
            continue;
        }

        let measured_kw = measurement.map_or(0.0, |m| m.loads.category_kw(load.category));
        let available = (measured_kw * load.max_curtailment_fraction()).max(0.0);
        if available <= 0.0 {
            continue;
        }
        let reduction_kw = available.min(remaining);

        let command = ActuatorCommand::Curtail {
            load_id: load.id.clone(),
            reduction_kw,
        };
        match executor.send(&command) {
            Ok(()) => {
                remaining -= reduction_kw;
                last_curtailed.insert(load.id.clone(), now);
                event.curtailments.push(LoadCurtailment {
                    load_id: load.id.clone(),
                    category: load.category,
                    reduction_kw,
                    dispatched_at: now,
                    effective_at: now + Duration::minutes(i64::from(load.response_time_minutes)),
                });
            }
            Err(e) => {
                warn!(event_id = %event.id, load_id = %load.id, reason = %e.reason, "curtailment not acknowledged");
                event.failed_loads.push(load.id.clone());
            }
        }
    }

    event.refresh_participation();
    info!(
        event_id = %event.id,
        loads = event.curtailments.len(),
        actual_kw = event.actual_reduction_kw,
        target_kw = event.target_reduction_kw,
        "DR event active"
    );
}

/// Closes an event: classifies it, settles the incentive, restores loads.
fn complete(
    event: &mut DemandResponseEvent,
    program: &DemandResponseConfig,
    executor: &DispatchExecutor,
    now: DateTime<Utc>,
) {
    event.refresh_participation();
    event.status = classify(event.participation_rate, program);
    event.incentive_earned =
        event.actual_reduction_kw * program.incentive_rate_per_kwh * event.duration_hours();
    event.completed_at = Some(now);

    for curtailment in &event.curtailments {
        let command = ActuatorCommand::Restore {
            load_id: curtailment.load_id.clone(),
        };
        if let Err(e) = executor.send(&command) {
            warn!(event_id = %event.id, load_id = %curtailment.load_id, reason = %e.reason, "restore not acknowledged");
        }
    }

    info!(
        event_id = %event.id,
        status = ?event.status,
        participation = event.participation_rate,
        incentive = event.incentive_earned,
        "DR event completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::executor::RecordingActuators;
    use crate::dispatch::types::LoadBreakdown;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap()
    }

    fn measurement() -> EnergyMeasurement {
        EnergyMeasurement {
            timestamp: t(14),
            total_power_kw: 520.0,
            active_power_kw: 510.0,
            reactive_power_kvar: 80.0,
            power_factor: 0.98,
            frequency_hz: 60.0,
            voltage_v: 480.0,
            loads: LoadBreakdown {
                lighting_kw: 300.0,
                hvac_kw: 140.0,
                pumps_kw: 40.0,
                process_kw: 25.0,
                auxiliary_kw: 15.0,
            },
            solar_kw: 120.0,
            wind_kw: 0.0,
            battery_soc: 0.5,
            battery_power_kw: 0.0,
            grid_import_kw: 400.0,
            grid_export_kw: 0.0,
            electricity_rate: 0.12,
            cost_to_date: 0.0,
            peak_demand_today_kw: 520.0,
            carbon_intensity: 0.4,
            renewable_share: 0.23,
        }
    }

    fn notification(target: f32, start: u32, end: u32) -> DrNotification {
        DrNotification {
            id: None,
            event_type: DrEventType::PeakReduction,
            start: t(start),
            end: t(end),
            target_reduction_kw: target,
        }
    }

    fn setup() -> (Arc<RecordingActuators>, DispatchExecutor) {
        let actuators = Arc::new(RecordingActuators::new());
        let executor = DispatchExecutor::new(actuators.clone());
        (actuators, executor)
    }

    #[test]
    fn classification_thresholds() {
        let program = DemandResponseConfig::default();
        assert_eq!(classify(95.0 / 100.0, &program), EventStatus::Compliant);
        assert_eq!(classify(60.0 / 100.0, &program), EventStatus::Partial);
        assert_eq!(classify(40.0 / 100.0, &program), EventStatus::NonCompliant);
        assert_eq!(classify(0.9, &program), EventStatus::Compliant);
        assert_eq!(classify(0.5, &program), EventStatus::Partial);
    }

    #[test]
    fn selects_by_priority_then_cost() {
        let cfg = FacilityConfig::baseline();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let m = measurement();

        // pumps (tier 0) give 20 kW, lighting (tier 1) 60 kW, HVAC (tier 2) 21 kW
        let event = mgr
            .notify(notification(70.0, 14, 16), &cfg, Some(&m), &executor, t(14))
            .unwrap();
        assert_eq!(event.status, EventStatus::Active);
        assert_eq!(event.curtailed_load_ids(), vec!["irrigation_pumps", "lighting"]);
        assert!((event.curtailments[0].reduction_kw - 20.0).abs() < 1e-4);
        assert!((event.curtailments[1].reduction_kw - 50.0).abs() < 1e-4);
        assert!((event.actual_reduction_kw - 70.0).abs() < 1e-4);
        assert!((event.participation_rate - 1.0).abs() < 1e-5);
    }

    #[test]
    fn records_effective_time_from_response_time() {
        let cfg = FacilityConfig::baseline();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let event = mgr
            .notify(notification(10.0, 14, 15), &cfg, Some(&measurement()), &executor, t(14))
            .unwrap();
        let c = &event.curtailments[0];
        assert_eq!(c.effective_at - c.dispatched_at, Duration::minutes(2));
    }

    #[test]
    fn completes_and_restores_loads() {
        let cfg = FacilityConfig::baseline();
        let (actuators, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let m = measurement();
        mgr.notify(notification(100.0, 14, 16), &cfg, Some(&m), &executor, t(14))
            .unwrap();
        assert_eq!(mgr.active_curtailments().len(), 3);

        assert!(mgr.poll(&cfg, Some(&m), &executor, t(15)).is_empty());
        let done = mgr.poll(&cfg, Some(&m), &executor, t(16));
        assert_eq!(done.len(), 1);
        let event = &done[0];
        // 20 + 60 + 21 = 101 kW available, capped at the 100 kW target
        assert_eq!(event.status, EventStatus::Compliant);
        assert!((event.actual_reduction_kw - 100.0).abs() < 1e-3);
        // 100 kW * $0.20 * 2 h
        assert!((event.incentive_earned - 40.0).abs() < 1e-2);
        assert!(mgr.active_curtailments().is_empty());

        let restores = actuators
            .commands()
            .into_iter()
            .filter(|c| matches!(c, ActuatorCommand::Restore { .. }))
            .count();
        assert_eq!(restores, 3);
    }

    #[test]
    fn zero_capacity_completes_non_compliant() {
        let cfg = FacilityConfig::no_flex();
        let (actuators, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let event = mgr
            .notify(notification(50.0, 14, 15), &cfg, Some(&measurement()), &executor, t(14))
            .unwrap();
        assert_eq!(event.actual_reduction_kw, 0.0);

        let done = mgr.poll(&cfg, None, &executor, t(15));
        assert_eq!(done[0].status, EventStatus::NonCompliant);
        assert_eq!(done[0].actual_reduction_kw, 0.0);
        assert_eq!(done[0].incentive_earned, 0.0);
        assert!(actuators.commands().is_empty());
    }

    #[test]
    fn future_event_waits_for_window() {
        let cfg = FacilityConfig::baseline();
        let (actuators, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let m = measurement();
        let event = mgr
            .notify(notification(30.0, 16, 18), &cfg, Some(&m), &executor, t(14))
            .unwrap();
        assert_eq!(event.status, EventStatus::Scheduled);
        assert!(actuators.commands().is_empty());

        mgr.poll(&cfg, Some(&m), &executor, t(16));
        let id = event.id.clone();
        assert_eq!(mgr.event(&id).map(|e| e.status), Some(EventStatus::Active));
    }

    #[test]
    fn failed_curtailment_not_counted() {
        let cfg = FacilityConfig::baseline();
        let (actuators, executor) = setup();
        actuators.fail_command("curtail_load");
        let mut mgr = DemandResponseManager::new(16);
        let event = mgr
            .notify(notification(50.0, 14, 15), &cfg, Some(&measurement()), &executor, t(14))
            .unwrap();
        assert_eq!(event.actual_reduction_kw, 0.0);
        assert_eq!(event.failed_loads.len(), 3);
        let dispatched: f32 = event.curtailments.iter().map(|c| c.reduction_kw).sum();
        assert!(event.actual_reduction_kw <= dispatched);
    }

    #[test]
    fn min_interval_skips_recent_load() {
        let cfg = FacilityConfig::baseline();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let m = measurement();
        mgr.notify(notification(10.0, 14, 15), &cfg, Some(&m), &executor, t(14))
            .unwrap();
        mgr.poll(&cfg, Some(&m), &executor, t(15));

        // pumps (60 min interval) were curtailed at 14:00; at 14:30 they rest
        let at = t(14) + Duration::minutes(30);
        let later = DrNotification {
            start: at,
            ..notification(10.0, 14, 16)
        };
        let event = mgr.notify(later, &cfg, Some(&m), &executor, at).unwrap();
        assert_eq!(event.curtailed_load_ids(), vec!["lighting"]);
    }

    #[test]
    fn rejects_bad_notifications() {
        let cfg = FacilityConfig::baseline();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        let m = measurement();
        assert!(matches!(
            mgr.notify(notification(10.0, 15, 14), &cfg, Some(&m), &executor, t(13)),
            Err(EngineError::InvalidEvent(_))
        ));
        assert!(matches!(
            mgr.notify(notification(-5.0, 14, 15), &cfg, Some(&m), &executor, t(13)),
            Err(EngineError::InvalidEvent(_))
        ));
        assert!(matches!(
            mgr.notify(notification(10.0, 10, 12), &cfg, Some(&m), &executor, t(13)),
            Err(EngineError::InvalidEvent(_))
        ));

        let named = DrNotification {
            id: Some("utility-7".into()),
            ..notification(10.0, 14, 15)
        };
        assert!(mgr.notify(named.clone(), &cfg, Some(&m), &executor, t(13)).is_ok());
        assert!(mgr.notify(named, &cfg, Some(&m), &executor, t(13)).is_err());
    }

    #[test]
    fn zero_target_counts_as_full_participation() {
        let cfg = FacilityConfig::baseline();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(16);
        mgr.notify(notification(0.0, 14, 15), &cfg, None, &executor, t(14))
            .unwrap();
        let done = mgr.poll(&cfg, None, &executor, t(15));
        assert_eq!(done[0].status, EventStatus::Compliant);
    }

    #[test]
    fn finished_events_evicted_past_capacity() {
        let cfg = FacilityConfig::no_flex();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(2);
        for i in 0..4 {
            mgr.notify(notification(10.0, 10 + i, 11 + i), &cfg, None, &executor, t(10 + i))
                .unwrap();
            mgr.poll(&cfg, None, &executor, t(11 + i));
        }
        assert_eq!(mgr.events().count(), 2);
        assert!(mgr.event("dr-4").is_some());
        assert!(mgr.event("dr-1").is_none());
    }
    #[test]
    fn pending_event_does_not_block_eviction() {
        let cfg = FacilityConfig::no_flex();
        let (_, executor) = setup();
        let mut mgr = DemandResponseManager::new(2);
        let pending = DrNotification {
            id: Some("late".into()),
            ..notification(10.0, 22, 23)
        };
        mgr.notify(pending, &cfg, None, &executor, t(10)).unwrap();

        for i in 0..5 {
            mgr.notify(notification(10.0, 10 + i, 11 + i), &cfg, None, &executor, t(10 + i))
                .unwrap();
            mgr.poll(&cfg, None, &executor, t(11 + i));
        }
        assert_eq!(mgr.events().count(), 2);
        assert_eq!(
            mgr.event("late").map(|e| e.status),
            Some(EventStatus::Scheduled)
        );
        assert!(mgr.event("dr-5").is_some());
        assert!(mgr.event("dr-4").is_none());
    }
}
