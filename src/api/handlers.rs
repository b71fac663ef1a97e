//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Duration;

use super::AppState;
use super::types::{ErrorResponse, LimitQuery, StatusResponse, SummaryQuery};
use crate::dispatch::demand_response::{DemandResponseEvent, DrNotification};
use crate::dispatch::kpi::ReportSummary;
use crate::dispatch::types::{EnergyMeasurement, OptimizationResult};
use crate::error::EngineError;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn engine_error(e: &EngineError) -> ApiError {
    let status = match e {
        EngineError::UnknownEvent(_) | EngineError::NoPlan => StatusCode::NOT_FOUND,
        EngineError::InvalidEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// `GET /status` → 200 + `StatusResponse`
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let engine = &state.engine;
    Json(StatusResponse {
        facility: engine.config().facility.name.clone(),
        config_revision: engine.config_revision(),
        consecutive_failures: engine.consecutive_failures(),
        alert: engine.alert_active(),
        latest_measurement_at: engine.latest_measurement().map(|m| m.timestamp),
        latest_plan_at: engine.latest_plan().map(|p| p.timestamp),
        storage: engine.storage_state(),
    })
}

/// `GET /measurements?limit=N` → 200 + up to N most recent measurements
pub async fn get_measurements(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<EnergyMeasurement>> {
    Json(state.engine.recent_measurements(query.limit()))
}

/// `GET /plans?limit=N` → 200 + up to N most recent plans
pub async fn get_plans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<OptimizationResult>> {
    let plans = state
        .engine
        .recent_plans(query.limit())
        .iter()
        .map(|p| OptimizationResult::clone(p))
        .collect();
    Json(plans)
}

/// `GET /plans/latest` → 200 + plan, or 404 before the first plan
pub async fn get_latest_plan(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OptimizationResult>, ApiError> {
    state
        .engine
        .latest_plan()
        .map(|p| Json(OptimizationResult::clone(&p)))
        .ok_or_else(|| engine_error(&EngineError::NoPlan))
}

/// `GET /dr-events` → 200 + retained events, oldest first
pub async fn get_dr_events(State(state): State<Arc<AppState>>) -> Json<Vec<DemandResponseEvent>> {
    Json(state.engine.dr_events())
}

/// `GET /dr-events/{id}` → 200 + event, or 404
pub async fn get_dr_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DemandResponseEvent>, ApiError> {
    state
        .engine
        .dr_event(&id)
        .map(Json)
        .map_err(|e| engine_error(&e))
}

/// `POST /dr-events` → 201 + registered event, or 422 for a bad notification
pub async fn post_dr_event(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<DrNotification>,
) -> Result<(StatusCode, Json<DemandResponseEvent>), ApiError> {
    state
        .engine
        .notify_dr_event(notification)
        .map(|event| (StatusCode::CREATED, Json(event)))
        .map_err(|e| engine_error(&e))
}

/// `GET /summary?hours=N` → 200 + `ReportSummary`; `hours` must be > 0 and fit a `Duration`
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<ReportSummary>, ApiError> {
    let hours = query.hours.unwrap_or(24);
    let window = Duration::try_hours(hours).filter(|_| hours > 0).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("`hours` ({hours}) must be > 0 and a representable duration"),
        )
    })?;
    Ok(Json(state.engine.summary(window)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header};
    use chrono::{TimeZone, Utc};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::config::FacilityConfig;
    use crate::dispatch::clock::ManualClock;
    use crate::dispatch::engine::DispatchEngine;
    use crate::dispatch::executor::RecordingActuators;
    use crate::meter::SimulatedMeter;

    fn make_test_state(ticks: usize) -> Arc<AppState> {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cfg = FacilityConfig::baseline();
        let mut meter = SimulatedMeter::new(&cfg);
        let engine = DispatchEngine::with_forecast_generator(
            cfg,
            Arc::new(RecordingActuators::new()),
            clock.clone(),
        )
        .unwrap();
        for _ in 0..ticks {
            engine.tick(&mut meter);
            clock.advance(Duration::hours(1));
        }
        Arc::new(AppState {
            engine: Arc::new(engine),
        })
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(state, req).await
    }

    async fn post_json(state: &Arc<AppState>, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(state, req).await
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn status_reports_revision() {
        let state = make_test_state(2);
        let (status, json) = get(&state, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["config_revision"], 1);
        assert_eq!(json["alert"], false);
        assert!(json["latest_plan_at"].is_string());
    }

    #[tokio::test]
    async fn measurements_respect_limit() {
        let state = make_test_state(5);
        let (status, json) = get(&state, "/measurements?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(3));

        let (_, all) = get(&state, "/measurements").await;
        assert_eq!(all.as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn latest_plan_404_before_first_cycle() {
        let state = make_test_state(0);
        let (status, json) = get(&state, "/plans/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json.get("error").is_some());
    }

    #[tokio::test]
    async fn plans_have_full_horizon() {
        let state = make_test_state(3);
        let (status, json) = get(&state, "/plans/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hours"].as_array().map(Vec::len), Some(24));

        let (_, plans) = get(&state, "/plans?limit=2").await;
        assert_eq!(plans.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn dr_event_roundtrip() {
        let state = make_test_state(3);
        let body = r#"{
            "id": "utility-7",
            "event_type": "peak_reduction",
            "start": "2024-07-01T03:00:00Z",
            "end": "2024-07-01T05:00:00Z",
            "target_reduction_kw": 20.0
        }"#;
        let (status, created) = post_json(&state, "/dr-events", body).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "active");

        let (status, fetched) = get(&state, "/dr-events/utility-7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], "utility-7");

        let (_, list) = get(&state, "/dr-events").await;
        assert_eq!(list.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_dr_event_is_404() {
        let state = make_test_state(1);
        let (status, _) = get(&state, "/dr-events/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn expired_dr_window_is_422() {
        let state = make_test_state(3);
        let body = r#"{
            "event_type": "economic",
            "start": "2024-06-30T10:00:00Z",
            "end": "2024-06-30T12:00:00Z",
            "target_reduction_kw": 20.0
        }"#;
        let (status, json) = post_json(&state, "/dr-events", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().unwrap_or("").contains("ended"));
    }

    #[tokio::test]
    async fn summary_rejects_non_positive_window() {
        let state = make_test_state(2);
        let (status, _) = get(&state, "/summary?hours=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = get(&state, "/summary?hours=24").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["measurement_count"], 2);
    }

    #[tokio::test]
    async fn summary_handles_huge_windows() {
        let state = make_test_state(2);
        let (status, json) = get(&state, "/summary?hours=100000000000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["measurement_count"], 2);

        let (status, _) = get(&state, &format!("/summary?hours={}", i64::MAX)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
