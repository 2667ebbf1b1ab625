use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::linkedin_auth::AuthError;
use crate::scheduler::{SchedulerError, TaskPayload, TaskStatus, POST_CREATION_TASK};

use super::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({"error": message.into()})))
}

fn scheduler_error(err: SchedulerError) -> ApiError {
    let status = match &err {
        SchedulerError::DuplicateTask(_)
        | SchedulerError::InvalidSchedule { .. }
        | SchedulerError::UnknownStatus(_) => StatusCode::BAD_REQUEST,
        SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("scheduler request failed: {}", err);
    }
    api_error(status, err.to_string())
}

/// Accepts RFC 3339, or a naive ISO timestamp interpreted as UTC.
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|naive| naive.and_utc())
        })
}

pub(super) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "scheduler_running": state.scheduler.is_running(),
        "linkedin_authenticated": state.auth.has_credentials(),
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SchedulePostRequest {
    datetime: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    generate_image: Option<bool>,
}

impl SchedulePostRequest {
    fn payload(&self) -> TaskPayload {
        let mut payload = TaskPayload::new();
        for (key, value) in [
            ("content", &self.content),
            ("image", &self.image),
            ("topic", &self.topic),
            ("style", &self.style),
        ] {
            if let Some(value) = value {
                payload.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(generate_image) = self.generate_image {
            payload.insert("generate_image".to_string(), Value::Bool(generate_image));
        }
        payload
    }
}

pub(super) async fn schedule_post(
    State(state): State<AppState>,
    Json(request): Json<SchedulePostRequest>,
) -> Result<Json<Value>, ApiError> {
    let scheduled_time = parse_datetime(&request.datetime).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid datetime: {}", request.datetime),
        )
    })?;
    let task_id = Uuid::new_v4().to_string();
    let task = state
        .scheduler
        .schedule_task(task_id, POST_CREATION_TASK, scheduled_time, request.payload())
        .map_err(scheduler_error)?;

    Ok(Json(json!({
        "status": "scheduled",
        "task_id": task.id,
        "scheduled_time": task.scheduled_time,
        "message": format!("post scheduled for {}", task.scheduled_time),
    })))
}

pub(super) async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let snapshot = state
        .scheduler
        .get_task_status(&task_id)
        .map_err(scheduler_error)?;
    Ok(Json(json!(snapshot)))
}

#[derive(Debug, Deserialize)]
pub(super) struct ListTasksQuery {
    #[serde(default)]
    status: Option<String>,
}

pub(super) async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = query
        .status
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(scheduler_error)?;
    let listing = state.scheduler.list_tasks(filter).map_err(scheduler_error)?;
    Ok(Json(json!(listing)))
}

pub(super) async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .scheduler
        .cancel_task(&task_id)
        .map_err(scheduler_error)?;
    Ok(Json(json!({
        "task_id": task.id,
        "status": task.status,
        "message": format!("task {} is {}", task.id, task.status),
    })))
}

pub(super) async fn start_scheduler(State(state): State<AppState>) -> Json<Value> {
    let outcome = state.scheduler.start();
    Json(json!({"status": outcome}))
}

pub(super) async fn stop_scheduler(State(state): State<AppState>) -> Json<Value> {
    let outcome = state.scheduler.stop().await;
    Json(json!({"status": outcome}))
}

pub(super) async fn linkedin_authorize(State(state): State<AppState>) -> Response {
    let csrf_state = Uuid::new_v4().simple().to_string();
    match state.auth.authorization_url(&csrf_state) {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(err) => api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ExchangeTokenRequest {
    auth_code: String,
}

pub(super) async fn linkedin_exchange_token(
    State(state): State<AppState>,
    Json(request): Json<ExchangeTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .auth
        .exchange_code_for_token(request.auth_code.trim())
        .await
        .map_err(|err| {
            let status = match &err {
                AuthError::MissingConfig(_) => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Rejected { .. } => StatusCode::BAD_REQUEST,
                AuthError::Http(_) | AuthError::Json(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            api_error(status, err.to_string())
        })?;
    info!("LinkedIn account authorized via API");
    Ok(Json(json!({
        "status": "authenticated",
        "expires_at": record.expires_at,
    })))
}
