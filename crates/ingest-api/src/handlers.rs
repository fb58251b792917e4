use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingest_domain::{JobRunId, JobRunStatus, ScheduleId};
use ingest_store::{validate_cron, JobRunFilter, NewSchedule, ScheduleFilter};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{validation_errors_response, ApiError};
use crate::state::AppState;

fn parse_uuid<T: From<Uuid>>(raw: &str, kind: &str) -> Result<T, ApiError> {
    Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|_| ApiError::bad_request(format!("invalid {kind} id: {raw}")))
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.schedule_store.list_schedules(ScheduleFilter { limit: 1, ..Default::default() }).await?;
    Ok(StatusCode::OK)
}

// ── Schedules ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateScheduleBody {
    pub name: String,
    pub plugin_id: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    pub cron_expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn masked_schedule(schedule: ingest_domain::Schedule, spec: &ingest_domain::ConfigSpec) -> Value {
    let config = serde_json::to_value(&schedule.config).unwrap_or_default();
    let masked = ingest_config::mask_sensitive_fields(&config, spec);
    json!({
        "id": schedule.id,
        "name": schedule.name,
        "plugin_id": schedule.plugin_id,
        "config": masked,
        "cron_expression": schedule.cron_expression,
        "enabled": schedule.enabled,
        "next_run_at": schedule.next_run_at,
        "last_run_at": schedule.last_run_at,
        "created_by": schedule.created_by,
        "created_at": schedule.created_at,
        "updated_at": schedule.updated_at,
    })
}

async fn encrypt_schedule_config(
    state: &AppState,
    plugin_id: &str,
    config: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>, ApiError> {
    let source = state.registry.get_source(plugin_id).await?;
    let raw = serde_json::to_value(config).unwrap_or_default();
    let sensitive_paths: Vec<String> =
        source.meta().config_spec.walk().into_iter().filter(|(_, f)| f.sensitive).map(|(p, _)| p).collect();

    let stored = if sensitive_paths.is_empty() {
        raw
    } else {
        let encryptor = state
            .encryptor
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("this plugin has sensitive fields but no ENCRYPTION_KEY is configured"))?;
        ingest_secrets::encrypt_map(encryptor, &raw, &sensitive_paths)
            .map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    Ok(stored.as_object().cloned().unwrap_or_default().into_iter().collect())
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(body): Json<CreateScheduleBody>,
) -> Result<Response, ApiError> {
    validate_cron(&body.cron_expression).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let source = state.registry.get_source(&body.plugin_id).await?;

    let raw = serde_json::to_value(&body.config).unwrap_or_default();
    if let Err(errors) = ingest_config::validate_config(&raw, &source.meta().config_spec) {
        return Ok(validation_errors_response(errors));
    }

    let stored_config = encrypt_schedule_config(&state, &body.plugin_id, &body.config).await?;

    let schedule = state
        .schedule_store
        .create_schedule(NewSchedule {
            name: body.name,
            plugin_id: body.plugin_id,
            config: stored_config,
            cron_expression: body.cron_expression,
            enabled: body.enabled,
            created_by: None,
        })
        .await?;

    Ok(Json(masked_schedule(schedule, &source.meta().config_spec)).into_response())
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: ScheduleId = parse_uuid(&id, "schedule")?;
    let schedule = state.schedule_store.get_schedule(id).await?;
    let spec = match state.registry.get_source(&schedule.plugin_id).await {
        Ok(s) => s.meta().config_spec,
        Err(_) => ingest_domain::ConfigSpec::default(),
    };
    Ok(Json(masked_schedule(schedule, &spec)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleBody {
    pub name: Option<String>,
    pub config: Option<HashMap<String, Value>>,
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateScheduleBody>,
) -> Result<Json<Value>, ApiError> {
    let id: ScheduleId = parse_uuid(&id, "schedule")?;
    let mut schedule = state.schedule_store.get_schedule(id).await?;

    if let Some(name) = body.name {
        schedule.name = name;
    }
    if let Some(cron) = body.cron_expression {
        validate_cron(&cron).map_err(|e| ApiError::bad_request(e.to_string()))?;
        schedule.cron_expression = cron;
    }
    if let Some(enabled) = body.enabled {
        schedule.enabled = enabled;
    }
    if let Some(config) = body.config {
        schedule.config = encrypt_schedule_config(&state, &schedule.plugin_id, &config).await?;
    }

    let updated = state.schedule_store.update_schedule(schedule).await?;
    let spec = state.registry.get_source(&updated.plugin_id).await?.meta().config_spec;
    Ok(Json(masked_schedule(updated, &spec)))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ScheduleId = parse_uuid(&id, "schedule")?;
    state.schedule_store.delete_schedule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Default)]
pub struct ListSchedulesQuery {
    pub enabled: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(q): Query<ListSchedulesQuery>,
) -> Result<Json<Value>, ApiError> {
    let schedules = state
        .schedule_store
        .list_schedules(ScheduleFilter { enabled: q.enabled, limit: q.limit.unwrap_or(50), offset: q.offset.unwrap_or(0) })
        .await?;

    let mut out = Vec::with_capacity(schedules.len());
    for schedule in schedules {
        let spec = match state.registry.get_source(&schedule.plugin_id).await {
            Ok(s) => s.meta().config_spec,
            Err(_) => ingest_domain::ConfigSpec::default(),
        };
        out.push(masked_schedule(schedule, &spec));
    }
    Ok(Json(json!(out)))
}

pub async fn run_schedule_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: ScheduleId = parse_uuid(&id, "schedule")?;
    // Validate the schedule exists before enqueueing; create_job_run itself
    // doesn't check.
    state.schedule_store.get_schedule(id).await?;
    let job_run = state.schedule_store.create_job_run(Some(id), None).await?;
    Ok(Json(json!(job_run)))
}

// ── Jobs ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListJobsQuery {
    pub schedule_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<Value>, ApiError> {
    let schedule_id = q
        .schedule_id
        .as_deref()
        .map(|s| parse_uuid::<ScheduleId>(s, "schedule"))
        .transpose()?;
    let status = q
        .status
        .as_deref()
        .map(|s| s.parse::<JobRunStatus>())
        .transpose()
        .map_err(ApiError::bad_request)?;

    let jobs = state
        .schedule_store
        .list_job_runs(JobRunFilter { schedule_id, status, limit: q.limit.unwrap_or(50), offset: q.offset.unwrap_or(0) })
        .await?;
    Ok(Json(json!(jobs)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: JobRunId = parse_uuid(&id, "job run")?;
    let job_run = state.schedule_store.cancel_job_run(id).await?;
    Ok(Json(json!(job_run)))
}

// ── Validate ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub plugin_id: String,
    pub config: Value,
}

pub async fn post_validate(State(state): State<AppState>, Json(body): Json<ValidateBody>) -> Result<Response, ApiError> {
    let source = state.registry.get_source(&body.plugin_id).await?;
    match ingest_config::validate_config(&body.config, &source.meta().config_spec) {
        Ok(_) => Ok(Json(json!({ "valid": true, "errors": Vec::<ingest_domain::FieldError>::new() })).into_response()),
        Err(errors) => Ok(validation_errors_response(errors)),
    }
}

// ── Plugins ───────────────────────────────────────────────────────────────────

pub async fn list_plugins(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.registry.list().await))
}

// ── Pipeline destroy ──────────────────────────────────────────────────────────

pub async fn destroy_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let run = ingest_scheduler::destroy_pipeline(state.run_store.as_ref(), state.catalog.as_ref(), &name).await?;
    Ok(Json(json!(run)))
}
