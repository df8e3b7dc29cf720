//! Auto-scrape configuration and control
//!
//! Writes keep the live timer set in step with storage: an enabled config
//! is (re)scheduled with a fresh `next_run`, a disabled or deleted one has
//! its timer cleared.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::api::DeleteResponse;
use crate::api::auth::AdminUser;
use crate::app::AppState;
use crate::db::{CreateScrapeConfig, ScrapeConfigRecord, ScrapeRunRecord, UpdateScrapeConfig};
use crate::error::{ApiError, ApiResult};
use crate::services::scheduler::RunNow;

const STATUS_RUN_LIMIT: i64 = 20;

/// First tick of an enabled config, one interval from now.
/// Only called on validated input, so the interval is in range.
fn next_run_for(input: &CreateScrapeConfig) -> Option<DateTime<Utc>> {
    if !input.enabled {
        return None;
    }
    TimeDelta::try_minutes(input.interval_minutes).and_then(|d| Utc::now().checked_add_signed(d))
}

/// Persist `input` for `id` and sync the timer
async fn store_and_sync(
    state: &AppState,
    id: &str,
    input: &CreateScrapeConfig,
) -> ApiResult<ScrapeConfigRecord> {
    input.validate()?;

    let next_run = next_run_for(input);
    let config = state
        .db
        .scrape_configs()
        .update(id, input, next_run)
        .await?
        .ok_or_else(|| ApiError::not_found("Scrape config"))?;

    sync_timer(state, &config);
    Ok(config)
}

fn sync_timer(state: &AppState, config: &ScrapeConfigRecord) {
    if config.enabled {
        state.scheduler.schedule(config.clone());
    } else {
        state.scheduler.clear(&config.id);
    }
}

async fn existing(state: &AppState, id: &str) -> ApiResult<ScrapeConfigRecord> {
    state
        .db
        .scrape_configs()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Scrape config"))
}

async fn list_configs(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<ScrapeConfigRecord>>> {
    Ok(Json(state.db.scrape_configs().list().await?))
}

async fn create_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<CreateScrapeConfig>,
) -> ApiResult<(StatusCode, Json<ScrapeConfigRecord>)> {
    input.validate()?;

    let next_run = next_run_for(&input);
    let config = state.db.scrape_configs().create(&input, next_run).await?;
    sync_timer(&state, &config);

    Ok((StatusCode::CREATED, Json(config)))
}

async fn get_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ScrapeConfigRecord>> {
    Ok(Json(existing(&state, &id).await?))
}

async fn update_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateScrapeConfig>,
) -> ApiResult<Json<ScrapeConfigRecord>> {
    let current = existing(&state, &id).await?;
    let merged = input.apply_to(&current);
    Ok(Json(store_and_sync(&state, &id, &merged).await?))
}

async fn delete_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.scheduler.clear(&id);
    if !state.db.scrape_configs().delete(&id).await? {
        return Err(ApiError::not_found("Scrape config"));
    }
    Ok(Json(DeleteResponse { deleted: true }))
}

/// Enable a config and start its timer
async fn start_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ScrapeConfigRecord>> {
    let current = existing(&state, &id).await?;
    let input = UpdateScrapeConfig {
        enabled: Some(true),
        ..Default::default()
    }
    .apply_to(&current);
    Ok(Json(store_and_sync(&state, &id, &input).await?))
}

/// Disable a config and clear its timer. An in-flight tick finishes.
async fn stop_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ScrapeConfigRecord>> {
    let current = existing(&state, &id).await?;
    let input = UpdateScrapeConfig {
        enabled: Some(false),
        ..Default::default()
    }
    .apply_to(&current);
    Ok(Json(store_and_sync(&state, &id, &input).await?))
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: RunNow,
}

async fn run_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<RunResponse>)> {
    match state.scheduler.run_now(&id).await? {
        RunNow::Started => Ok((
            StatusCode::ACCEPTED,
            Json(RunResponse {
                status: RunNow::Started,
            }),
        )),
        RunNow::Busy => Err(ApiError::Conflict(
            "A scrape for this config is already running".to_string(),
        )),
        RunNow::NotFound => Err(ApiError::not_found("Scrape config")),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

async fn config_runs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<ScrapeRunRecord>>> {
    existing(&state, &id).await?;
    let limit = query.limit.unwrap_or(STATUS_RUN_LIMIT).clamp(1, 200);
    Ok(Json(
        state
            .db
            .scrape_configs()
            .recent_runs(Some(&id), limit)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

async fn reinitialize(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<CountResponse>> {
    let count = state.scheduler.initialize_from_storage().await?;
    Ok(Json(CountResponse { count }))
}

async fn clear_all(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<CountResponse>> {
    Ok(Json(CountResponse {
        count: state.scheduler.clear_all(),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub scheduled: Vec<String>,
    pub busy: Vec<String>,
    pub configs: Vec<ScrapeConfigRecord>,
    pub recent_runs: Vec<ScrapeRunRecord>,
}

async fn status(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<StatusResponse>> {
    let repo = state.db.scrape_configs();
    Ok(Json(StatusResponse {
        scheduled: state.scheduler.scheduled_ids(),
        busy: state.scheduler.busy_ids(),
        configs: repo.list().await?,
        recent_runs: repo.recent_runs(None, STATUS_RUN_LIMIT).await?,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/configs", get(list_configs).post(create_config))
        .route(
            "/configs/{id}",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/configs/{id}/start", post(start_config))
        .route("/configs/{id}/stop", post(stop_config))
        .route("/configs/{id}/run", post(run_config))
        .route("/configs/{id}/runs", get(config_runs))
        .route("/reinitialize", post(reinitialize))
        .route("/clear", post(clear_all))
        .route("/status", get(status))
}
