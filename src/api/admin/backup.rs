//! Catalog export and database snapshots

use std::path::Path;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::api::auth::AdminUser;
use crate::app::AppState;
use crate::db::SnapshotInfo;
use crate::error::ApiResult;

async fn export(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<JsonValue>> {
    Ok(Json(state.db.backup().export().await?))
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub path: String,
}

async fn snapshot(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<(StatusCode, Json<SnapshotResponse>)> {
    let path = state
        .db
        .backup()
        .snapshot(Path::new(&state.config.backup_path))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SnapshotResponse {
            path: path.display().to_string(),
        }),
    ))
}

async fn list_snapshots(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<SnapshotInfo>>> {
    Ok(Json(
        state
            .db
            .backup()
            .list_snapshots(Path::new(&state.config.backup_path))
            .await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/backup/export", get(export))
        .route("/backup/snapshot", post(snapshot))
        .route("/backup/snapshots", get(list_snapshots))
}
