//! Settings management

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::api::auth::AdminUser;
use crate::api::{DeleteResponse, invalidate};
use crate::app::AppState;
use crate::db::SettingRecord;
use crate::error::{ApiError, ApiResult};
use crate::services::cache::families;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertSetting {
    pub value: JsonValue,
    pub category: Option<String>,
    pub description: Option<String>,
}

async fn list_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<SettingsQuery>,
) -> ApiResult<Json<Vec<SettingRecord>>> {
    let settings = state.db.settings();
    let records = match query.category.as_deref() {
        Some(category) => settings.list_by_category(category).await?,
        None => settings.list_all().await?,
    };
    Ok(Json(records))
}

async fn upsert_setting(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
    Json(body): Json<UpsertSetting>,
) -> ApiResult<Json<SettingRecord>> {
    if key.trim().is_empty() {
        return Err(ApiError::bad_request("key must not be empty"));
    }

    let settings = state.db.settings();
    let record = match body.category.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(category) => {
            settings
                .set_with_category(&key, &body.value, category, body.description.as_deref())
                .await?
        }
        None => settings.set(&key, &body.value).await?,
    };

    invalidate(&state.cache, families::SETTINGS_WRITE);
    Ok(Json(record))
}

async fn delete_setting(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.db.settings().delete(&key).await? {
        return Err(ApiError::not_found("Setting"));
    }
    invalidate(&state.cache, families::SETTINGS_WRITE);
    Ok(Json(DeleteResponse { deleted: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(list_settings))
        .route("/settings/{key}", put(upsert_setting).delete(delete_setting))
}
