//! Ad placement management

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use crate::api::auth::AdminUser;
use crate::api::{DeleteResponse, invalidate};
use crate::app::AppState;
use crate::db::{AdRecord, CreateAd, UpdateAd};
use crate::error::{ApiError, ApiResult};
use crate::services::cache::families;

fn check_required(field: &str, value: Option<&str>) -> ApiResult<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ApiError::bad_request(format!(
            "{} must not be empty",
            field
        ))),
        _ => Ok(()),
    }
}

async fn list_ads(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<AdRecord>>> {
    Ok(Json(state.db.ads().list_all().await?))
}

async fn create_ad(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<CreateAd>,
) -> ApiResult<(StatusCode, Json<AdRecord>)> {
    check_required("name", Some(&input.name))?;
    check_required("position", Some(&input.position))?;
    let ad = state.db.ads().create(&input).await?;
    invalidate(&state.cache, families::AD_WRITE);
    Ok((StatusCode::CREATED, Json(ad)))
}

async fn get_ad(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<AdRecord>> {
    state
        .db
        .ads()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ad"))
}

async fn update_ad(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateAd>,
) -> ApiResult<Json<AdRecord>> {
    check_required("name", input.name.as_deref())?;
    check_required("position", input.position.as_deref())?;
    let ad = state
        .db
        .ads()
        .update(&id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found("Ad"))?;
    invalidate(&state.cache, families::AD_WRITE);
    Ok(Json(ad))
}

async fn delete_ad(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.db.ads().delete(&id).await? {
        return Err(ApiError::not_found("Ad"));
    }
    invalidate(&state.cache, families::AD_WRITE);
    Ok(Json(DeleteResponse { deleted: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ads", get(list_ads).post(create_ad))
        .route("/ads/{id}", get(get_ad).put(update_ad).delete(delete_ad))
}
