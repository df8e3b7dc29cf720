//! Model (performer) management

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use crate::api::auth::AdminUser;
use crate::api::{DeleteResponse, Pagination, invalidate};
use crate::app::AppState;
use crate::db::{CreateModel, ModelRecord, ModelWithCount, Page, UpdateModel};
use crate::error::{ApiError, ApiResult};
use crate::services::cache::families;

#[derive(Debug, Default, Deserialize)]
pub struct AdminModelQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

async fn list_models(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AdminModelQuery>,
) -> ApiResult<Json<Page<ModelWithCount>>> {
    let p = Pagination {
        page: query.page,
        limit: query.limit,
    };
    Ok(Json(
        state
            .db
            .models()
            .list(query.q.as_deref(), p.limit(), p.offset())
            .await?,
    ))
}

async fn create_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<CreateModel>,
) -> ApiResult<(StatusCode, Json<ModelRecord>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let model = state.db.models().create(&input).await?;
    invalidate(&state.cache, families::MODEL_WRITE);
    Ok((StatusCode::CREATED, Json(model)))
}

async fn get_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ModelRecord>> {
    state
        .db
        .models()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Model"))
}

async fn update_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateModel>,
) -> ApiResult<Json<ModelRecord>> {
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let model = state
        .db
        .models()
        .update(&id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found("Model"))?;
    invalidate(&state.cache, families::MODEL_WRITE);
    Ok(Json(model))
}

async fn delete_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.db.models().delete(&id).await? {
        return Err(ApiError::not_found("Model"));
    }
    invalidate(&state.cache, families::MODEL_WRITE);
    Ok(Json(DeleteResponse { deleted: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models).post(create_model))
        .route(
            "/models/{id}",
            get(get_model).put(update_model).delete(delete_model),
        )
}
