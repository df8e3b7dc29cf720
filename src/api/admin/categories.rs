//! Category management

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use crate::api::auth::AdminUser;
use crate::api::{DeleteResponse, invalidate};
use crate::app::AppState;
use crate::db::{CategoryRecord, CategoryWithCount, CreateCategory, UpdateCategory};
use crate::error::{ApiError, ApiResult};
use crate::services::cache::families;

async fn list_categories(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<CategoryWithCount>>> {
    Ok(Json(state.db.categories().list_with_counts().await?))
}

async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<CreateCategory>,
) -> ApiResult<(StatusCode, Json<CategoryRecord>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let category = state.db.categories().create(&input).await?;
    invalidate(&state.cache, families::CATEGORY_WRITE);
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<CategoryRecord>> {
    state
        .db
        .categories()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Category"))
}

async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateCategory>,
) -> ApiResult<Json<CategoryRecord>> {
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let category = state
        .db
        .categories()
        .update(&id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    invalidate(&state.cache, families::CATEGORY_WRITE);
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.db.categories().delete(&id).await? {
        return Err(ApiError::not_found("Category"));
    }
    invalidate(&state.cache, families::CATEGORY_WRITE);
    Ok(Json(DeleteResponse { deleted: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}
