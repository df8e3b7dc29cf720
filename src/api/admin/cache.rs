//! Response cache inspection and invalidation

use axum::{Json, Router, extract::State, routing::{get, post}};
use serde::{Deserialize, Serialize};

use crate::api::auth::AdminUser;
use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::cache::CacheStats;

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}

async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Json<CacheStats> {
    Json(state.cache.stats())
}

async fn clear(State(state): State<AppState>, _admin: AdminUser) -> Json<InvalidateResponse> {
    let removed = state.cache.len();
    state.cache.clear();
    Json(InvalidateResponse { removed })
}

async fn invalidate(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<InvalidateRequest>,
) -> ApiResult<Json<InvalidateResponse>> {
    if body.pattern.is_empty() {
        return Err(ApiError::bad_request("pattern must not be empty"));
    }
    Ok(Json(InvalidateResponse {
        removed: state.cache.invalidate(&body.pattern),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cache", get(stats).delete(clear))
        .route("/cache/invalidate", post(invalidate))
}
