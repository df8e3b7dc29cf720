//! REST API route definitions
//!
//! Public read endpoints are served through the response cache; admin
//! writes invalidate the cache families they touch.

pub mod admin;
pub mod auth;
pub mod health;
pub mod public;

use std::future::Future;

use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::cache::SharedCache;

pub const DEFAULT_PAGE_SIZE: i64 = 24;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Routes mounted under `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(public::router())
        .nest("/auth", auth::router())
        .nest("/admin", admin::router())
}

/// `?page=&limit=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// Serve `key` from the cache, computing it with `producer` on a miss.
/// Errors are returned to the caller and never cached.
pub async fn cached<T, F, Fut>(cache: &SharedCache, key: &str, producer: F) -> ApiResult<JsonValue>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    cache
        .get_or_set(key, None, || async move {
            let value = producer().await?;
            serde_json::to_value(value).map_err(|e| ApiError::Internal(e.into()))
        })
        .await
}

/// Invalidate every pattern of a write family and log the count
pub fn invalidate(cache: &SharedCache, family: &[&str]) -> usize {
    let removed = cache.invalidate_all(family);
    tracing::debug!(patterns = ?family, removed, "Invalidated cache entries");
    removed
}
