//! Traffic analytics

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::auth::AdminUser;
use crate::app::AppState;
use crate::db::{AnalyticsTotals, DailyViews, TopVideo};
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    /// Days of daily view history (default 30)
    pub days: Option<i64>,
    /// Number of top videos (default 10)
    pub top: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub totals: AnalyticsTotals,
    pub top_videos: Vec<TopVideo>,
    pub views_per_day: Vec<DailyViews>,
}

async fn analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<AnalyticsResponse>> {
    let repo = state.db.analytics();
    let now = Utc::now();
    let days = query.days.unwrap_or(30).clamp(1, 365);
    let top = query.top.unwrap_or(10).clamp(1, 100);

    Ok(Json(AnalyticsResponse {
        totals: repo.totals(now).await?,
        top_videos: repo.top_videos(top).await?,
        views_per_day: repo.views_per_day(now, days).await?,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics", get(analytics))
}
