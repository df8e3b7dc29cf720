//! Video management

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
use crate::db::{CreateVideo, Page, UpdateVideo, VideoDetail, VideoFilter, VideoRecord, VideoSort};
use crate::error::{ApiError, ApiResult};
use crate::services::cache::families;

#[derive(Debug, Default, Deserialize)]
pub struct AdminVideoQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub sort: VideoSort,
}

/// All videos, published or not
async fn list_videos(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AdminVideoQuery>,
) -> ApiResult<Json<Page<VideoRecord>>> {
    let p = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let filter = VideoFilter {
        category: query.category,
        model: query.model,
        search: query.q.filter(|q| !q.trim().is_empty()),
        sort: query.sort,
        limit: p.limit(),
        offset: p.offset(),
        ..Default::default()
    };
    Ok(Json(state.db.videos().list(&filter).await?))
}

async fn create_video(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<CreateVideo>,
) -> ApiResult<(StatusCode, Json<VideoRecord>)> {
    if input.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    let video = state.db.videos().create(&input).await?;
    invalidate(&state.cache, families::VIDEO_WRITE);
    Ok((StatusCode::CREATED, Json(video)))
}

async fn get_video(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoDetail>> {
    let videos = state.db.videos();
    let video = videos
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video"))?;
    Ok(Json(videos.detail(video).await?))
}

async fn update_video(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateVideo>,
) -> ApiResult<Json<VideoRecord>> {
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    let video = state
        .db
        .videos()
        .update(&id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found("Video"))?;
    invalidate(&state.cache, families::VIDEO_WRITE);
    Ok(Json(video))
}

async fn delete_video(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.db.videos().delete(&id).await? {
        return Err(ApiError::not_found("Video"));
    }
    invalidate(&state.cache, families::VIDEO_WRITE);
    Ok(Json(DeleteResponse { deleted: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/videos", get(list_videos).post(create_video))
        .route(
            "/videos/{id}",
            get(get_video).put(update_video).delete(delete_video),
        )
}
