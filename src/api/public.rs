//! Public catalog endpoints (read-through cached)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use super::{Pagination, cached};
use crate::app::AppState;
use crate::db::{CategoryWithCount, Page, VideoFilter, VideoRecord, VideoSort};
use crate::error::{ApiError, ApiResult};

const HOMEPAGE_SECTION_SIZE: i64 = 12;
const RELATED_LIMIT: i64 = 12;

#[derive(Debug, Serialize)]
struct Homepage {
    featured: Vec<VideoRecord>,
    latest: Vec<VideoRecord>,
    popular: Vec<VideoRecord>,
    categories: Vec<CategoryWithCount>,
}

async fn homepage(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let db = state.db.clone();
    let value = cached(&state.cache, "homepage:data", || async move {
        let videos = db.videos();
        let section = |sort: VideoSort, featured: Option<bool>| VideoFilter {
            featured,
            published_only: true,
            sort,
            limit: HOMEPAGE_SECTION_SIZE,
            ..Default::default()
        };

        Ok::<_, ApiError>(Homepage {
            featured: videos.list(&section(VideoSort::Latest, Some(true))).await?.items,
            latest: videos.list(&section(VideoSort::Latest, None)).await?.items,
            popular: videos.list(&section(VideoSort::Popular, None)).await?.items,
            categories: db.categories().top(HOMEPAGE_SECTION_SIZE).await?,
        })
    })
    .await?;
    Ok(Json(value))
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub model: Option<String>,
    pub country: Option<String>,
    pub featured: Option<bool>,
    #[serde(default)]
    pub sort: VideoSort,
}

impl VideoListQuery {
    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }

    /// Normalized form used in the cache key
    fn cache_key(&self) -> String {
        let p = self.pagination();
        format!(
            "video:list:page={}:limit={}:category={}:model={}:country={}:featured={}:sort={:?}",
            p.page(),
            p.limit(),
            self.category.as_deref().unwrap_or(""),
            self.model.as_deref().unwrap_or(""),
            self.country.as_deref().unwrap_or(""),
            self.featured.map(|f| f.to_string()).unwrap_or_default(),
            self.sort,
        )
    }

    fn filter(&self) -> VideoFilter {
        let p = self.pagination();
        VideoFilter {
            category: self.category.clone(),
            model: self.model.clone(),
            country: self.country.clone(),
            featured: self.featured,
            search: None,
            published_only: true,
            sort: self.sort,
            limit: p.limit(),
            offset: p.offset(),
        }
    }
}

async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<VideoListQuery>,
) -> ApiResult<Json<JsonValue>> {
    let db = state.db.clone();
    let filter = query.filter();
    let value = cached(&state.cache, &query.cache_key(), || async move {
        Ok::<_, ApiError>(db.videos().list(&filter).await?)
    })
    .await?;
    Ok(Json(value))
}

async fn published_video(state: &AppState, slug: &str) -> ApiResult<VideoRecord> {
    state
        .db
        .videos()
        .get_by_slug(slug)
        .await?
        .filter(|v| v.is_published)
        .ok_or_else(|| ApiError::not_found("Video"))
}

/// Video detail. The cached body is shared; the view is counted per request.
async fn get_video(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let key = format!("video:detail:{}", slug);
    let value = cached(&state.cache, &key, || {
        let state = state.clone();
        let slug = slug.clone();
        async move {
            let video = published_video(&state, &slug).await?;
            Ok::<_, ApiError>(state.db.videos().detail(video).await?)
        }
    })
    .await?;

    if let Some(id) = value.get("id").and_then(JsonValue::as_str) {
        let videos = state.db.videos();
        if let Err(e) = videos.increment_views(id).await {
            warn!(video_id = %id, error = %e, "Failed to count view");
        }
        if let Err(e) = state
            .db
            .analytics()
            .record_view(&format!("/videos/{}", slug), Some(id))
            .await
        {
            warn!(video_id = %id, error = %e, "Failed to record page view");
        }
    }

    Ok(Json(value))
}

async fn related_videos(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let key = format!("video:related:{}", slug);
    let value = cached(&state.cache, &key, || {
        let state = state.clone();
        async move {
            let video = published_video(&state, &slug).await?;
            Ok::<_, ApiError>(state.db.videos().related(&video.id, RELATED_LIMIT).await?)
        }
    })
    .await?;
    Ok(Json(value))
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelListQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ModelListQuery>,
) -> ApiResult<Json<JsonValue>> {
    let p = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let q = query.q.unwrap_or_default().trim().to_lowercase();
    let key = format!("model:list:{}:{}:{}", q, p.page(), p.limit());
    let db = state.db.clone();
    let value = cached(&state.cache, &key, || async move {
        let q = Some(q.as_str()).filter(|q| !q.is_empty());
        Ok::<_, ApiError>(db.models().list(q, p.limit(), p.offset()).await?)
    })
    .await?;
    Ok(Json(value))
}

/// An entity with one page of its published videos
#[derive(Debug, Serialize)]
struct WithVideos<T> {
    #[serde(flatten)]
    entity: T,
    videos: Page<VideoRecord>,
}

async fn get_model(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(p): Query<Pagination>,
) -> ApiResult<Json<JsonValue>> {
    let key = format!("model:detail:{}:{}:{}", slug, p.page(), p.limit());
    let db = state.db.clone();
    let value = cached(&state.cache, &key, || async move {
        let model = db
            .models()
            .get_by_slug(&slug)
            .await?
            .ok_or_else(|| ApiError::not_found("Model"))?;
        let videos = db
            .videos()
            .list(&VideoFilter {
                model: Some(slug),
                published_only: true,
                limit: p.limit(),
                offset: p.offset(),
                ..Default::default()
            })
            .await?;
        Ok::<_, ApiError>(WithVideos {
            entity: model,
            videos,
        })
    })
    .await?;
    Ok(Json(value))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let db = state.db.clone();
    let value = cached(&state.cache, "category:list", || async move {
        Ok::<_, ApiError>(db.categories().list_with_counts().await?)
    })
    .await?;
    Ok(Json(value))
}

async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(p): Query<Pagination>,
) -> ApiResult<Json<JsonValue>> {
    let key = format!("category:detail:{}:{}:{}", slug, p.page(), p.limit());
    let db = state.db.clone();
    let value = cached(&state.cache, &key, || async move {
        let category = db
            .categories()
            .get_by_slug(&slug)
            .await?
            .ok_or_else(|| ApiError::not_found("Category"))?;
        let videos = db
            .videos()
            .list(&VideoFilter {
                category: Some(slug),
                published_only: true,
                limit: p.limit(),
                offset: p.offset(),
                ..Default::default()
            })
            .await?;
        Ok::<_, ApiError>(WithVideos {
            entity: category,
            videos,
        })
    })
    .await?;
    Ok(Json(value))
}

async fn list_countries(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let db = state.db.clone();
    let value = cached(&state.cache, "country:list", || async move {
        Ok::<_, ApiError>(db.countries().list().await?)
    })
    .await?;
    Ok(Json(value))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<JsonValue>> {
    let q = query.q.unwrap_or_default().trim().to_lowercase();
    if q.is_empty() {
        return Err(ApiError::bad_request("q is required"));
    }
    let p = Pagination {
        page: query.page,
        limit: None,
    };

    let key = format!("search:videos:{}:{}", q, p.page());
    let db = state.db.clone();
    let value = cached(&state.cache, &key, || async move {
        Ok::<_, ApiError>(
            db.videos()
                .list(&VideoFilter {
                    search: Some(q),
                    published_only: true,
                    limit: p.limit(),
                    offset: p.offset(),
                    ..Default::default()
                })
                .await?,
        )
    })
    .await?;
    Ok(Json(value))
}

#[derive(Debug, Default, Deserialize)]
pub struct AdsQuery {
    pub position: Option<String>,
}

/// Active ads for a position. Impressions are counted per request.
async fn list_ads(
    State(state): State<AppState>,
    Query(query): Query<AdsQuery>,
) -> ApiResult<Json<JsonValue>> {
    let position = query.position.filter(|p| !p.trim().is_empty());
    let key = format!("ads:{}", position.as_deref().unwrap_or("all"));
    let db = state.db.clone();
    let value = cached(&state.cache, &key, || async move {
        Ok::<_, ApiError>(db.ads().list_active(position.as_deref()).await?)
    })
    .await?;

    let ids: Vec<String> = value
        .as_array()
        .map(|ads| {
            ads.iter()
                .filter_map(|ad| ad.get("id").and_then(JsonValue::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !ids.is_empty() {
        if let Err(e) = state.db.ads().record_impressions(&ids).await {
            warn!(error = %e, "Failed to record ad impressions");
        }
    }

    Ok(Json(value))
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    pub success: bool,
    pub link_url: Option<String>,
}

async fn click_ad(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ClickResponse>> {
    let ads = state.db.ads();
    let ad = ads.get(&id).await?.ok_or_else(|| ApiError::not_found("Ad"))?;
    ads.record_click(&id).await?;
    Ok(Json(ClickResponse {
        success: true,
        link_url: ad.link_url,
    }))
}

async fn public_settings(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let db = state.db.clone();
    let value = cached(&state.cache, "settings:public", || async move {
        Ok::<_, ApiError>(db.settings().public_map().await?)
    })
    .await?;
    Ok(Json(value))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/homepage", get(homepage))
        .route("/videos", get(list_videos))
        .route("/videos/{slug}", get(get_video))
        .route("/videos/{slug}/related", get(related_videos))
        .route("/models", get(list_models))
        .route("/models/{slug}", get(get_model))
        .route("/categories", get(list_categories))
        .route("/categories/{slug}", get(get_category))
        .route("/countries", get(list_countries))
        .route("/search", get(search))
        .route("/ads", get(list_ads))
        .route("/ads/{id}/click", post(click_ad))
        .route("/settings", get(public_settings))
}
