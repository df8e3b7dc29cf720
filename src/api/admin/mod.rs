//! Admin endpoints under `/api/admin`
//!
//! Every handler takes an [AdminUser](crate::api::auth::AdminUser), so a
//! request without a bearer token carrying the admin role never reaches it.

pub mod ads;
pub mod analytics;
pub mod backup;
pub mod cache;
pub mod categories;
pub mod models;
pub mod scraper;
pub mod settings;
pub mod videos;

use axum::Router;

use crate::app::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(videos::router())
        .merge(models::router())
        .merge(categories::router())
        .merge(ads::router())
        .merge(settings::router())
        .merge(analytics::router())
        .merge(backup::router())
        .merge(cache::router())
        .nest("/scraper", scraper::router())
}
