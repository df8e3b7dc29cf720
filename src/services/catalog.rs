//! External catalog API client
//!
//! The catalog serves paginated listings at `GET {base}/{type}?page=N&limit=L`
//! with an optional `keyword`. A page is either a bare JSON array or an object
//! wrapping the array in `data`, `items` or `results`. Field names and value
//! types vary between feeds, so items are decoded leniently.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::rate_limiter::{RateLimitConfig, RateLimitedClient};
use super::text_utils::{clean_text, split_names};
use crate::config::Config;
use crate::db::{CreateCategory, CreateModel, ScrapeSourceType, ScrapedVideo};

/// One fetched listing page
#[derive(Debug, Clone)]
pub enum CatalogPage {
    /// Page items; empty means the listing has no more data
    Items(Vec<CatalogItem>),
    /// The catalog answered with a non-success status
    Unavailable { status: u16 },
}

/// Anything that can serve catalog pages. The scraper only sees this trait.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_page(
        &self,
        source: ScrapeSourceType,
        page: i64,
        keyword: Option<&str>,
    ) -> Result<CatalogPage>;
}

#[derive(Debug, Clone)]
pub struct CatalogClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_limit: u32,
    pub requests_per_second: u32,
}

impl CatalogClientConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.catalog_api_url.clone(),
            api_key: config.catalog_api_key.clone(),
            page_limit: config.catalog_page_limit,
            requests_per_second: config.catalog_requests_per_second,
        }
    }
}

pub struct CatalogClient {
    http: RateLimitedClient,
    base_url: String,
    api_key: Option<String>,
    page_limit: u32,
}

impl CatalogClient {
    pub fn new(config: CatalogClientConfig) -> Result<Self> {
        let parsed = url::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid catalog API URL: {}", config.base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Catalog API URL must be http(s): {}", config.base_url);
        }

        let http = RateLimitedClient::new(
            "catalog",
            RateLimitConfig {
                requests_per_second: config.requests_per_second,
                burst_size: config.requests_per_second.max(1),
                ..Default::default()
            },
        )?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            page_limit: config.page_limit,
        })
    }

    fn listing_url(&self, source: ScrapeSourceType) -> String {
        format!("{}/{}", self.base_url, source.as_str())
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch_page(
        &self,
        source: ScrapeSourceType,
        page: i64,
        keyword: Option<&str>,
    ) -> Result<CatalogPage> {
        let url = self.listing_url(source);
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("limit", self.page_limit.to_string()),
        ];
        if let Some(keyword) = keyword {
            query.push(("keyword", keyword.to_string()));
        }

        let auth = self.api_key.as_ref().map(|key| format!("Bearer {}", key));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();

        let response = self
            .http
            .get_with_headers_and_query(&url, &headers, &query)
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, page, status = status.as_u16(), "Catalog page unavailable");
            return Ok(CatalogPage::Unavailable {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .context("Failed to read catalog response")?;
        let items = parse_page_body(&body)
            .with_context(|| format!("Malformed catalog page {} of {}", page, source))?;

        debug!(url = %url, page, items = items.len(), "Fetched catalog page");
        Ok(CatalogPage::Items(items))
    }
}

/// Decode a page body into items
pub fn parse_page_body(body: &str) -> Result<Vec<CatalogItem>> {
    let value: JsonValue = serde_json::from_str(body).context("Response is not JSON")?;

    let array = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut object) => ["data", "items", "results"]
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(JsonValue::Array(items)) => Some(items),
                _ => None,
            })
            .context("Response object has no item array")?,
        _ => anyhow::bail!("Response is neither an array nor an object"),
    };

    array
        .into_iter()
        .map(|item| serde_json::from_value(item).context("Item is not an object"))
        .collect()
}

/// One listing entry. Which fields are filled depends on the listing type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogItem {
    #[serde(default, alias = "_id", deserialize_with = "flex::string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "flex::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "flex::string")]
    pub name: Option<String>,
    #[serde(default, alias = "content", deserialize_with = "flex::string")]
    pub description: Option<String>,
    #[serde(default, alias = "thumb_url", deserialize_with = "flex::string")]
    pub thumbnail_url: Option<String>,
    #[serde(default, alias = "avatar", deserialize_with = "flex::string")]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "flex::string")]
    pub video_url: Option<String>,
    #[serde(default, alias = "embed", deserialize_with = "flex::string")]
    pub embed_url: Option<String>,
    #[serde(default, alias = "time", deserialize_with = "flex::duration")]
    pub duration: Option<i64>,
    #[serde(default, deserialize_with = "flex::float")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "flex::names")]
    pub country: Vec<String>,
    #[serde(default, alias = "release_year", deserialize_with = "flex::integer")]
    pub year: Option<i64>,
    #[serde(default, alias = "category", deserialize_with = "flex::names")]
    pub categories: Vec<String>,
    #[serde(default, alias = "models", deserialize_with = "flex::names")]
    pub actors: Vec<String>,
}

impl CatalogItem {
    fn display_name(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }

    /// A movie item. Items without an id or a title are unusable.
    pub fn to_video(&self) -> Option<ScrapedVideo> {
        let external_id = self.id.clone()?;
        let title = clean_text(self.display_name()?);
        if title.is_empty() {
            return None;
        }

        Some(ScrapedVideo {
            external_id,
            title,
            description: self.description.as_deref().map(clean_text),
            thumbnail_url: self.thumbnail_url.clone(),
            video_url: self.video_url.clone(),
            embed_url: self.embed_url.clone(),
            duration_seconds: self.duration,
            rating: self.rating,
            country: self.country.first().cloned(),
            release_year: self.year,
            categories: self.categories.clone(),
            models: self.actors.clone(),
        })
    }

    pub fn to_model(&self) -> Option<CreateModel> {
        let name = clean_text(self.name.as_deref().or(self.title.as_deref())?);
        if name.is_empty() {
            return None;
        }

        Some(CreateModel {
            name,
            slug: None,
            bio: self.description.as_deref().map(clean_text),
            avatar_url: self.avatar_url.clone().or_else(|| self.thumbnail_url.clone()),
            external_id: self.id.clone(),
        })
    }

    pub fn to_category(&self) -> Option<CreateCategory> {
        let name = clean_text(self.name.as_deref().or(self.title.as_deref())?);
        if name.is_empty() {
            return None;
        }

        Some(CreateCategory {
            name,
            slug: None,
            description: self.description.as_deref().map(clean_text),
            thumbnail_url: self.thumbnail_url.clone(),
            external_id: self.id.clone(),
        })
    }

    pub fn to_country(&self) -> Option<String> {
        let name = clean_text(self.name.as_deref().or(self.title.as_deref())?);
        (!name.is_empty()).then_some(name)
    }
}

/// Lenient field decoders. Anything unrecognised decodes as absent.
mod flex {
    use super::*;

    fn non_empty(s: &str) -> Option<String> {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::String(s) => non_empty(&s),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Seconds as a number, or `mm:ss` / `hh:mm:ss`
    pub fn duration<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            JsonValue::String(s) => parse_clock(&s),
            _ => None,
        })
    }

    pub(super) fn parse_clock(s: &str) -> Option<i64> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let mut total = 0i64;
        for part in s.split(':') {
            let part = part.trim().parse::<i64>().ok()?;
            total = total.checked_mul(60)?.checked_add(part)?;
        }
        Some(total)
    }

    /// A delimited string, an array of strings, or an array of `{name}` objects
    pub fn names<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::String(s) => split_names(&s),
            JsonValue::Array(values) => {
                let joined: Vec<String> = values
                    .into_iter()
                    .filter_map(|v| match v {
                        JsonValue::String(s) => Some(s),
                        JsonValue::Object(mut o) => match o.remove("name") {
                            Some(JsonValue::String(s)) => Some(s),
                            _ => None,
                        },
                        _ => None,
                    })
                    .collect();
                split_names(&joined.join(","))
            }
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    #[test]
    fn test_parse_bare_and_wrapped_pages() {
        let bare = parse_page_body(r#"[{"id": 1, "title": "A"}]"#).unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].id.as_deref(), Some("1"));

        let wrapped = parse_page_body(r#"{"total": 2, "data": [{"id": "x"}, {"id": "y"}]}"#).unwrap();
        assert_eq!(wrapped.len(), 2);

        let results = parse_page_body(r#"{"results": []}"#).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(parse_page_body("<html>").is_err());
        assert!(parse_page_body(r#"{"message": "ok"}"#).is_err());
        assert!(parse_page_body(r#"[1, 2]"#).is_err());
    }

    #[test]
    fn test_movie_item_is_decoded_leniently() {
        let items = parse_page_body(
            r#"[{
                "_id": "m-1",
                "title": "  Night &amp; Day ",
                "content": "<p>Long story</p>",
                "time": "1:02:03",
                "rating": "7.5",
                "year": "2021",
                "country": [{"name": "France"}],
                "category": "Drama, Romance",
                "actors": ["Ann", "Bob", "ann"]
            }]"#,
        )
        .unwrap();

        let video = items[0].to_video().unwrap();
        assert_eq!(video.external_id, "m-1");
        assert_eq!(video.title, "Night & Day");
        assert_eq!(video.description.as_deref(), Some("Long story"));
        assert_eq!(video.duration_seconds, Some(3723));
        assert_eq!(video.rating, Some(7.5));
        assert_eq!(video.release_year, Some(2021));
        assert_eq!(video.country.as_deref(), Some("France"));
        assert_eq!(video.categories, vec!["Drama", "Romance"]);
        assert_eq!(video.models, vec!["Ann", "Bob"]);
    }

    #[test]
    fn test_items_without_identity_are_unusable() {
        let item = CatalogItem {
            title: Some("No id".to_string()),
            ..Default::default()
        };
        assert!(item.to_video().is_none());
        assert_eq!(item.to_country().as_deref(), Some("No id"));
        assert!(CatalogItem::default().to_model().is_none());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(flex::parse_clock("12:34"), Some(754));
        assert_eq!(flex::parse_clock("90"), Some(90));
        assert_eq!(flex::parse_clock("abc"), None);
        assert_eq!(flex::parse_clock("9223372036854775807:59"), None);
        assert_eq!(flex::parse_clock("1:9223372036854775807"), None);
    }

    #[test]
    fn test_overflowing_time_decodes_as_absent() {
        let items =
            parse_page_body(r#"[{"id":"x","title":"t","time":"9223372036854775807:59"}]"#).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].duration, None);
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    fn client(base_url: String) -> CatalogClient {
        CatalogClient::new(CatalogClientConfig {
            base_url,
            api_key: Some("secret".to_string()),
            page_limit: 10,
            requests_per_second: 100,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_client_sends_paging_query_and_reads_items() {
        let router = Router::new().route(
            "/api/{kind}",
            get(
                |Path(kind): Path<String>,
                 Query(query): Query<HashMap<String, String>>,
                 headers: axum::http::HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer secret");
                    Json(serde_json::json!({
                        "data": [{
                            "id": format!("{}-{}", kind, query.get("page").cloned().unwrap_or_default()),
                            "name": query.get("keyword").cloned().unwrap_or_default(),
                            "description": query.get("limit").cloned().unwrap_or_default(),
                            "title": authorized.to_string(),
                        }]
                    }))
                },
            ),
        );
        let client = client(serve(router).await);

        let page = client
            .fetch_page(ScrapeSourceType::Actors, 3, Some("ann"))
            .await
            .unwrap();
        let CatalogPage::Items(items) = page else {
            panic!("expected items");
        };
        assert_eq!(items[0].id.as_deref(), Some("actors-3"));
        assert_eq!(items[0].name.as_deref(), Some("ann"));
        assert_eq!(items[0].description.as_deref(), Some("10"));
        assert_eq!(items[0].title.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_client_reports_non_success_status() {
        let router = Router::new().route(
            "/api/movies",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let client = client(serve(router).await);

        let page = client
            .fetch_page(ScrapeSourceType::Movies, 1, None)
            .await
            .unwrap();
        assert!(matches!(page, CatalogPage::Unavailable { status: 503 }));
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        for base_url in ["not a url", "ftp://catalog.example.com"] {
            let result = CatalogClient::new(CatalogClientConfig {
                base_url: base_url.to_string(),
                api_key: None,
                page_limit: 10,
                requests_per_second: 1,
            });
            assert!(result.is_err(), "{} accepted", base_url);
        }
    }
}
