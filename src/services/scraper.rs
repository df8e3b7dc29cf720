//! Scrape routine: pull a page window from the external catalog and upsert it
//!
//! Pages are read in order from `start_page` to `end_page`. An empty page or a
//! non-success status on a later page ends the walk early; a non-success status
//! on the very first page means the catalog is down and fails the run.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{SharedCache, families};
use super::catalog::{CatalogItem, CatalogPage, CatalogSource};
use crate::db::{Database, ScrapeConfigRecord, ScrapeSourceType, UpsertOutcome};

/// Parameters of one scrape run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeJob {
    pub source_type: ScrapeSourceType,
    pub start_page: i64,
    pub end_page: i64,
    pub keyword: Option<String>,
    pub update_existing: bool,
}

impl From<&ScrapeConfigRecord> for ScrapeJob {
    fn from(config: &ScrapeConfigRecord) -> Self {
        Self {
            source_type: config.source_type,
            start_page: config.start_page,
            end_page: config.end_page,
            keyword: config.keyword.clone(),
            update_existing: config.update_existing,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeSummary {
    pub pages: i64,
    pub fetched: i64,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
}

impl ScrapeSummary {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }

    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Work performed on every scheduler tick
#[async_trait]
pub trait ScrapeRoutine: Send + Sync {
    async fn run(&self, job: &ScrapeJob) -> Result<ScrapeSummary>;
}

/// Cache families touched by a scrape of `source`
pub fn invalidation_families(source: ScrapeSourceType) -> Vec<&'static str> {
    match source {
        ScrapeSourceType::Movies => families::VIDEO_WRITE
            .iter()
            .chain(families::COUNTRY_WRITE)
            .copied()
            .collect(),
        ScrapeSourceType::Actors => vec!["model:"],
        ScrapeSourceType::Categories => vec!["category:", "homepage:"],
        ScrapeSourceType::Countries => families::COUNTRY_WRITE.to_vec(),
    }
}

pub struct CatalogScraper {
    db: Database,
    catalog: Arc<dyn CatalogSource>,
    cache: SharedCache,
}

impl CatalogScraper {
    pub fn new(db: Database, catalog: Arc<dyn CatalogSource>, cache: SharedCache) -> Self {
        Self { db, catalog, cache }
    }

    async fn walk_pages(&self, job: &ScrapeJob, summary: &mut ScrapeSummary) -> Result<()> {
        let keyword = job.keyword.as_deref();

        for page in job.start_page..=job.end_page {
            let items = match self.catalog.fetch_page(job.source_type, page, keyword).await? {
                CatalogPage::Unavailable { status } if page == job.start_page => {
                    anyhow::bail!("Catalog unavailable (HTTP {})", status);
                }
                CatalogPage::Unavailable { status } => {
                    debug!(page, status, "Catalog stopped answering, ending run");
                    break;
                }
                CatalogPage::Items(items) if items.is_empty() => {
                    debug!(page, "Empty catalog page, no more data");
                    break;
                }
                CatalogPage::Items(items) => items,
            };

            summary.pages += 1;
            summary.fetched += items.len() as i64;
            for item in &items {
                let outcome = self.store(job, item).await?;
                summary.count(outcome);
            }
        }

        Ok(())
    }

    async fn store(&self, job: &ScrapeJob, item: &CatalogItem) -> Result<UpsertOutcome> {
        let update = job.update_existing;

        let outcome = match job.source_type {
            ScrapeSourceType::Movies => match item.to_video() {
                Some(video) => {
                    if let Some(country) = &video.country {
                        self.db.countries().upsert_by_name(country, false).await?;
                    }
                    self.db.videos().upsert_scraped(&video, update).await?
                }
                None => UpsertOutcome::Skipped,
            },
            ScrapeSourceType::Actors => match item.to_model() {
                Some(model) => self.db.models().upsert_scraped(&model, update).await?,
                None => UpsertOutcome::Skipped,
            },
            ScrapeSourceType::Categories => match item.to_category() {
                Some(category) => self.db.categories().upsert_scraped(&category, update).await?,
                None => UpsertOutcome::Skipped,
            },
            ScrapeSourceType::Countries => match item.to_country() {
                Some(name) => self.db.countries().upsert_by_name(&name, update).await?,
                None => UpsertOutcome::Skipped,
            },
        };

        if outcome == UpsertOutcome::Skipped && item.id.is_none() {
            warn!(source = %job.source_type, "Catalog item without id");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl ScrapeRoutine for CatalogScraper {
    async fn run(&self, job: &ScrapeJob) -> Result<ScrapeSummary> {
        let mut summary = ScrapeSummary::default();
        let result = self.walk_pages(job, &mut summary).await;

        // rows written before a failure are still visible
        if summary.changed() {
            let removed = self
                .cache
                .invalidate_all(&invalidation_families(job.source_type));
            debug!(source = %job.source_type, removed, "Invalidated cache after scrape");
        }

        result?;
        info!(
            source = %job.source_type,
            pages = summary.pages,
            fetched = summary.fetched,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Scrape finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{VideoFilter, test_db};
    use crate::services::cache::{Cache, CacheConfig};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Serves scripted pages; unscripted pages are empty
    #[derive(Default)]
    struct ScriptedCatalog {
        pages: Mutex<HashMap<(ScrapeSourceType, i64), Option<CatalogPage>>>,
        requested: Mutex<Vec<i64>>,
    }

    impl ScriptedCatalog {
        fn page(self, source: ScrapeSourceType, page: i64, body: &str) -> Self {
            let items = crate::services::catalog::parse_page_body(body).unwrap();
            self.pages
                .lock()
                .insert((source, page), Some(CatalogPage::Items(items)));
            self
        }

        fn unavailable(self, source: ScrapeSourceType, page: i64) -> Self {
            self.pages
                .lock()
                .insert((source, page), Some(CatalogPage::Unavailable { status: 502 }));
            self
        }

        fn malformed(self, source: ScrapeSourceType, page: i64) -> Self {
            self.pages.lock().insert((source, page), None);
            self
        }
    }

    #[async_trait]
    impl CatalogSource for ScriptedCatalog {
        async fn fetch_page(
            &self,
            source: ScrapeSourceType,
            page: i64,
            _keyword: Option<&str>,
        ) -> Result<CatalogPage> {
            self.requested.lock().push(page);
            match self.pages.lock().get(&(source, page)) {
                Some(Some(page)) => Ok(page.clone()),
                Some(None) => anyhow::bail!("Response is not JSON"),
                None => Ok(CatalogPage::Items(Vec::new())),
            }
        }
    }

    fn job(source_type: ScrapeSourceType, end_page: i64, update_existing: bool) -> ScrapeJob {
        ScrapeJob {
            source_type,
            start_page: 1,
            end_page,
            keyword: None,
            update_existing,
        }
    }

    const MOVIES_P1: &str = r#"[
        {"id": "m1", "title": "First", "category": "Drama", "actors": "Ann", "country": "France"},
        {"id": "m2", "title": "Second", "category": ["Drama", "Comedy"]}
    ]"#;
    const MOVIES_P2: &str = r#"{"data": [{"id": "m3", "title": "Third"}, {"title": "no id"}]}"#;

    async fn scraper(catalog: ScriptedCatalog) -> (CatalogScraper, Database, SharedCache, Arc<ScriptedCatalog>) {
        let db = test_db().await;
        let cache = Arc::new(Cache::new(CacheConfig::default()));
        let catalog = Arc::new(catalog);
        let scraper = CatalogScraper::new(db.clone(), catalog.clone(), cache.clone());
        (scraper, db, cache, catalog)
    }

    #[tokio::test]
    async fn test_movies_are_inserted_and_cache_invalidated() {
        let catalog = ScriptedCatalog::default()
            .page(ScrapeSourceType::Movies, 1, MOVIES_P1)
            .page(ScrapeSourceType::Movies, 2, MOVIES_P2);
        let (scraper, db, cache, catalog) = scraper(catalog).await;
        cache.set("video:list:all", &1, None);
        cache.set("ads:header", &2, None);

        let summary = scraper.run(&job(ScrapeSourceType::Movies, 5, false)).await.unwrap();

        assert_eq!(
            summary,
            ScrapeSummary {
                pages: 2,
                fetched: 4,
                inserted: 3,
                updated: 0,
                skipped: 1,
            }
        );
        // page 3 is empty and ends the walk
        assert_eq!(*catalog.requested.lock(), vec![1, 2, 3]);
        assert_eq!(cache.get::<i32>("video:list:all"), None);
        assert_eq!(cache.get::<i32>("ads:header"), Some(2));

        let drama = db.categories().get_by_slug("drama").await.unwrap().unwrap();
        assert_eq!(drama.video_count, 2);
        assert!(db.models().get_by_slug("ann").await.unwrap().is_some());
        assert!(db.countries().get_by_slug("france").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_existing_rows_follow_update_flag() {
        let catalog = ScriptedCatalog::default().page(ScrapeSourceType::Movies, 1, MOVIES_P1);
        let (scraper, db, _, _) = scraper(catalog).await;

        scraper.run(&job(ScrapeSourceType::Movies, 1, false)).await.unwrap();
        let again = scraper.run(&job(ScrapeSourceType::Movies, 1, false)).await.unwrap();
        assert_eq!((again.inserted, again.skipped), (0, 2));

        let updated = scraper.run(&job(ScrapeSourceType::Movies, 1, true)).await.unwrap();
        assert_eq!(updated.updated, 2);

        let page = db
            .videos()
            .list(&VideoFilter {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_first_page_unavailable_fails_run() {
        let catalog = ScriptedCatalog::default().unavailable(ScrapeSourceType::Actors, 1);
        let (scraper, _, _, _) = scraper(catalog).await;

        let err = scraper
            .run(&job(ScrapeSourceType::Actors, 3, false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_later_page_unavailable_ends_run() {
        let catalog = ScriptedCatalog::default()
            .page(ScrapeSourceType::Actors, 1, r#"[{"id": "a1", "name": "Ann"}]"#)
            .unavailable(ScrapeSourceType::Actors, 2)
            .page(ScrapeSourceType::Actors, 3, r#"[{"id": "a3", "name": "Cat"}]"#);
        let (scraper, db, _, catalog) = scraper(catalog).await;

        let summary = scraper.run(&job(ScrapeSourceType::Actors, 3, false)).await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(*catalog.requested.lock(), vec![1, 2]);
        assert_eq!(db.models().list(None, 10, 0).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_malformed_page_fails_but_keeps_earlier_rows() {
        let catalog = ScriptedCatalog::default()
            .page(ScrapeSourceType::Categories, 1, r#"[{"id": "c1", "name": "Drama"}]"#)
            .malformed(ScrapeSourceType::Categories, 2);
        let (scraper, db, cache, _) = scraper(catalog).await;
        cache.set("homepage:data", &1, None);

        let result = scraper.run(&job(ScrapeSourceType::Categories, 2, false)).await;
        assert_matches!(result, Err(_));
        assert!(db.categories().get_by_slug("drama").await.unwrap().is_some());
        assert_eq!(cache.get::<i32>("homepage:data"), None);
    }

    #[test]
    fn test_invalidation_families() {
        let movies = invalidation_families(ScrapeSourceType::Movies);
        assert!(movies.contains(&"video:"));
        assert!(movies.contains(&"country:"));
        assert_eq!(invalidation_families(ScrapeSourceType::Actors), vec!["model:"]);
    }
}
