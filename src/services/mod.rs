//! Long-running services and the domain logic they drive

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod database;
pub mod http_server;
pub mod manager;
pub mod rate_limiter;
pub mod scheduler;
pub mod scraper;
pub mod text_utils;

pub use auth::{AuthConfig, AuthError, AuthService, AuthenticatedUser};
pub use cache::{Cache, CacheConfig, CacheStats, SharedCache};
pub use catalog::{CatalogClient, CatalogClientConfig, CatalogSource};
pub use clock::{Clock, SharedClock, SystemClock};
pub use database::DatabaseService;
pub use http_server::HttpServerService;
pub use manager::{HealthStatus, Service, ServiceHealth, ServicesManager};
pub use rate_limiter::{RateLimitConfig, RateLimitedClient};
pub use scheduler::{AutoScrapeScheduler, RunNow, ScrapeConfigStore};
pub use scraper::{CatalogScraper, ScrapeJob, ScrapeRoutine, ScrapeSummary};
