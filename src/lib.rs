//! cinebase - video catalog backend
//!
//! Public catalog API with a read-through response cache, an admin API,
//! and per-config auto-scrape timers that import from an external catalog.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod services;
