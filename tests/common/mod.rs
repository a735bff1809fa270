//! Shared fixtures for nextup integration tests.
//!
//! - `CatalogBuilder` for assembling catalog seeds
//! - helpers to open an in-memory or a temp-file SQLite engine

#![allow(dead_code)]

use std::path::Path;

use nextup::db::Database;
use nextup::memory::MemoryStore;
use nextup::prelude::*;
use nextup::storage::Store;
use nextup::{EpisodeSeed, SeriesSeed};
use tempfile::TempDir;

pub fn episode_id(series_id: &str, season: i64, episode: i64) -> String {
    format!("{series_id}-s{season}e{episode}")
}

/// Builder for `CatalogSeed` values.
#[derive(Default)]
pub struct CatalogBuilder {
    seed: CatalogSeed,
}

impl CatalogBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn movie(mut self, id: &str, title: &str, year: Option<i64>, collections: &[&str]) -> Self {
        self.seed.movies.push(Movie {
            id: id.to_string(),
            title: title.to_string(),
            year,
            collections: collections.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// `layout` is `(season, episode_count)` pairs.
    pub fn series(mut self, id: &str, title: &str, layout: &[(i64, i64)]) -> Self {
        let mut episodes = Vec::new();
        for &(season, count) in layout {
            for n in 1..=count {
                episodes.push(EpisodeSeed {
                    id: episode_id(id, season, n),
                    season_number: season,
                    episode_number: n,
                    title: Some(format!("{title} {season}x{n:02}")),
                });
            }
        }
        self.seed.series.push(SeriesSeed { id: id.to_string(), title: title.to_string(), episodes });
        self
    }

    pub fn order(mut self, id: &str, name: &str, is_active: bool, items: Vec<CustomOrderItem>) -> Self {
        self.seed.custom_orders.push(CustomOrder { id: id.to_string(), name: name.to_string(), is_active, items });
        self
    }

    pub fn build(self) -> CatalogSeed { self.seed }

    pub async fn load<S: Store + 'static>(self, app: &Nextup<S>) {
        app.import_catalog(&self.seed).await.unwrap();
    }
}

pub fn item(id: &str, sort_order: i64, is_watched: bool, payload: ItemPayload) -> CustomOrderItem {
    CustomOrderItem {
        id: id.to_string(),
        order_id: String::new(),
        sort_order,
        is_watched,
        title: format!("Item {id}"),
        payload,
    }
}

pub fn movie_item(id: &str, sort_order: i64, is_watched: bool) -> CustomOrderItem {
    item(id, sort_order, is_watched, ItemPayload::Movie { plex_key: None })
}

pub fn book_item(id: &str, sort_order: i64, page_count: Option<i64>) -> CustomOrderItem {
    item(id, sort_order, false, ItemPayload::Book(BookProgress::new(page_count, 0)))
}

pub fn comic_item(id: &str, sort_order: i64, series: &str, issue: &str) -> CustomOrderItem {
    item(
        id,
        sort_order,
        false,
        ItemPayload::Comic { series: series.to_string(), year: Some(1986), issue: Some(issue.to_string()) },
    )
}

pub fn test_config() -> EngineConfig {
    EngineConfig { enrichment_timeout_ms: 200, ..EngineConfig::default() }
}

pub fn memory_app() -> Nextup<MemoryStore> { Nextup::with_store(MemoryStore::new(), &test_config()) }

pub fn memory_app_with(config: &EngineConfig) -> Nextup<MemoryStore> { Nextup::with_store(MemoryStore::new(), config) }

/// Engine over a fresh SQLite file; keep the `TempDir` alive for the test.
pub async fn sqlite_app() -> (TempDir, Nextup<Database>) { sqlite_app_pooled(1).await }

pub async fn sqlite_app_pooled(max_connections: u32) -> (TempDir, Nextup<Database>) {
    let dir = tempfile::tempdir().unwrap();
    let app = sqlite_app_in(dir.path(), max_connections).await;
    (dir, app)
}

/// Engine over `<dir>/nextup.db`; several engines may share one directory.
pub async fn sqlite_app_in(dir: &Path, max_connections: u32) -> Nextup<Database> {
    let config = EngineConfig {
        database_url: Some(format!("sqlite://{}?mode=rwc", dir.join("nextup.db").display())),
        max_connections,
        ..test_config()
    };
    Nextup::connect(&config).await.unwrap()
}

pub async fn set_weights<S: Store + 'static>(app: &Nextup<S>, tv: u32, movies: u32, custom: u32, collection: u32) {
    app.update_settings(&SettingsUpdate {
        tv_general_percent: Some(tv),
        movies_general_percent: Some(movies),
        custom_order_percent: Some(custom),
        partially_watched_collection_percent: Some(collection),
    })
    .await
    .unwrap();
}

/// Starts and completes a session for one episode.
pub async fn watch_episode<S: Store + 'static>(app: &Nextup<S>, series_id: &str, series_title: &str, season: i64, episode: i64) -> Session {
    let ep = EpisodeRef {
        series_id: series_id.to_string(),
        series_title: series_title.to_string(),
        episode_id: episode_id(series_id, season, episode),
        season_number: season,
        episode_number: episode,
        title: None,
    };
    let session = app.start_session(&SessionSubject::episode(&ep)).await.unwrap();
    app.complete_session(&session.id, 42).await.unwrap()
}

pub async fn watch_movie<S: Store + 'static>(app: &Nextup<S>, movie: &Movie) -> Session {
    let session = app.start_session(&SessionSubject::movie(movie)).await.unwrap();
    app.complete_session(&session.id, 120).await.unwrap()
}
