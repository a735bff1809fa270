pub mod collection;
pub mod config;
pub mod custom_order;
pub mod dao;
pub mod db;
pub mod error;
pub mod mapping;
pub mod memory;
pub mod metadata;
pub mod progression;
pub mod selection;
pub mod session;
pub mod storage;
pub mod types;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::error::{NextupError, Result};
    pub use crate::metadata::{MetadataCache, NoMetadata};
    pub use crate::types::{
        BookProgress, Category, CustomOrder, CustomOrderItem, Episode, EpisodeRef, ItemPayload, MediaType, Movie,
        NextItem, SeriesSummary, Session, SessionFilter, SessionState, SessionSubject, Settings, SettingsUpdate,
        SubjectRef,
    };
    pub use crate::{CatalogSeed, ImportSummary, Nextup};
}

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::{NextupError, Result};
use crate::metadata::{CachedMetadata, MetadataCache, NoMetadata};
use crate::selection::SelectionEngine;
use crate::session::SessionTracker;
use crate::storage::Store;
use crate::types::{
    BookProgress, Category, CustomOrder, CustomOrderItem, Episode, EpisodeRef, ItemPayload, Movie, NextItem,
    SeriesSummary, Session, SessionFilter, SessionSubject, Settings, SettingsUpdate,
};

// --- Catalog seed files ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub series: Vec<SeriesSeed>,
    #[serde(default)]
    pub custom_orders: Vec<CustomOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesSeed {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub episodes: Vec<EpisodeSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeSeed {
    pub id: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub movies: usize,
    pub series: usize,
    pub episodes: usize,
    pub custom_orders: usize,
}

/// Async library entry point. Owns the store, the metadata provider and the
/// settings cache.
pub struct Nextup<S: Store + 'static = Database> {
    store: Arc<S>,
    metadata: Arc<dyn MetadataCache>,
    // Invalidated by update_settings
    settings: RwLock<Option<Settings>>,
    enrichment_timeout: Duration,
    metadata_ttl_secs: i64,
}

impl Nextup<Database> {
    /// Connect to the configured database and (optionally) run migrations.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let db = Database::connect(config.database_url.as_deref(), config.max_connections).await?;
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(Self::with_store(db, config))
    }
}

impl<S: Store + 'static> Nextup<S> {
    /// Wrap an already constructed store. Enrichment starts out with a cached
    /// [`NoMetadata`] provider.
    pub fn with_store(store: S, config: &EngineConfig) -> Self {
        let store = Arc::new(store);
        let metadata: Arc<dyn MetadataCache> =
            Arc::new(CachedMetadata::new(NoMetadata, store.clone(), config.metadata_cache_ttl_secs));
        Self {
            store,
            metadata,
            settings: RwLock::new(None),
            enrichment_timeout: config.enrichment_timeout(),
            metadata_ttl_secs: config.metadata_cache_ttl_secs,
        }
    }

    /// Plug in an upstream artwork/comic provider, cached through the store.
    pub fn with_metadata<U: MetadataCache + 'static>(mut self, upstream: U) -> Self {
        self.metadata = Arc::new(CachedMetadata::new(upstream, self.store.clone(), self.metadata_ttl_secs));
        self
    }

    pub fn store(&self) -> &S { &self.store }

    // --- Settings ---

    /// Current settings, read through the cache. The cache only sees writes
    /// made through this instance; call [`Nextup::reload_settings`] to pick up
    /// changes written by another process sharing the database.
    pub async fn settings(&self) -> Result<Settings> {
        if let Some(s) = *self.settings.read().await {
            return Ok(s);
        }
        let mut slot = self.settings.write().await;
        if let Some(s) = *slot {
            return Ok(s);
        }
        let fresh = self.store.get_settings().await?;
        *slot = Some(fresh);
        Ok(fresh)
    }

    /// Drops the cached settings and reads them from the store again.
    pub async fn reload_settings(&self) -> Result<Settings> {
        let mut slot = self.settings.write().await;
        *slot = None;
        let fresh = self.store.get_settings().await?;
        *slot = Some(fresh);
        debug!(?fresh, "settings reloaded");
        Ok(fresh)
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        let mut slot = self.settings.write().await;
        *slot = None;
        let updated = self.store.update_settings(update).await?;
        *slot = Some(updated);
        info!(?updated, "settings updated");
        Ok(updated)
    }

    // --- Selection ---

    fn engine(&self) -> SelectionEngine<'_, S, S, dyn MetadataCache> {
        SelectionEngine::new(&*self.store, &*self.store, &*self.metadata, self.enrichment_timeout)
    }

    /// What to watch or read next.
    pub async fn select_next(&self) -> Result<NextItem> {
        let mut rng = StdRng::from_os_rng();
        self.select_next_with_rng(&mut rng).await
    }

    pub async fn select_next_with_rng<R: Rng + Send>(&self, rng: &mut R) -> Result<NextItem> {
        let settings = self.settings().await?;
        self.engine().select_next(&settings, rng).await
    }

    pub async fn next_episode(&self, series_id: &str) -> Result<EpisodeRef> {
        progression::next_episode(&*self.store, &*self.store, series_id).await
    }

    // --- Custom orders ---

    pub async fn next_custom_order_item(&self) -> Result<NextItem> {
        let mut rng = StdRng::from_os_rng();
        let (order, item) = custom_order::next_custom_order_item(&*self.store, &mut rng).await?;
        let mut next = NextItem::from_custom_order_item(&order, &item);
        metadata::enrich(&*self.metadata, &mut next, self.enrichment_timeout).await;
        Ok(next)
    }

    pub async fn mark_custom_order_item_watched(&self, item_id: &str) -> Result<CustomOrderItem> {
        custom_order::mark_watched(&*self.store, item_id).await
    }

    pub async fn record_book_progress(&self, item_id: &str, current_page: i64, page_count: Option<i64>) -> Result<CustomOrderItem> {
        custom_order::record_book_progress(&*self.store, item_id, current_page, page_count).await
    }

    // --- Sessions ---

    fn sessions(&self) -> SessionTracker<'_, S> { SessionTracker::new(&*self.store) }

    pub async fn start_session(&self, subject: &SessionSubject) -> Result<Session> { self.sessions().start(subject).await }

    pub async fn pause_session(&self, id: &str) -> Result<Session> { self.sessions().pause(id).await }

    pub async fn resume_session(&self, id: &str) -> Result<Session> { self.sessions().resume(id).await }

    pub async fn complete_session(&self, id: &str, watch_minutes: i64) -> Result<Session> {
        self.sessions().complete(id, watch_minutes).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> { self.sessions().delete(id).await }

    pub async fn get_session(&self, id: &str) -> Result<Session> { self.sessions().get(id).await }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> { self.sessions().list(filter).await }

    // --- Catalog maintenance ---

    pub async fn upsert_movie(&self, movie: &Movie) -> Result<()> { Ok(self.store.upsert_movie(movie).await?) }

    pub async fn upsert_series(&self, series: &SeriesSummary) -> Result<()> { Ok(self.store.upsert_series(series).await?) }

    pub async fn upsert_episode(&self, episode: &Episode) -> Result<()> { Ok(self.store.upsert_episode(episode).await?) }

    pub async fn upsert_custom_order(&self, order: &CustomOrder) -> Result<()> {
        let mut order = order.clone();
        for item in &mut order.items {
            item.order_id = order.id.clone();
            // Stored percentages are recomputed from the page numbers
            if let ItemPayload::Book(p) = &item.payload {
                item.payload = ItemPayload::Book(BookProgress::new(p.page_count, p.current_page));
            }
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = order.items.iter().find(|i| !seen.insert(i.sort_order)) {
            return Err(NextupError::InvalidCatalog(format!(
                "order {} repeats sort order {}",
                order.id, dup.sort_order
            )));
        }
        self.store.upsert_custom_order(&order).await?;
        debug!(order = %order.name, items = order.items.len(), "custom order stored");
        Ok(())
    }

    /// Load a seed file's worth of catalog data.
    pub async fn import_catalog(&self, seed: &CatalogSeed) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for movie in &seed.movies {
            self.upsert_movie(movie).await?;
            summary.movies += 1;
        }
        for series in &seed.series {
            self.upsert_series(&SeriesSummary { id: series.id.clone(), title: series.title.clone() }).await?;
            summary.series += 1;
            for ep in &series.episodes {
                self.upsert_episode(&Episode {
                    id: ep.id.clone(),
                    series_id: series.id.clone(),
                    season_number: ep.season_number,
                    episode_number: ep.episode_number,
                    title: ep.title.clone(),
                })
                .await?;
                summary.episodes += 1;
            }
        }
        for order in &seed.custom_orders {
            self.upsert_custom_order(order).await?;
            summary.custom_orders += 1;
        }
        info!(?summary, "catalog imported");
        Ok(summary)
    }

    /// Weight share each category would get right now, for display.
    pub async fn category_weights(&self) -> Result<Vec<(Category, f64)>> {
        let settings = self.settings().await?;
        let candidates = selection::Candidates::gather(&*self.store).await?;
        Ok(selection::normalize_weights(&candidates.weighted(&settings))
            .into_iter()
            .map(|w| (w.category, w.weight))
            .collect())
    }
}
