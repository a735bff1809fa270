use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    BookProgress, CustomOrder, CustomOrderItem, Episode, Movie, Series, SeriesSummary, Session,
    SessionFilter, Settings, SettingsUpdate,
};

/// TTL key/value storage backing the metadata cache.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>>;
    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()>;
}

/// Read/write contract over catalog, custom orders and settings.
///
/// Watched state for movies and episodes is derived from completed sessions,
/// so implementations backing both traits answer the `unwatched` queries from
/// their session records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_settings(&self) -> Result<Settings>;
    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings>;

    async fn list_series(&self) -> Result<Vec<SeriesSummary>>;
    async fn get_series(&self, series_id: &str) -> Result<Option<Series>>;
    /// Case-insensitive exact title match.
    async fn find_series_by_title(&self, title: &str) -> Result<Option<SeriesSummary>>;
    async fn list_unwatched_episodes(&self, series_id: &str) -> Result<Vec<Episode>>;

    async fn list_unwatched_movies(&self) -> Result<Vec<Movie>>;
    /// Unwatched movies of one collection, by release year then title.
    async fn list_unwatched_movies_in_collection(&self, collection: &str) -> Result<Vec<Movie>>;

    async fn list_active_custom_orders(&self) -> Result<Vec<CustomOrder>>;
    async fn get_custom_order_item(&self, item_id: &str) -> Result<Option<CustomOrderItem>>;
    /// Returns false when the item does not exist. Never unsets the flag.
    async fn mark_custom_order_item_watched(&self, item_id: &str) -> Result<bool>;
    /// Persists book progress; sets the watched flag when `mark_watched` is true.
    async fn set_book_progress(&self, item_id: &str, progress: &BookProgress, mark_watched: bool) -> Result<bool>;

    async fn upsert_movie(&self, movie: &Movie) -> Result<()>;
    async fn upsert_series(&self, series: &SeriesSummary) -> Result<()>;
    async fn upsert_episode(&self, episode: &Episode) -> Result<()>;
    async fn upsert_custom_order(&self, order: &CustomOrder) -> Result<()>;
}

/// Session records. Implementations must apply the "one running session per
/// subject" rule atomically.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session unless a running (unfinished, unpaused) session
    /// exists for the same subject; returns false in that case.
    async fn insert_session(&self, session: &Session) -> Result<bool>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>>;
    /// Sets the paused flag on an unfinished session. Returns false when
    /// resuming would create a second running session for the subject.
    async fn set_session_paused(&self, id: &str, paused: bool) -> Result<bool>;
    async fn complete_session(&self, id: &str, end_time: DateTime<Utc>, add_minutes: i64) -> Result<()>;
    async fn delete_session(&self, id: &str) -> Result<bool>;
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>>;
    /// `(season, episode)` pairs of every completed session for the series.
    async fn list_completed_episodes(&self, series_id: &str) -> Result<Vec<(i64, i64)>>;
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for std::sync::Arc<T> {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>> { (**self).get_cache(key, now).await }

    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()> {
        (**self).put_cache(key, payload, expires_at).await
    }
}

/// Everything the engine needs from one backing store.
pub trait Store: CatalogStore + SessionStore + CacheStorage {}

impl<T: CatalogStore + SessionStore + CacheStorage + ?Sized> Store for T {}
