//! In-process store implementing the same contracts as [`crate::db::Database`].
//!
//! Every trait call takes one lock, so each operation is atomic with respect to
//! the others; that is what keeps the one-running-session rule intact here.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::storage::{CacheStorage, CatalogStore, SessionStore};
use crate::types::{
    BookProgress, CustomOrder, CustomOrderItem, Episode, ItemPayload, Movie, Series, SeriesSummary,
    Session, SessionFilter, SessionState, Settings, SettingsUpdate, SubjectRef,
};

#[derive(Default)]
struct Inner {
    settings: Option<Settings>,
    movies: BTreeMap<String, Movie>,
    series: BTreeMap<String, SeriesSummary>,
    episodes: BTreeMap<String, Episode>,
    orders: BTreeMap<String, CustomOrder>,
    sessions: HashMap<String, Session>,
    cache: HashMap<String, (String, i64)>,
}

impl Inner {
    fn is_completed(&self, plex_key: &str) -> bool {
        self.sessions.values().any(|s| {
            s.is_completed && matches!(&s.subject, SubjectRef::Catalog { plex_key: k } if k == plex_key)
        })
    }

    fn is_running(&self, subject: &SubjectRef, except: Option<&str>) -> bool {
        self.sessions
            .values()
            .any(|s| &s.subject == subject && s.state() == SessionState::Active && Some(s.id.as_str()) != except)
    }

    fn item_mut(&mut self, item_id: &str) -> Option<&mut CustomOrderItem> {
        self.orders.values_mut().flat_map(|o| o.items.iter_mut()).find(|i| i.id == item_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl CacheStorage for MemoryStore {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>> {
        let inner = self.lock()?;
        Ok(inner.cache.get(key).filter(|(_, exp)| *exp > now).map(|(p, _)| p.clone()))
    }

    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()> {
        self.lock()?.cache.insert(key.to_string(), (payload.to_string(), expires_at));
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_settings(&self) -> Result<Settings> {
        let mut inner = self.lock()?;
        Ok(*inner.settings.get_or_insert_with(Settings::default))
    }

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        let mut inner = self.lock()?;
        let settings = inner.settings.get_or_insert_with(Settings::default);
        settings.apply(update);
        Ok(*settings)
    }

    async fn list_series(&self) -> Result<Vec<SeriesSummary>> {
        let inner = self.lock()?;
        let mut out: Vec<SeriesSummary> = inner.series.values().cloned().collect();
        out.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(out)
    }

    async fn get_series(&self, series_id: &str) -> Result<Option<Series>> {
        let inner = self.lock()?;
        let Some(summary) = inner.series.get(series_id) else { return Ok(None) };
        let episodes = inner.episodes.values().filter(|e| e.series_id == series_id).cloned().collect();
        Ok(Some(Series::from_episodes(summary.id.clone(), summary.title.clone(), episodes)))
    }

    async fn find_series_by_title(&self, title: &str) -> Result<Option<SeriesSummary>> {
        let inner = self.lock()?;
        let wanted = title.trim().to_lowercase();
        Ok(inner.series.values().find(|s| s.title.to_lowercase() == wanted).cloned())
    }

    async fn list_unwatched_episodes(&self, series_id: &str) -> Result<Vec<Episode>> {
        let inner = self.lock()?;
        let mut out: Vec<Episode> = inner
            .episodes
            .values()
            .filter(|e| e.series_id == series_id && !inner.is_completed(&e.id))
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.season_number, e.episode_number));
        Ok(out)
    }

    async fn list_unwatched_movies(&self) -> Result<Vec<Movie>> {
        let inner = self.lock()?;
        let mut out: Vec<Movie> = inner.movies.values().filter(|m| !inner.is_completed(&m.id)).cloned().collect();
        out.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(out)
    }

    async fn list_unwatched_movies_in_collection(&self, collection: &str) -> Result<Vec<Movie>> {
        let inner = self.lock()?;
        let mut out: Vec<Movie> = inner
            .movies
            .values()
            .filter(|m| m.collections.iter().any(|c| c == collection) && !inner.is_completed(&m.id))
            .cloned()
            .collect();
        // Release year ascending (unknown years last), then title
        out.sort_by(|a, b| {
            (a.year.is_none(), a.year, &a.title).cmp(&(b.year.is_none(), b.year, &b.title))
        });
        Ok(out)
    }

    async fn list_active_custom_orders(&self) -> Result<Vec<CustomOrder>> {
        let inner = self.lock()?;
        Ok(inner.orders.values().filter(|o| o.is_active).cloned().collect())
    }

    async fn get_custom_order_item(&self, item_id: &str) -> Result<Option<CustomOrderItem>> {
        let inner = self.lock()?;
        Ok(inner.orders.values().flat_map(|o| o.items.iter()).find(|i| i.id == item_id).cloned())
    }

    async fn mark_custom_order_item_watched(&self, item_id: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.item_mut(item_id) {
            Some(item) => {
                item.is_watched = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_book_progress(&self, item_id: &str, progress: &BookProgress, mark_watched: bool) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.item_mut(item_id) {
            Some(item) if matches!(item.payload, ItemPayload::Book(_)) => {
                item.payload = ItemPayload::Book(*progress);
                item.is_watched |= mark_watched;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_movie(&self, movie: &Movie) -> Result<()> {
        self.lock()?.movies.insert(movie.id.clone(), movie.clone());
        Ok(())
    }

    async fn upsert_series(&self, series: &SeriesSummary) -> Result<()> {
        self.lock()?.series.insert(series.id.clone(), series.clone());
        Ok(())
    }

    async fn upsert_episode(&self, episode: &Episode) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.series.contains_key(&episode.series_id) {
            return Err(anyhow!("series not found for episode {}: {}", episode.id, episode.series_id));
        }
        inner.episodes.insert(episode.id.clone(), episode.clone());
        Ok(())
    }

    async fn upsert_custom_order(&self, order: &CustomOrder) -> Result<()> {
        let mut inner = self.lock()?;
        let mut order = order.clone();
        if let Some(existing) = inner.orders.get(&order.id) {
            // Watched flags only move forward
            for item in &mut order.items {
                if existing.items.iter().any(|e| e.id == item.id && e.is_watched) {
                    item.is_watched = true;
                }
            }
        }
        order.items.sort_by_key(|i| i.sort_order);
        inner.orders.insert(order.id.clone(), order);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<bool> {
        let mut inner = self.lock()?;
        if session.state() == SessionState::Active && inner.is_running(&session.subject, None) {
            return Ok(false);
        }
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(true)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.lock()?.sessions.get(id).cloned())
    }

    async fn set_session_paused(&self, id: &str, paused: bool) -> Result<bool> {
        let mut inner = self.lock()?;
        let Some(subject) = inner.sessions.get(id).filter(|s| !s.is_completed).map(|s| s.subject.clone()) else {
            return Ok(false);
        };
        if !paused && inner.is_running(&subject, Some(id)) {
            return Ok(false);
        }
        if let Some(s) = inner.sessions.get_mut(id) {
            s.is_paused = paused;
            s.end_time = None;
        }
        Ok(true)
    }

    async fn complete_session(&self, id: &str, end_time: DateTime<Utc>, add_minutes: i64) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(s) = inner.sessions.get_mut(id).filter(|s| !s.is_completed) {
            s.end_time = Some(end_time);
            s.is_completed = true;
            s.is_paused = false;
            s.total_watch_time += add_minutes;
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.sessions.remove(id).is_some())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let inner = self.lock()?;
        let mut out: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| filter.subject.as_ref().map_or(true, |subj| &s.subject == subj))
            .filter(|s| !filter.active_only || !s.is_completed)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.id.cmp(&b.id)));
        if let Some(n) = filter.limit {
            out.truncate(n);
        }
        Ok(out)
    }

    async fn list_completed_episodes(&self, series_id: &str) -> Result<Vec<(i64, i64)>> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.is_completed && s.series_id.as_deref() == Some(series_id))
            .filter_map(|s| Some((s.season_number?, s.episode_number?)))
            .collect())
    }
}
