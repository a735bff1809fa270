use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use sqlx::any::AnyPoolOptions;
use sqlx::{any::AnyConnectOptions, migrate::Migrator, AnyPool, ConnectOptions};
use std::sync::Once;
use std::{path::PathBuf, str::FromStr};
use tracing::debug;

use crate::dao;
use crate::mapping::{
    episode_from_row, episode_to_row, format_time, item_to_row, movie_from_row, movie_to_row, order_from_rows,
    order_to_row, session_from_row, session_to_row, settings_from_row,
};
use crate::storage::{CacheStorage, CatalogStore, SessionStore};
use crate::types::{
    BookProgress, CustomOrder, CustomOrderItem, Episode, Movie, Series, SeriesSummary, Session,
    SessionFilter, Settings, SettingsUpdate,
};

// Ensure drivers are installed exactly once for sqlx::any
static INSTALL_DRIVERS: Once = Once::new();

// Embed SQL migrations from the migrations/ directory
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    // Create a connection pool. If database_url is None, use a sensible default
    // (SQLite file in the user's data directory).
    pub async fn connect(database_url: Option<&str>, max_connections: u32) -> Result<Self> {
        // Register compiled-in drivers for sqlx::any
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let url = match database_url {
            Some(u) if !u.trim().is_empty() => u.to_string(),
            _ => default_sqlite_url()?,
        };

        let opts = AnyConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database URL: {url}"))?;
        // Quiet by default; callers can enable SQLX_LOG if they want
        let opts = opts.disable_statement_logging();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        debug!(%url, "database connected");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.context("running migrations")
    }

    pub fn pool(&self) -> &AnyPool { &self.pool }

    async fn load_order(&self, order: dao::CustomOrderRow) -> Result<CustomOrder> {
        let items = dao::list_items_for_order(&self.pool, &order.id).await?;
        order_from_rows(order, items)
    }
}

#[async_trait]
impl CacheStorage for Database {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM metadata_cache WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO metadata_cache(key, payload, expires_at) VALUES (?, ?, ?)\n             ON CONFLICT(key) DO UPDATE SET payload=excluded.payload, expires_at=excluded.expires_at",
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for Database {
    async fn get_settings(&self) -> Result<Settings> {
        if let Some(row) = dao::get_settings(&self.pool).await? {
            return Ok(settings_from_row(row));
        }
        // Created lazily on first access
        dao::ensure_settings(&self.pool).await?;
        let row = dao::get_settings(&self.pool).await?.context("settings row missing after insert")?;
        Ok(settings_from_row(row))
    }

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        dao::update_settings(&self.pool, update).await?;
        self.get_settings().await
    }

    async fn list_series(&self) -> Result<Vec<SeriesSummary>> {
        let rows = dao::list_series(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, title)| SeriesSummary { id, title }).collect())
    }

    async fn get_series(&self, series_id: &str) -> Result<Option<Series>> {
        let Some((id, title)) = dao::get_series(&self.pool, series_id).await? else { return Ok(None) };
        let episodes = dao::list_episodes_for_series(&self.pool, series_id).await?;
        Ok(Some(Series::from_episodes(id, title, episodes.into_iter().map(episode_from_row).collect())))
    }

    async fn find_series_by_title(&self, title: &str) -> Result<Option<SeriesSummary>> {
        let row = dao::find_series_by_title(&self.pool, title).await?;
        Ok(row.map(|(id, title)| SeriesSummary { id, title }))
    }

    async fn list_unwatched_episodes(&self, series_id: &str) -> Result<Vec<Episode>> {
        let rows = dao::list_unwatched_episodes(&self.pool, series_id).await?;
        Ok(rows.into_iter().map(episode_from_row).collect())
    }

    async fn list_unwatched_movies(&self) -> Result<Vec<Movie>> {
        let rows = dao::list_unwatched_movies(&self.pool).await?;
        Ok(rows.into_iter().map(movie_from_row).collect())
    }

    async fn list_unwatched_movies_in_collection(&self, collection: &str) -> Result<Vec<Movie>> {
        let rows = dao::list_unwatched_movies_in_collection(&self.pool, collection).await?;
        Ok(rows
            .into_iter()
            .map(movie_from_row)
            .filter(|m| m.collections.iter().any(|c| c == collection))
            .collect())
    }

    async fn list_active_custom_orders(&self) -> Result<Vec<CustomOrder>> {
        let orders = dao::list_active_custom_orders(&self.pool).await?;
        let mut out = Vec::with_capacity(orders.len());
        for o in orders {
            out.push(self.load_order(o).await?);
        }
        Ok(out)
    }

    async fn get_custom_order_item(&self, item_id: &str) -> Result<Option<CustomOrderItem>> {
        dao::get_custom_order_item(&self.pool, item_id)
            .await?
            .map(crate::mapping::item_from_row)
            .transpose()
    }

    async fn mark_custom_order_item_watched(&self, item_id: &str) -> Result<bool> {
        Ok(dao::mark_custom_order_item_watched(&self.pool, item_id).await? > 0)
    }

    async fn set_book_progress(&self, item_id: &str, progress: &BookProgress, mark_watched: bool) -> Result<bool> {
        let n = dao::set_book_progress(
            &self.pool,
            item_id,
            progress.page_count,
            progress.current_page,
            progress.percent_read,
            mark_watched,
        )
        .await?;
        Ok(n > 0)
    }

    async fn upsert_movie(&self, movie: &Movie) -> Result<()> {
        dao::upsert_movie(&self.pool, &movie_to_row(movie)).await
    }

    async fn upsert_series(&self, series: &SeriesSummary) -> Result<()> {
        dao::upsert_series(&self.pool, &series.id, &series.title).await
    }

    async fn upsert_episode(&self, episode: &Episode) -> Result<()> {
        dao::upsert_episode(&self.pool, &episode_to_row(episode)).await
    }

    async fn upsert_custom_order(&self, order: &CustomOrder) -> Result<()> {
        let items: Vec<dao::CustomOrderItemRow> = order.items.iter().map(|i| item_to_row(&order.id, i)).collect();
        dao::upsert_custom_order(&self.pool, &order_to_row(order), &items).await
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, session: &Session) -> Result<bool> {
        dao::insert_session_if_idle(&self.pool, &session_to_row(session)).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        dao::get_session(&self.pool, id).await?.map(session_from_row).transpose()
    }

    async fn set_session_paused(&self, id: &str, paused: bool) -> Result<bool> {
        dao::set_session_paused(&self.pool, id, paused).await
    }

    async fn complete_session(&self, id: &str, end_time: DateTime<Utc>, add_minutes: i64) -> Result<()> {
        dao::complete_session(&self.pool, id, &format_time(&end_time), add_minutes).await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        Ok(dao::delete_session(&self.pool, id).await? > 0)
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let key = filter.subject.as_ref().map(|s| s.key());
        let rows = dao::list_sessions(&self.pool, key.as_deref(), filter.active_only, filter.limit).await?;
        rows.into_iter().map(session_from_row).collect()
    }

    async fn list_completed_episodes(&self, series_id: &str) -> Result<Vec<(i64, i64)>> {
        dao::list_completed_episodes(&self.pool, series_id).await
    }
}

fn default_sqlite_url() -> Result<String> {
    let proj = ProjectDirs::from("dev", "nextup", "nextup")
        .context("unable to determine data directory for default sqlite path")?;
    let mut path: PathBuf = proj.data_dir().to_path_buf();
    std::fs::create_dir_all(&path).with_context(|| format!("creating data dir: {}", path.display()))?;
    path.push("nextup.db");

    // Encode spaces in the path for a valid sqlite URL
    let mut path_str = path.to_string_lossy().to_string();
    if path_str.contains(' ') { path_str = path_str.replace(' ', "%20"); }
    Ok(format!("sqlite://{path_str}?mode=rwc"))
}
