use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;

use crate::types::SettingsUpdate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettingsRow {
    pub tv_general_percent: i64,
    pub movies_general_percent: i64,
    pub custom_order_percent: i64,
    pub partially_watched_collection_percent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MovieRow {
    pub id: String,
    pub title: String,
    pub year: Option<i64>,
    pub collections: Option<String>, // JSON array string
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EpisodeRow {
    pub id: String,
    pub series_id: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomOrderRow {
    pub id: String,
    pub name: String,
    pub is_active: i64,
}

/// Flat storage shape of a custom order item; only the columns of its media
/// type are populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomOrderItemRow {
    pub id: String,
    pub order_id: String,
    pub media_type: String,
    pub sort_order: i64,
    pub is_watched: i64,
    pub title: String,
    pub plex_key: Option<String>,
    pub series_id: Option<String>,
    pub series_title: Option<String>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
    pub book_page_count: Option<i64>,
    pub book_current_page: Option<i64>,
    pub book_percent_read: Option<f64>,
    pub comic_series: Option<String>,
    pub comic_year: Option<i64>,
    pub comic_issue: Option<String>,
    pub containing_book_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub media_type: String,
    pub activity_type: String,
    pub subject_key: String,
    pub title: String,
    pub series_id: Option<String>,
    pub series_title: Option<String>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
    pub start_time: String, // RFC 3339
    pub end_time: Option<String>,
    pub total_watch_time: i64,
    pub is_completed: i64,
    pub is_paused: i64,
}

// The Any driver cannot decode NULL into Option<T>, so nullable columns are
// read through COALESCE with '' / -1 placeholders. mapping.rs maps them back.
const SESSION_COLUMNS: &str = "id, media_type, activity_type, subject_key, title, \
    COALESCE(series_id, '') AS series_id, COALESCE(series_title, '') AS series_title, \
    COALESCE(season_number, -1) AS season_number, COALESCE(episode_number, -1) AS episode_number, \
    start_time, COALESCE(end_time, '') AS end_time, total_watch_time, is_completed, is_paused";

const ITEM_COLUMNS: &str = "id, order_id, media_type, sort_order, is_watched, title, \
    COALESCE(plex_key, '') AS plex_key, COALESCE(series_id, '') AS series_id, \
    COALESCE(series_title, '') AS series_title, COALESCE(season_number, -1) AS season_number, \
    COALESCE(episode_number, -1) AS episode_number, COALESCE(book_page_count, -1) AS book_page_count, \
    COALESCE(book_current_page, -1) AS book_current_page, COALESCE(book_percent_read, -1.0) AS book_percent_read, \
    COALESCE(comic_series, '') AS comic_series, COALESCE(comic_year, -1) AS comic_year, \
    COALESCE(comic_issue, '') AS comic_issue, COALESCE(containing_book_id, '') AS containing_book_id";

const MOVIE_COLUMNS: &str =
    "m.id, m.title, COALESCE(m.year, -1) AS year, COALESCE(m.collections, '') AS collections";

const EPISODE_COLUMNS: &str =
    "e.id, e.series_id, e.season_number, e.episode_number, COALESCE(e.title, '') AS title";

/// A session is running while it is neither completed, paused, nor carrying
/// an end time. Must agree with `idx_sessions_one_running`.
const RUNNING: &str = "is_completed = 0 AND is_paused = 0 AND end_time IS NULL";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// --- Settings ---

pub async fn ensure_settings(pool: &AnyPool) -> Result<()> {
    sqlx::query("INSERT INTO settings(id) VALUES(1) ON CONFLICT(id) DO NOTHING")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_settings(pool: &AnyPool) -> Result<Option<SettingsRow>> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT tv_general_percent, movies_general_percent, custom_order_percent, partially_watched_collection_percent
         FROM settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn update_settings(pool: &AnyPool, u: &SettingsUpdate) -> Result<()> {
    ensure_settings(pool).await?;
    sqlx::query(
        "UPDATE settings SET
           tv_general_percent = COALESCE(?, tv_general_percent),
           movies_general_percent = COALESCE(?, movies_general_percent),
           custom_order_percent = COALESCE(?, custom_order_percent),
           partially_watched_collection_percent = COALESCE(?, partially_watched_collection_percent),
           updated_at = CURRENT_TIMESTAMP
         WHERE id = 1",
    )
    .bind(u.tv_general_percent.map(i64::from))
    .bind(u.movies_general_percent.map(i64::from))
    .bind(u.custom_order_percent.map(i64::from))
    .bind(u.partially_watched_collection_percent.map(i64::from))
    .execute(pool)
    .await?;
    Ok(())
}

// --- Movies ---

pub async fn upsert_movie(pool: &AnyPool, m: &MovieRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO movies(id, title, year, collections) VALUES(?, ?, ?, ?)\n         ON CONFLICT(id) DO UPDATE SET\n           title=excluded.title, year=excluded.year, collections=excluded.collections, updated_at=CURRENT_TIMESTAMP",
    )
    .bind(&m.id)
    .bind(&m.title)
    .bind(m.year)
    .bind(&m.collections)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_unwatched_movies(pool: &AnyPool) -> Result<Vec<MovieRow>> {
    let sql = format!(
        "SELECT {MOVIE_COLUMNS} FROM movies m
         WHERE NOT EXISTS (
           SELECT 1 FROM sessions s WHERE s.subject_key = 'plex:' || m.id AND s.is_completed = 1
         )
         ORDER BY m.title"
    );
    let rows = sqlx::query_as::<_, MovieRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Prefilters on the JSON text; callers still check exact membership.
pub async fn list_unwatched_movies_in_collection(pool: &AnyPool, collection: &str) -> Result<Vec<MovieRow>> {
    let needle = format!("%{}%", serde_json::to_string(collection)?);
    let sql = format!(
        "SELECT {MOVIE_COLUMNS} FROM movies m
         WHERE m.collections LIKE ?
           AND NOT EXISTS (
             SELECT 1 FROM sessions s WHERE s.subject_key = 'plex:' || m.id AND s.is_completed = 1
           )
         ORDER BY m.year NULLS LAST, m.title"
    );
    let rows = sqlx::query_as::<_, MovieRow>(&sql)
        .bind(needle)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// --- Series / episodes ---

pub async fn upsert_series(pool: &AnyPool, id: &str, title: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO series(id, title) VALUES(?, ?)\n         ON CONFLICT(id) DO UPDATE SET title=excluded.title, updated_at=CURRENT_TIMESTAMP",
    )
    .bind(id)
    .bind(title)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_episode(pool: &AnyPool, e: &EpisodeRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO episodes(id, series_id, season_number, episode_number, title) VALUES(?, ?, ?, ?, ?)\n         ON CONFLICT(id) DO UPDATE SET\n           series_id=excluded.series_id, season_number=excluded.season_number,\n           episode_number=excluded.episode_number, title=excluded.title, updated_at=CURRENT_TIMESTAMP",
    )
    .bind(&e.id)
    .bind(&e.series_id)
    .bind(e.season_number)
    .bind(e.episode_number)
    .bind(&e.title)
    .execute(pool)
    .await
    .with_context(|| format!("upserting episode {} of series {}", e.id, e.series_id))?;
    Ok(())
}

pub async fn list_series(pool: &AnyPool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT id, title FROM series ORDER BY title")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_series(pool: &AnyPool, series_id: &str) -> Result<Option<(String, String)>> {
    let row = sqlx::query_as::<_, (String, String)>("SELECT id, title FROM series WHERE id = ?")
        .bind(series_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_series_by_title(pool: &AnyPool, title: &str) -> Result<Option<(String, String)>> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT id, title FROM series WHERE title = ? COLLATE NOCASE ORDER BY id LIMIT 1",
    )
    .bind(title.trim())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_episodes_for_series(pool: &AnyPool, series_id: &str) -> Result<Vec<EpisodeRow>> {
    let sql = format!(
        "SELECT {EPISODE_COLUMNS} FROM episodes e
         WHERE e.series_id = ? ORDER BY e.season_number, e.episode_number"
    );
    let rows = sqlx::query_as::<_, EpisodeRow>(&sql)
        .bind(series_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_unwatched_episodes(pool: &AnyPool, series_id: &str) -> Result<Vec<EpisodeRow>> {
    let sql = format!(
        "SELECT {EPISODE_COLUMNS} FROM episodes e
         WHERE e.series_id = ?
           AND NOT EXISTS (
             SELECT 1 FROM sessions s WHERE s.subject_key = 'plex:' || e.id AND s.is_completed = 1
           )
         ORDER BY e.season_number, e.episode_number"
    );
    let rows = sqlx::query_as::<_, EpisodeRow>(&sql)
        .bind(series_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// --- Custom orders ---

pub async fn upsert_custom_order(pool: &AnyPool, order: &CustomOrderRow, items: &[CustomOrderItemRow]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO custom_orders(id, name, is_active) VALUES(?, ?, ?)\n         ON CONFLICT(id) DO UPDATE SET name=excluded.name, is_active=excluded.is_active, updated_at=CURRENT_TIMESTAMP",
    )
    .bind(&order.id)
    .bind(&order.name)
    .bind(order.is_active)
    .execute(&mut *tx)
    .await?;

    // The item list replaces the stored one
    let mut delete = String::from("DELETE FROM custom_order_items WHERE order_id = ?");
    if !items.is_empty() {
        let marks = vec!["?"; items.len()].join(", ");
        delete.push_str(&format!(" AND id NOT IN ({marks})"));
    }
    let mut q = sqlx::query(&delete).bind(&order.id);
    for it in items {
        q = q.bind(&it.id);
    }
    q.execute(&mut *tx).await?;

    // Park surviving positions below zero so reordering cannot trip UNIQUE(order_id, sort_order)
    sqlx::query("UPDATE custom_order_items SET sort_order = -1 - sort_order WHERE order_id = ?")
        .bind(&order.id)
        .execute(&mut *tx)
        .await?;

    for it in items {
        sqlx::query(
            "INSERT INTO custom_order_items(\n            id, order_id, media_type, sort_order, is_watched, title, plex_key, series_id, series_title,\n            season_number, episode_number, book_page_count, book_current_page, book_percent_read,\n            comic_series, comic_year, comic_issue, containing_book_id\n         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)\n         ON CONFLICT(id) DO UPDATE SET\n           order_id=excluded.order_id, media_type=excluded.media_type, sort_order=excluded.sort_order,\n           is_watched=MAX(custom_order_items.is_watched, excluded.is_watched), title=excluded.title,\n           plex_key=excluded.plex_key, series_id=excluded.series_id, series_title=excluded.series_title,\n           season_number=excluded.season_number, episode_number=excluded.episode_number,\n           book_page_count=excluded.book_page_count, book_current_page=excluded.book_current_page,\n           book_percent_read=excluded.book_percent_read, comic_series=excluded.comic_series,\n           comic_year=excluded.comic_year, comic_issue=excluded.comic_issue,\n           containing_book_id=excluded.containing_book_id, updated_at=CURRENT_TIMESTAMP",
        )
        .bind(&it.id)
        .bind(&order.id)
        .bind(&it.media_type)
        .bind(it.sort_order)
        .bind(it.is_watched)
        .bind(&it.title)
        .bind(&it.plex_key)
        .bind(&it.series_id)
        .bind(&it.series_title)
        .bind(it.season_number)
        .bind(it.episode_number)
        .bind(it.book_page_count)
        .bind(it.book_current_page)
        .bind(it.book_percent_read)
        .bind(&it.comic_series)
        .bind(it.comic_year)
        .bind(&it.comic_issue)
        .bind(&it.containing_book_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("upserting custom order item {} (sort order {})", it.id, it.sort_order))?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn list_active_custom_orders(pool: &AnyPool) -> Result<Vec<CustomOrderRow>> {
    let rows = sqlx::query_as::<_, CustomOrderRow>(
        "SELECT id, name, is_active FROM custom_orders WHERE is_active = 1 ORDER BY name, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_items_for_order(pool: &AnyPool, order_id: &str) -> Result<Vec<CustomOrderItemRow>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM custom_order_items WHERE order_id = ? ORDER BY sort_order");
    let rows = sqlx::query_as::<_, CustomOrderItemRow>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_custom_order_item(pool: &AnyPool, item_id: &str) -> Result<Option<CustomOrderItemRow>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM custom_order_items WHERE id = ? LIMIT 1");
    let row = sqlx::query_as::<_, CustomOrderItemRow>(&sql)
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn mark_custom_order_item_watched(pool: &AnyPool, item_id: &str) -> Result<u64> {
    let res = sqlx::query("UPDATE custom_order_items SET is_watched = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn set_book_progress(
    pool: &AnyPool,
    item_id: &str,
    page_count: Option<i64>,
    current_page: i64,
    percent_read: f64,
    mark_watched: bool,
) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE custom_order_items SET
           book_page_count = COALESCE(?, book_page_count),
           book_current_page = ?,
           book_percent_read = ?,
           is_watched = MAX(is_watched, ?),
           updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND media_type = 'book'",
    )
    .bind(page_count)
    .bind(current_page)
    .bind(percent_read)
    .bind(mark_watched as i64)
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

// --- Sessions ---

/// Conditional insert: succeeds only when no running session exists for the
/// subject. Returns false on conflict.
pub async fn insert_session_if_idle(pool: &AnyPool, s: &SessionRow) -> Result<bool> {
    let sql = format!(
        "INSERT INTO sessions(\n            id, media_type, activity_type, subject_key, title, series_id, series_title,\n            season_number, episode_number, start_time, end_time, total_watch_time, is_completed, is_paused\n         )\n         SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?\n         WHERE NOT EXISTS (\n           SELECT 1 FROM sessions WHERE subject_key = ? AND {RUNNING}\n         )"
    );
    let res = sqlx::query(&sql)
        .bind(&s.id)
        .bind(&s.media_type)
        .bind(&s.activity_type)
        .bind(&s.subject_key)
        .bind(&s.title)
        .bind(&s.series_id)
        .bind(&s.series_title)
        .bind(s.season_number)
        .bind(s.episode_number)
        .bind(&s.start_time)
        .bind(&s.end_time)
        .bind(s.total_watch_time)
        .bind(s.is_completed)
        .bind(s.is_paused)
        .bind(&s.subject_key)
        .execute(pool)
        .await;
    match res {
        Ok(r) => Ok(r.rows_affected() == 1),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e).context("inserting session"),
    }
}

pub async fn get_session(pool: &AnyPool, id: &str) -> Result<Option<SessionRow>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ? LIMIT 1");
    let row = sqlx::query_as::<_, SessionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Toggles the paused flag of an unfinished session and clears any legacy
/// end time. Resuming is refused when another session for the same subject
/// is already running.
pub async fn set_session_paused(pool: &AnyPool, id: &str, paused: bool) -> Result<bool> {
    let paused = paused as i64;
    let sql = format!(
        "UPDATE sessions SET is_paused = ?, end_time = NULL
         WHERE id = ? AND is_completed = 0
           AND (? = 1 OR NOT EXISTS (
             SELECT 1 FROM sessions o
             WHERE o.subject_key = sessions.subject_key AND o.id <> sessions.id AND {RUNNING}
           ))"
    );
    let res = sqlx::query(&sql)
        .bind(paused)
        .bind(id)
        .bind(paused)
        .execute(pool)
        .await;
    match res {
        Ok(r) => Ok(r.rows_affected() == 1),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e).context("updating session pause state"),
    }
}

pub async fn complete_session(pool: &AnyPool, id: &str, end_time: &str, add_minutes: i64) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE sessions SET end_time = ?, is_completed = 1, is_paused = 0,
           total_watch_time = total_watch_time + ?
         WHERE id = ? AND is_completed = 0",
    )
    .bind(end_time)
    .bind(add_minutes)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn delete_session(pool: &AnyPool, id: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn list_sessions(
    pool: &AnyPool,
    subject_key: Option<&str>,
    active_only: bool,
    limit: Option<usize>,
) -> Result<Vec<SessionRow>> {
    let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE 1 = 1");
    if subject_key.is_some() {
        sql.push_str(" AND subject_key = ?");
    }
    if active_only {
        sql.push_str(" AND is_completed = 0");
    }
    sql.push_str(" ORDER BY start_time DESC, id");
    if limit.is_some() {
        sql.push_str(" LIMIT ?");
    }

    let mut q = sqlx::query_as::<_, SessionRow>(&sql);
    if let Some(k) = subject_key {
        q = q.bind(k);
    }
    if let Some(n) = limit {
        q = q.bind(n as i64);
    }
    Ok(q.fetch_all(pool).await?)
}

pub async fn list_completed_episodes(pool: &AnyPool, series_id: &str) -> Result<Vec<(i64, i64)>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT season_number, episode_number FROM sessions
         WHERE series_id = ? AND is_completed = 1
           AND season_number IS NOT NULL AND episode_number IS NOT NULL",
    )
    .bind(series_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
