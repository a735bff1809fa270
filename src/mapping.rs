use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::dao::{CustomOrderItemRow, CustomOrderRow, EpisodeRow, MovieRow, SessionRow, SettingsRow};
use crate::types::{
    BookProgress, CustomOrder, CustomOrderItem, Episode, ItemPayload, MediaType, Movie, Session,
    Settings, SubjectRef,
};

fn percent(v: i64) -> u32 { v.clamp(0, u32::MAX as i64) as u32 }

// Undo the COALESCE placeholders the dao reads nullable columns through.
fn text(v: Option<String>) -> Option<String> { v.filter(|s| !s.is_empty()) }

fn number(v: Option<i64>) -> Option<i64> { v.filter(|n| *n >= 0) }

fn fraction(v: Option<f64>) -> Option<f64> { v.filter(|n| *n >= 0.0) }

pub fn settings_from_row(r: SettingsRow) -> Settings {
    Settings {
        tv_general_percent: percent(r.tv_general_percent),
        movies_general_percent: percent(r.movies_general_percent),
        custom_order_percent: percent(r.custom_order_percent),
        partially_watched_collection_percent: percent(r.partially_watched_collection_percent),
    }
}

/// Collections are stored as a JSON string list; blank or malformed values
/// read back as "no collections".
pub fn collections_from_json(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else { return Vec::new() };
    let parsed: Vec<String> = serde_json::from_str(raw).unwrap_or_default();
    let mut out: Vec<String> = Vec::with_capacity(parsed.len());
    for name in parsed {
        let name = name.trim().to_string();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

pub fn collections_to_json(collections: &[String]) -> Option<String> {
    if collections.is_empty() {
        return None;
    }
    serde_json::to_string(collections).ok()
}

pub fn movie_from_row(r: MovieRow) -> Movie {
    let collections = collections_from_json(r.collections.as_deref());
    Movie { id: r.id, title: r.title, year: number(r.year), collections }
}

pub fn movie_to_row(m: &Movie) -> MovieRow {
    MovieRow {
        id: m.id.clone(),
        title: m.title.clone(),
        year: m.year,
        collections: collections_to_json(&m.collections),
    }
}

pub fn episode_from_row(r: EpisodeRow) -> Episode {
    Episode {
        id: r.id,
        series_id: r.series_id,
        season_number: r.season_number,
        episode_number: r.episode_number,
        title: text(r.title),
    }
}

pub fn episode_to_row(e: &Episode) -> EpisodeRow {
    EpisodeRow {
        id: e.id.clone(),
        series_id: e.series_id.clone(),
        season_number: e.season_number,
        episode_number: e.episode_number,
        title: e.title.clone(),
    }
}

/// Maps the flat row onto the tagged payload selected by `media_type`.
pub fn item_from_row(r: CustomOrderItemRow) -> Result<CustomOrderItem> {
    let media_type: MediaType = r.media_type.parse().with_context(|| format!("custom order item {}", r.id))?;
    let payload = match media_type {
        MediaType::Movie => ItemPayload::Movie { plex_key: text(r.plex_key) },
        MediaType::Tv => ItemPayload::Tv {
            plex_key: text(r.plex_key),
            series_id: text(r.series_id),
            series_title: text(r.series_title),
            season_number: number(r.season_number),
            episode_number: number(r.episode_number),
        },
        MediaType::Book => {
            let mut progress =
                BookProgress::new(number(r.book_page_count), number(r.book_current_page).unwrap_or(0));
            // Keep a stored percentage when the page count is unknown.
            if progress.page_count.is_none() {
                if let Some(p) = fraction(r.book_percent_read) {
                    progress.percent_read = p.clamp(0.0, 100.0);
                }
            }
            ItemPayload::Book(progress)
        }
        MediaType::Comic => ItemPayload::Comic {
            series: text(r.comic_series).unwrap_or_else(|| r.title.clone()),
            year: number(r.comic_year),
            issue: text(r.comic_issue),
        },
        MediaType::ShortStory => ItemPayload::ShortStory { containing_book_id: text(r.containing_book_id) },
    };
    Ok(CustomOrderItem {
        id: r.id,
        order_id: r.order_id,
        sort_order: r.sort_order,
        is_watched: r.is_watched != 0,
        title: r.title,
        payload,
    })
}

pub fn item_to_row(order_id: &str, item: &CustomOrderItem) -> CustomOrderItemRow {
    let mut row = CustomOrderItemRow {
        id: item.id.clone(),
        order_id: order_id.to_string(),
        media_type: item.media_type().as_str().to_string(),
        sort_order: item.sort_order,
        is_watched: item.is_watched as i64,
        title: item.title.clone(),
        ..Default::default()
    };
    match &item.payload {
        ItemPayload::Movie { plex_key } => row.plex_key = plex_key.clone(),
        ItemPayload::Tv { plex_key, series_id, series_title, season_number, episode_number } => {
            row.plex_key = plex_key.clone();
            row.series_id = series_id.clone();
            row.series_title = series_title.clone();
            row.season_number = *season_number;
            row.episode_number = *episode_number;
        }
        ItemPayload::Book(p) => {
            row.book_page_count = p.page_count;
            row.book_current_page = Some(p.current_page);
            row.book_percent_read = Some(p.percent_read);
        }
        ItemPayload::Comic { series, year, issue } => {
            row.comic_series = Some(series.clone());
            row.comic_year = *year;
            row.comic_issue = issue.clone();
        }
        ItemPayload::ShortStory { containing_book_id } => row.containing_book_id = containing_book_id.clone(),
    }
    row
}

pub fn order_from_rows(order: CustomOrderRow, items: Vec<CustomOrderItemRow>) -> Result<CustomOrder> {
    let mut items = items.into_iter().map(item_from_row).collect::<Result<Vec<_>>>()?;
    items.sort_by_key(|i| i.sort_order);
    Ok(CustomOrder { id: order.id, name: order.name, is_active: order.is_active != 0, items })
}

pub fn order_to_row(order: &CustomOrder) -> CustomOrderRow {
    CustomOrderRow { id: order.id.clone(), name: order.name.clone(), is_active: order.is_active as i64 }
}

/// Fixed-width UTC timestamps so TEXT ordering matches time ordering.
pub fn format_time(t: &DateTime<Utc>) -> String { t.to_rfc3339_opts(SecondsFormat::Micros, true) }

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp: {raw}"))?
        .with_timezone(&Utc))
}

pub fn session_from_row(r: SessionRow) -> Result<Session> {
    let subject = SubjectRef::parse_key(&r.subject_key)
        .ok_or_else(|| anyhow!("session {} has an unknown subject key: {}", r.id, r.subject_key))?;
    Ok(Session {
        media_type: r.media_type.parse()?,
        activity_type: r.activity_type.parse()?,
        subject,
        title: r.title,
        series_id: text(r.series_id),
        series_title: text(r.series_title),
        season_number: number(r.season_number),
        episode_number: number(r.episode_number),
        start_time: parse_time(&r.start_time)?,
        end_time: text(r.end_time).as_deref().map(parse_time).transpose()?,
        total_watch_time: r.total_watch_time,
        is_completed: r.is_completed != 0,
        is_paused: r.is_paused != 0,
        id: r.id,
    })
}

pub fn session_to_row(s: &Session) -> SessionRow {
    SessionRow {
        id: s.id.clone(),
        media_type: s.media_type.as_str().to_string(),
        activity_type: s.activity_type.as_str().to_string(),
        subject_key: s.subject.key(),
        title: s.title.clone(),
        series_id: s.series_id.clone(),
        series_title: s.series_title.clone(),
        season_number: s.season_number,
        episode_number: s.episode_number,
        start_time: format_time(&s.start_time),
        end_time: s.end_time.as_ref().map(format_time),
        total_watch_time: s.total_watch_time,
        is_completed: s.is_completed as i64,
        is_paused: s.is_paused as i64,
    }
}
