use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three pools selection weights are distributed over, in roll order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tv,
    Movies,
    CustomOrder,
}

impl Category {
    /// Fixed order used for cumulative weight ranges and tie-breaks.
    pub const ALL: [Category; 3] = [Category::Tv, Category::Movies, Category::CustomOrder];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tv => "tv",
            Category::Movies => "movies",
            Category::CustomOrder => "custom_order",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Book,
    Comic,
    #[serde(rename = "shortstory")]
    ShortStory,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Book => "book",
            MediaType::Comic => "comic",
            MediaType::ShortStory => "shortstory",
        }
    }

    /// Movies and TV are watched; everything else is read.
    pub fn activity(&self) -> ActivityType {
        match self {
            MediaType::Movie | MediaType::Tv => ActivityType::Watch,
            MediaType::Book | MediaType::Comic | MediaType::ShortStory => ActivityType::Read,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv" | "episode" => Ok(MediaType::Tv),
            "book" => Ok(MediaType::Book),
            "comic" => Ok(MediaType::Comic),
            "shortstory" | "short_story" => Ok(MediaType::ShortStory),
            other => Err(anyhow::anyhow!("unknown media type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Watch,
    Read,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Watch => "watch",
            ActivityType::Read => "read",
        }
    }
}

impl FromStr for ActivityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watch" => Ok(ActivityType::Watch),
            "read" => Ok(ActivityType::Read),
            other => Err(anyhow::anyhow!("unknown activity type: {other}")),
        }
    }
}

// --- Settings ---

/// Category weights as stored. Values need not sum to 100; the selection
/// engine normalizes them over the categories that have candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub tv_general_percent: u32,
    pub movies_general_percent: u32,
    pub custom_order_percent: u32,
    pub partially_watched_collection_percent: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tv_general_percent: 40,
            movies_general_percent: 40,
            custom_order_percent: 20,
            partially_watched_collection_percent: 50,
        }
    }
}

impl Settings {
    pub fn weight(&self, category: Category) -> u32 {
        match category {
            Category::Tv => self.tv_general_percent,
            Category::Movies => self.movies_general_percent,
            Category::CustomOrder => self.custom_order_percent,
        }
    }

    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.tv_general_percent { self.tv_general_percent = v; }
        if let Some(v) = update.movies_general_percent { self.movies_general_percent = v; }
        if let Some(v) = update.custom_order_percent { self.custom_order_percent = v; }
        if let Some(v) = update.partially_watched_collection_percent { self.partially_watched_collection_percent = v; }
    }
}

/// Partial settings write; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub tv_general_percent: Option<u32>,
    pub movies_general_percent: Option<u32>,
    pub custom_order_percent: Option<u32>,
    pub partially_watched_collection_percent: Option<u32>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.tv_general_percent.is_none()
            && self.movies_general_percent.is_none()
            && self.custom_order_percent.is_none()
            && self.partially_watched_collection_percent.is_none()
    }
}

// --- Catalog ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    /// Plex key; doubles as the session subject key.
    pub id: String,
    pub title: String,
    pub year: Option<i64>,
    #[serde(default)]
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub series_id: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub number: i64,
    pub episodes: Vec<Episode>,
}

/// A series with its seasons and episodes in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub title: String,
    pub seasons: Vec<Season>,
}

impl Series {
    /// Builds the season layout from a flat episode list in any order.
    pub fn from_episodes(id: String, title: String, mut episodes: Vec<Episode>) -> Self {
        episodes.sort_by_key(|e| (e.season_number, e.episode_number));
        let mut seasons: Vec<Season> = Vec::new();
        for ep in episodes {
            match seasons.last_mut() {
                Some(s) if s.number == ep.season_number => {
                    if s.episodes.last().map(|l| l.episode_number) != Some(ep.episode_number) {
                        s.episodes.push(ep);
                    }
                }
                _ => seasons.push(Season { number: ep.season_number, episodes: vec![ep] }),
            }
        }
        Self { id, title, seasons }
    }

    pub fn episode_count(&self) -> usize { self.seasons.iter().map(|s| s.episodes.len()).sum() }
}

/// A resolved "next episode" pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRef {
    pub series_id: String,
    pub series_title: String,
    pub episode_id: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: Option<String>,
}

impl EpisodeRef {
    /// Episode title, or `"Series S01E02"` when the episode has none.
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(t) => t.clone(),
            None => format!("{} S{:02}E{:02}", self.series_title, self.season_number, self.episode_number),
        }
    }
}

// --- Custom orders ---

/// Page progress through a book item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookProgress {
    pub page_count: Option<i64>,
    #[serde(default)]
    pub current_page: i64,
    #[serde(default)]
    pub percent_read: f64,
}

impl BookProgress {
    pub fn new(page_count: Option<i64>, current_page: i64) -> Self {
        let page_count = page_count.filter(|p| *p > 0);
        let current_page = match page_count {
            Some(total) => current_page.clamp(0, total),
            None => current_page.max(0),
        };
        let percent_read = match page_count {
            Some(total) => ((current_page as f64 / total as f64) * 1000.0).round() / 10.0,
            None => 0.0,
        };
        Self { page_count, current_page, percent_read }
    }

    /// Next page to read, or `None` once the last page has been reached.
    pub fn next_page(&self) -> Option<i64> {
        match self.page_count {
            Some(total) if self.current_page >= total => None,
            _ => Some(self.current_page + 1),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.page_count, Some(total) if self.current_page >= total)
    }
}

/// Media-type specific payload of a custom order item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mediaType", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ItemPayload {
    Movie {
        plex_key: Option<String>,
    },
    Tv {
        plex_key: Option<String>,
        series_id: Option<String>,
        series_title: Option<String>,
        season_number: Option<i64>,
        episode_number: Option<i64>,
    },
    Book(BookProgress),
    Comic {
        series: String,
        year: Option<i64>,
        issue: Option<String>,
    },
    #[serde(rename = "shortstory")]
    ShortStory {
        containing_book_id: Option<String>,
    },
}

impl ItemPayload {
    pub fn media_type(&self) -> MediaType {
        match self {
            ItemPayload::Movie { .. } => MediaType::Movie,
            ItemPayload::Tv { .. } => MediaType::Tv,
            ItemPayload::Book(_) => MediaType::Book,
            ItemPayload::Comic { .. } => MediaType::Comic,
            ItemPayload::ShortStory { .. } => MediaType::ShortStory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrderItem {
    pub id: String,
    #[serde(default)]
    pub order_id: String,
    pub sort_order: i64,
    #[serde(default)]
    pub is_watched: bool,
    pub title: String,
    pub payload: ItemPayload,
}

impl CustomOrderItem {
    pub fn media_type(&self) -> MediaType { self.payload.media_type() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrder {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    /// Ascending by `sort_order`.
    #[serde(default)]
    pub items: Vec<CustomOrderItem>,
}

impl CustomOrder {
    /// The unwatched item with the smallest sort order.
    pub fn next_unwatched(&self) -> Option<&CustomOrderItem> {
        self.items.iter().filter(|i| !i.is_watched).min_by_key(|i| i.sort_order)
    }
}

// --- Sessions ---

/// What a session is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectRef {
    Catalog { plex_key: String },
    CustomOrderItem { item_id: String },
}

impl SubjectRef {
    /// Stable string form used as the uniqueness key in storage.
    pub fn key(&self) -> String {
        match self {
            SubjectRef::Catalog { plex_key } => format!("plex:{plex_key}"),
            SubjectRef::CustomOrderItem { item_id } => format!("order-item:{item_id}"),
        }
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        if let Some(k) = key.strip_prefix("plex:") {
            return Some(SubjectRef::Catalog { plex_key: k.to_string() });
        }
        key.strip_prefix("order-item:").map(|id| SubjectRef::CustomOrderItem { item_id: id.to_string() })
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.key()) }
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSubject {
    pub subject: SubjectRef,
    pub media_type: MediaType,
    pub title: String,
    pub series_id: Option<String>,
    pub series_title: Option<String>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
}

impl SessionSubject {
    pub fn movie(movie: &Movie) -> Self {
        Self {
            subject: SubjectRef::Catalog { plex_key: movie.id.clone() },
            media_type: MediaType::Movie,
            title: movie.title.clone(),
            series_id: None,
            series_title: None,
            season_number: None,
            episode_number: None,
        }
    }

    pub fn episode(ep: &EpisodeRef) -> Self {
        Self {
            subject: SubjectRef::Catalog { plex_key: ep.episode_id.clone() },
            media_type: MediaType::Tv,
            title: ep.display_title(),
            series_id: Some(ep.series_id.clone()),
            series_title: Some(ep.series_title.clone()),
            season_number: Some(ep.season_number),
            episode_number: Some(ep.episode_number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Paused,
    Completed,
}

/// A recorded interval of consumption (a watch log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub media_type: MediaType,
    pub activity_type: ActivityType,
    pub subject: SubjectRef,
    pub title: String,
    pub series_id: Option<String>,
    pub series_title: Option<String>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Cumulative minutes.
    pub total_watch_time: i64,
    pub is_completed: bool,
    pub is_paused: bool,
}

impl Session {
    pub fn state(&self) -> SessionState {
        if self.is_completed {
            SessionState::Completed
        } else if self.is_paused || self.end_time.is_some() {
            // An unfinished session with an end time is a legacy pause.
            SessionState::Paused
        } else {
            SessionState::Active
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub subject: Option<SubjectRef>,
    pub active_only: bool,
    pub limit: Option<usize>,
}

// --- Selection output ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkRef {
    pub url: String,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicDetails {
    pub series: String,
    pub year: Option<i64>,
    pub issue: Option<String>,
    pub title: Option<String>,
    pub cover_url: Option<String>,
    pub description: Option<String>,
}

/// Lookup context handed to the artwork resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkContext {
    pub media_type: MediaType,
    pub title: String,
    pub series_title: Option<String>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
}

impl ArtworkContext {
    pub fn cache_key(&self) -> String {
        format!(
            "artwork|{}|{}|{}|{}|{}",
            self.media_type,
            self.title.trim().to_ascii_lowercase(),
            self.series_title.as_deref().unwrap_or("").trim().to_ascii_lowercase(),
            self.season_number.map(|n| n.to_string()).unwrap_or_default(),
            self.episode_number.map(|n| n.to_string()).unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub artwork: Option<ArtworkRef>,
    pub comic: Option<ComicDetails>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool { self.artwork.is_none() && self.comic.is_none() }
}

/// Normalized "what to watch/read next" descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextItem {
    pub category: Category,
    pub media_type: MediaType,
    pub subject: SubjectRef,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_order: Option<String>,
    /// Collection that led to this pick, when a movie collection was continued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ItemPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl NextItem {
    pub fn from_episode(category: Category, ep: &EpisodeRef) -> Self {
        Self {
            category,
            media_type: MediaType::Tv,
            subject: SubjectRef::Catalog { plex_key: ep.episode_id.clone() },
            title: ep.display_title(),
            series_id: Some(ep.series_id.clone()),
            series_title: Some(ep.series_title.clone()),
            season_number: Some(ep.season_number),
            episode_number: Some(ep.episode_number),
            sort_order: None,
            custom_order: None,
            collection: None,
            payload: None,
            enrichment: None,
            warning: None,
        }
    }

    pub fn from_movie(movie: &Movie) -> Self {
        Self {
            category: Category::Movies,
            media_type: MediaType::Movie,
            subject: SubjectRef::Catalog { plex_key: movie.id.clone() },
            title: movie.title.clone(),
            series_id: None,
            series_title: None,
            season_number: None,
            episode_number: None,
            sort_order: None,
            custom_order: None,
            collection: None,
            payload: None,
            enrichment: None,
            warning: None,
        }
    }

    pub fn from_custom_order_item(order: &CustomOrder, item: &CustomOrderItem) -> Self {
        let (series_id, series_title, season_number, episode_number) = match &item.payload {
            ItemPayload::Tv { series_id, series_title, season_number, episode_number, .. } => {
                (series_id.clone(), series_title.clone(), *season_number, *episode_number)
            }
            _ => (None, None, None, None),
        };
        Self {
            category: Category::CustomOrder,
            media_type: item.media_type(),
            subject: SubjectRef::CustomOrderItem { item_id: item.id.clone() },
            title: item.title.clone(),
            series_id,
            series_title,
            season_number,
            episode_number,
            sort_order: Some(item.sort_order),
            custom_order: Some(order.name.clone()),
            collection: None,
            payload: Some(item.payload.clone()),
            enrichment: None,
            warning: None,
        }
    }

    /// Session subject for starting playback/reading of this item.
    pub fn session_subject(&self) -> SessionSubject {
        SessionSubject {
            subject: self.subject.clone(),
            media_type: self.media_type,
            title: self.title.clone(),
            series_id: self.series_id.clone(),
            series_title: self.series_title.clone(),
            season_number: self.season_number,
            episode_number: self.episode_number,
        }
    }

    pub fn artwork_context(&self) -> ArtworkContext {
        ArtworkContext {
            media_type: self.media_type,
            title: self.title.clone(),
            series_title: self.series_title.clone(),
            season_number: self.season_number,
            episode_number: self.episode_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(season: i64, episode: i64) -> Episode {
        Episode { id: format!("e{season}-{episode}"), series_id: "s".into(), season_number: season, episode_number: episode, title: None }
    }

    #[test]
    fn series_layout_sorts_and_groups_episodes() {
        let series = Series::from_episodes("s".into(), "Show".into(), vec![ep(2, 1), ep(1, 2), ep(1, 1), ep(1, 2)]);
        assert_eq!(series.seasons.len(), 2);
        assert_eq!(series.seasons[0].number, 1);
        assert_eq!(series.seasons[0].episodes.iter().map(|e| e.episode_number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(series.episode_count(), 3);
    }

    #[test]
    fn book_progress_clamps_and_reports_next_page() {
        let p = BookProgress::new(Some(200), 250);
        assert_eq!(p.current_page, 200);
        assert!(p.is_finished());
        assert_eq!(p.next_page(), None);

        let p = BookProgress::new(Some(200), 50);
        assert_eq!(p.percent_read, 25.0);
        assert_eq!(p.next_page(), Some(51));

        let unknown = BookProgress::new(None, 10);
        assert!(!unknown.is_finished());
        assert_eq!(unknown.percent_read, 0.0);
    }

    #[test]
    fn subject_keys_parse_back() {
        let a = SubjectRef::Catalog { plex_key: "123".into() };
        let b = SubjectRef::CustomOrderItem { item_id: "abc".into() };
        assert_eq!(SubjectRef::parse_key(&a.key()), Some(a));
        assert_eq!(SubjectRef::parse_key(&b.key()), Some(b));
        assert_eq!(SubjectRef::parse_key("bogus"), None);
    }

    #[test]
    fn legacy_paused_row_with_end_time_is_resumable() {
        let s = Session {
            id: "1".into(),
            media_type: MediaType::Movie,
            activity_type: ActivityType::Watch,
            subject: SubjectRef::Catalog { plex_key: "m".into() },
            title: "M".into(),
            series_id: None,
            series_title: None,
            season_number: None,
            episode_number: None,
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            total_watch_time: 0,
            is_completed: false,
            is_paused: false,
        };
        assert_eq!(s.state(), SessionState::Paused);
    }

    #[test]
    fn untitled_episode_reads_the_same_everywhere() {
        let ep = EpisodeRef {
            series_id: "s".into(),
            series_title: "Show".into(),
            episode_id: "s-s1e2".into(),
            season_number: 1,
            episode_number: 2,
            title: None,
        };
        assert_eq!(ep.display_title(), "Show S01E02");
        assert_eq!(NextItem::from_episode(Category::Tv, &ep).title, SessionSubject::episode(&ep).title);
    }

    #[test]
    fn item_payload_fields_are_camel_case() {
        let tv = ItemPayload::Tv {
            plex_key: Some("k".into()),
            series_id: None,
            series_title: Some("Show".into()),
            season_number: Some(1),
            episode_number: None,
        };
        let json = serde_json::to_value(&tv).unwrap();
        assert_eq!(json["mediaType"], "tv");
        assert_eq!(json["plexKey"], "k");
        assert_eq!(json["seriesTitle"], "Show");
        assert_eq!(json["seasonNumber"], 1);

        let story: ItemPayload =
            serde_json::from_str(r#"{"mediaType":"shortstory","containingBookId":"b1"}"#).unwrap();
        assert_eq!(story, ItemPayload::ShortStory { containing_book_id: Some("b1".into()) });
    }

    #[test]
    fn media_type_activity() {
        assert_eq!(MediaType::Tv.activity(), ActivityType::Watch);
        assert_eq!(MediaType::Comic.activity(), ActivityType::Read);
        assert_eq!("shortstory".parse::<MediaType>().unwrap(), MediaType::ShortStory);
    }
}
