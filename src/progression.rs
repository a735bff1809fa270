//! Next-unit inference from session history.
//!
//! TV progression is driven purely by completed sessions: the furthest
//! `(season, episode)` pair ever completed marks the position, and the next
//! episode is its successor in the catalog layout.

use tracing::debug;

use crate::error::{NextupError, Result};
use crate::storage::{CatalogStore, SessionStore};
use crate::types::{Episode, EpisodeRef, Series};

/// Furthest completed pair under (season, episode) lexicographic order.
pub fn furthest_completed<I>(completed: I) -> Option<(i64, i64)>
where
    I: IntoIterator<Item = (i64, i64)>,
{
    completed.into_iter().max()
}

fn to_ref(series: &Series, ep: &Episode) -> EpisodeRef {
    EpisodeRef {
        series_id: series.id.clone(),
        series_title: series.title.clone(),
        episode_id: ep.id.clone(),
        season_number: ep.season_number,
        episode_number: ep.episode_number,
        title: ep.title.clone(),
    }
}

/// Resolves the episode following `position` in `series`.
///
/// With no position the series starts at the first episode of season 1, or
/// of the first regular season when season 1 is missing. Season 0 holds
/// specials and is never entered automatically.
pub fn successor(series: &Series, position: Option<(i64, i64)>) -> Result<EpisodeRef> {
    let all_watched = || NextupError::AllWatched { series_id: series.id.clone() };

    let Some((season, episode)) = position else {
        return series
            .seasons
            .iter()
            .filter(|s| s.number >= 1)
            .find_map(|s| s.episodes.first())
            .map(|ep| to_ref(series, ep))
            .ok_or_else(all_watched);
    };

    // Next episode within the same season
    if let Some(ep) = series
        .seasons
        .iter()
        .find(|s| s.number == season)
        .and_then(|s| s.episodes.iter().find(|e| e.episode_number > episode))
    {
        return Ok(to_ref(series, ep));
    }

    // Season exhausted: first episode of the following season
    series
        .seasons
        .iter()
        .filter(|s| s.number > season && s.number >= 1)
        .find_map(|s| s.episodes.first())
        .map(|ep| to_ref(series, ep))
        .ok_or_else(all_watched)
}

/// Next episode for a series, inferred from its completed sessions.
///
/// Idempotent absent new completions: it only reads.
pub async fn next_episode<C, S>(catalog: &C, sessions: &S, series_id: &str) -> Result<EpisodeRef>
where
    C: CatalogStore + ?Sized,
    S: SessionStore + ?Sized,
{
    let series = catalog
        .get_series(series_id)
        .await?
        .ok_or_else(|| NextupError::not_found("series", series_id))?;
    let completed = sessions.list_completed_episodes(series_id).await?;
    let position = furthest_completed(completed);
    let next = successor(&series, position)?;
    debug!(series = %series.title, ?position, season = next.season_number, episode = next.episode_number, "resolved next episode");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(layout: &[(i64, i64)]) -> Series {
        let mut episodes = Vec::new();
        for &(season, count) in layout {
            for n in 1..=count {
                episodes.push(Episode {
                    id: format!("s{season}e{n}"),
                    series_id: "show".into(),
                    season_number: season,
                    episode_number: n,
                    title: None,
                });
            }
        }
        Series::from_episodes("show".into(), "Show".into(), episodes)
    }

    fn pos(r: &EpisodeRef) -> (i64, i64) { (r.season_number, r.episode_number) }

    #[test]
    fn lexicographic_max_prefers_season() {
        assert_eq!(furthest_completed(vec![(1, 9), (2, 1), (1, 10)]), Some((2, 1)));
        assert_eq!(furthest_completed(Vec::new()), None);
    }

    #[test]
    fn no_history_starts_at_s1e1() {
        let s = series(&[(0, 2), (1, 3)]);
        assert_eq!(pos(&successor(&s, None).unwrap()), (1, 1));
    }

    #[test]
    fn advances_within_season() {
        let s = series(&[(1, 10)]);
        assert_eq!(pos(&successor(&s, Some((1, 5))).unwrap()), (1, 6));
    }

    #[test]
    fn rolls_over_to_next_season() {
        let s = series(&[(1, 3), (2, 4)]);
        assert_eq!(pos(&successor(&s, Some((1, 3))).unwrap()), (2, 1));
    }

    #[test]
    fn last_episode_of_last_season_is_all_watched() {
        let s = series(&[(1, 3), (2, 2)]);
        let err = successor(&s, Some((2, 2))).unwrap_err();
        assert!(matches!(err, NextupError::AllWatched { ref series_id } if series_id == "show"));
    }

    #[test]
    fn empty_series_is_all_watched() {
        let s = series(&[]);
        assert!(matches!(successor(&s, None), Err(NextupError::AllWatched { .. })));
    }

    #[test]
    fn gaps_in_numbering_skip_to_next_present_episode() {
        let mut s = series(&[(1, 2)]);
        s.seasons[0].episodes.push(Episode {
            id: "s1e5".into(),
            series_id: "show".into(),
            season_number: 1,
            episode_number: 5,
            title: None,
        });
        assert_eq!(pos(&successor(&s, Some((1, 2))).unwrap()), (1, 5));
    }
}
