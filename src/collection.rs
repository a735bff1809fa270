//! Movie collection continuation.
//!
//! A movie that belongs to a collection may lead either to a TV series of the
//! same name (continued through [`crate::progression`]) or to the next
//! unwatched movie in that collection.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NextupError, Result};
use crate::progression;
use crate::storage::{CatalogStore, SessionStore};
use crate::types::{EpisodeRef, Movie, Settings};

const COLLECTION_SUFFIX: &str = " Collection";

/// Outcome of considering a movie's collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ContinuationDecision {
    /// Treat the movie on its own.
    Standalone,
    /// A series matching the collection name has a next episode.
    Series { collection: String, episode: EpisodeRef },
    /// Next unwatched movie of the same collection.
    Movie { collection: String, movie: Movie },
}

/// Names to look a collection up under: the raw name, plus the name with a
/// trailing " Collection" stripped. Never appends the suffix.
pub fn search_variants(collection: &str) -> Vec<String> {
    let raw = collection.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let mut out = vec![raw.to_string()];
    if let Some(stripped) = raw.strip_suffix(COLLECTION_SUFFIX).map(str::trim_end) {
        if !stripped.is_empty() && !out.iter().any(|v| v == stripped) {
            out.push(stripped.to_string());
        }
    }
    out
}

/// Weighted coin: true with `percent`% probability.
pub fn roll_continue<R: Rng>(percent: u32, rng: &mut R) -> bool {
    match percent {
        0 => false,
        p if p >= 100 => true,
        p => rng.random_range(0..100u32) < p,
    }
}

/// Decides whether picking `movie` should instead continue one of its
/// collections.
pub async fn resolve_collection_continuation<C, S, R>(
    catalog: &C,
    sessions: &S,
    movie: &Movie,
    settings: &Settings,
    rng: &mut R,
) -> Result<ContinuationDecision>
where
    C: CatalogStore + ?Sized,
    S: SessionStore + ?Sized,
    R: Rng + Send,
{
    if movie.collections.is_empty() {
        return Ok(ContinuationDecision::Standalone);
    }
    if !roll_continue(settings.partially_watched_collection_percent, rng) {
        debug!(movie = %movie.title, "collection continuation not rolled");
        return Ok(ContinuationDecision::Standalone);
    }

    for collection in &movie.collections {
        for variant in search_variants(collection) {
            let Some(series) = catalog.find_series_by_title(&variant).await? else { continue };
            match progression::next_episode(catalog, sessions, &series.id).await {
                Ok(episode) => {
                    debug!(%collection, %variant, series = %series.title, "continuing collection as series");
                    return Ok(ContinuationDecision::Series { collection: collection.clone(), episode });
                }
                Err(e) if e.is_exhaustion() || matches!(e, NextupError::NotFound { .. }) => {
                    debug!(%collection, %variant, error = %e, "matching series has nothing left");
                }
                Err(e) => return Err(e),
            }
        }

        let candidates = catalog.list_unwatched_movies_in_collection(collection).await?;
        if let Some(next) = candidates.into_iter().next() {
            debug!(%collection, next = %next.title, "continuing collection with next movie");
            return Ok(ContinuationDecision::Movie { collection: collection.clone(), movie: next });
        }
    }

    warn!(movie = %movie.title, "no continuation found for any collection; treating as standalone");
    Ok(ContinuationDecision::Standalone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn suffix_is_stripped() {
        assert_eq!(search_variants("Batman Collection"), vec!["Batman Collection", "Batman"]);
    }

    #[test]
    fn suffix_is_never_appended() {
        assert_eq!(search_variants("Batman"), vec!["Batman"]);
        assert_eq!(search_variants("  Batman  "), vec!["Batman"]);
    }

    #[test]
    fn bare_suffix_and_blank_names() {
        assert_eq!(search_variants("Collection"), vec!["Collection"]);
        assert!(search_variants("   ").is_empty());
    }

    #[test]
    fn coin_extremes_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..200).all(|_| !roll_continue(0, &mut rng)));
        assert!((0..200).all(|_| roll_continue(100, &mut rng)));
    }

    #[test]
    fn coin_tracks_percentage() {
        let mut rng = StdRng::seed_from_u64(11);
        let hits = (0..10_000).filter(|_| roll_continue(30, &mut rng)).count();
        assert!((2_700..3_300).contains(&hits), "hits = {hits}");
    }
}
