//! Weighted next-item selection across TV, movies and custom orders.
//!
//! The engine performs reads only. A category is rolled from the normalized
//! weights of the categories that currently have candidates, its picker is
//! invoked, and when the picker comes back empty the remaining categories are
//! tried in descending weight order.

use std::time::Duration;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::collection::{self, ContinuationDecision};
use crate::custom_order;
use crate::error::{NextupError, Result};
use crate::metadata::{self, MetadataCache};
use crate::progression;
use crate::storage::{CatalogStore, SessionStore};
use crate::types::{Category, CustomOrder, Movie, NextItem, SeriesSummary, Settings};

/// Share of the [0, 100) roll range owned by one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryWeight {
    pub category: Category,
    pub weight: f64,
}

/// Normalizes `(category, weight, eligible)` tuples so the eligible entries
/// sum to 100. Ineligible categories are dropped; when every eligible weight
/// is zero the split is uniform. Input order is preserved.
pub fn normalize_weights(entries: &[(Category, u32, bool)]) -> Vec<CategoryWeight> {
    let eligible: Vec<(Category, u32)> = entries.iter().filter(|e| e.2).map(|e| (e.0, e.1)).collect();
    if eligible.is_empty() {
        return Vec::new();
    }
    let total: u64 = eligible.iter().map(|e| u64::from(e.1)).sum();
    if total == 0 {
        let share = 100.0 / eligible.len() as f64;
        return eligible.into_iter().map(|(category, _)| CategoryWeight { category, weight: share }).collect();
    }
    eligible
        .into_iter()
        .map(|(category, w)| CategoryWeight { category, weight: f64::from(w) * 100.0 / total as f64 })
        .collect()
}

/// Maps a draw in [0, 100) onto cumulative ranges in list order. Each range
/// includes its lower bound; zero-width ranges are never hit.
pub fn roll_category(weights: &[CategoryWeight], draw: f64) -> Option<Category> {
    let mut upper = 0.0;
    for w in weights.iter().filter(|w| w.weight > 0.0) {
        upper += w.weight;
        if draw < upper {
            return Some(w.category);
        }
    }
    // float drift at the top of the range
    weights.iter().rev().find(|w| w.weight > 0.0).map(|w| w.category)
}

/// Categories to try after `chosen`, heaviest first; ties keep list order.
pub fn fallback_order(weights: &[CategoryWeight], chosen: Category) -> Vec<Category> {
    let mut rest: Vec<&CategoryWeight> = weights.iter().filter(|w| w.category != chosen).collect();
    rest.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    rest.into_iter().map(|w| w.category).collect()
}

/// Snapshot of what each category could offer at call time.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub series: Vec<SeriesSummary>,
    pub movies: Vec<Movie>,
    pub orders: Vec<CustomOrder>,
}

impl Candidates {
    pub async fn gather<C: CatalogStore + ?Sized>(catalog: &C) -> Result<Self> {
        let mut series = Vec::new();
        for s in catalog.list_series().await? {
            if !catalog.list_unwatched_episodes(&s.id).await?.is_empty() {
                series.push(s);
            }
        }
        let movies = catalog.list_unwatched_movies().await?;
        let orders = catalog
            .list_active_custom_orders()
            .await?
            .into_iter()
            .filter(|o| o.next_unwatched().is_some())
            .collect();
        Ok(Self { series, movies, orders })
    }

    pub fn has(&self, category: Category) -> bool {
        match category {
            Category::Tv => !self.series.is_empty(),
            Category::Movies => !self.movies.is_empty(),
            Category::CustomOrder => !self.orders.is_empty(),
        }
    }

    /// The `(category, weight, eligible)` list in fixed category order.
    pub fn weighted(&self, settings: &Settings) -> Vec<(Category, u32, bool)> {
        Category::ALL.iter().map(|&c| (c, settings.weight(c), self.has(c))).collect()
    }
}

/// Orchestrates category pickers over borrowed collaborators.
pub struct SelectionEngine<'a, C: ?Sized, S: ?Sized, M: ?Sized> {
    catalog: &'a C,
    sessions: &'a S,
    metadata: &'a M,
    enrichment_timeout: Duration,
}

impl<'a, C, S, M> SelectionEngine<'a, C, S, M>
where
    C: CatalogStore + ?Sized,
    S: SessionStore + ?Sized,
    M: MetadataCache + ?Sized,
{
    pub fn new(catalog: &'a C, sessions: &'a S, metadata: &'a M, enrichment_timeout: Duration) -> Self {
        Self { catalog, sessions, metadata, enrichment_timeout }
    }

    /// Picks what to watch or read next.
    pub async fn select_next<R: Rng + Send>(&self, settings: &Settings, rng: &mut R) -> Result<NextItem> {
        let candidates = Candidates::gather(self.catalog).await?;
        let weights = normalize_weights(&candidates.weighted(settings));
        let draw: f64 = rng.random_range(0.0..100.0);
        let chosen = roll_category(&weights, draw).ok_or(NextupError::NoEligibleContent)?;
        info!(category = %chosen, draw, "rolled category");

        let mut attempts = vec![chosen];
        attempts.extend(fallback_order(&weights, chosen));
        for category in attempts {
            match self.pick(category, &candidates, settings, rng).await {
                Ok(mut item) => {
                    metadata::enrich(self.metadata, &mut item, self.enrichment_timeout).await;
                    return Ok(item);
                }
                Err(e) if e.is_exhaustion() => {
                    warn!(%category, error = %e, "category yielded nothing; falling back");
                }
                Err(e) => return Err(e),
            }
        }
        Err(NextupError::NoEligibleContent)
    }

    async fn pick<R: Rng + Send>(
        &self,
        category: Category,
        candidates: &Candidates,
        settings: &Settings,
        rng: &mut R,
    ) -> Result<NextItem> {
        match category {
            Category::Tv => self.pick_tv(&candidates.series, rng).await,
            Category::Movies => self.pick_movie(&candidates.movies, settings, rng).await,
            Category::CustomOrder => {
                let (order, item) = custom_order::pick_next(&candidates.orders, rng)?;
                Ok(NextItem::from_custom_order_item(order, item))
            }
        }
    }

    async fn pick_tv<R: Rng + Send>(&self, series: &[SeriesSummary], rng: &mut R) -> Result<NextItem> {
        let mut shuffled: Vec<&SeriesSummary> = series.iter().collect();
        shuffled.shuffle(rng);
        for s in shuffled {
            match progression::next_episode(self.catalog, self.sessions, &s.id).await {
                Ok(ep) => return Ok(NextItem::from_episode(Category::Tv, &ep)),
                Err(e) if e.is_exhaustion() || matches!(e, NextupError::NotFound { .. }) => {
                    debug!(series = %s.title, error = %e, "series has no next episode");
                }
                Err(e) => return Err(e),
            }
        }
        Err(NextupError::NoEligibleContent)
    }

    async fn pick_movie<R: Rng + Send>(&self, movies: &[Movie], settings: &Settings, rng: &mut R) -> Result<NextItem> {
        let movie = movies.choose(rng).ok_or(NextupError::NoEligibleContent)?;
        let decision =
            collection::resolve_collection_continuation(self.catalog, self.sessions, movie, settings, rng).await?;
        Ok(match decision {
            ContinuationDecision::Standalone => NextItem::from_movie(movie),
            ContinuationDecision::Series { collection, episode } => {
                let mut item = NextItem::from_episode(Category::Movies, &episode);
                item.collection = Some(collection);
                item
            }
            ContinuationDecision::Movie { collection, movie } => {
                let mut item = NextItem::from_movie(&movie);
                item.collection = Some(collection);
                item
            }
        })
    }
}
