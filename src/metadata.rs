//! Artwork and comic-issue enrichment.
//!
//! Enrichment is best-effort: every lookup is bounded by a timeout, and
//! failures or timeouts degrade to an empty result plus a logged warning.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::NextupError;
use crate::storage::CacheStorage;
use crate::types::{ArtworkContext, ArtworkRef, ComicDetails, Enrichment, ItemPayload, NextItem};

/// External fetch-and-cache capability. A miss is `Ok(None)`; `Err` is
/// reserved for infrastructure failures.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn resolve_artwork(&self, context: &ArtworkContext) -> Result<Option<ArtworkRef>>;
    async fn resolve_comic_details(&self, series: &str, year: Option<i64>, issue: Option<&str>) -> Result<Option<ComicDetails>>;
}

/// Provider that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl MetadataCache for NoMetadata {
    async fn resolve_artwork(&self, _context: &ArtworkContext) -> Result<Option<ArtworkRef>> { Ok(None) }

    async fn resolve_comic_details(&self, _series: &str, _year: Option<i64>, _issue: Option<&str>) -> Result<Option<ComicDetails>> {
        Ok(None)
    }
}

#[async_trait]
impl<T: MetadataCache + ?Sized> MetadataCache for Arc<T> {
    async fn resolve_artwork(&self, context: &ArtworkContext) -> Result<Option<ArtworkRef>> {
        (**self).resolve_artwork(context).await
    }

    async fn resolve_comic_details(&self, series: &str, year: Option<i64>, issue: Option<&str>) -> Result<Option<ComicDetails>> {
        (**self).resolve_comic_details(series, year, issue).await
    }
}

/// Write-through TTL cache in front of an upstream provider. Hits and misses
/// are both cached; upstream errors are not.
pub struct CachedMetadata<U, S> {
    upstream: U,
    storage: S,
    ttl_secs: i64,
}

impl<U: MetadataCache, S: CacheStorage> CachedMetadata<U, S> {
    pub fn new(upstream: U, storage: S, ttl_secs: i64) -> Self {
        Self { upstream, storage, ttl_secs }
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<Option<T>> {
        let payload = self.storage.get_cache(key, current_epoch()).await.ok().flatten()?;
        serde_json::from_str::<Option<T>>(&payload).ok()
    }

    async fn store<T: Serialize + Sync>(&self, key: &str, value: &Option<T>) {
        let Ok(payload) = serde_json::to_string(value) else { return };
        if let Err(e) = self.storage.put_cache(key, &payload, current_epoch() + self.ttl_secs).await {
            debug!(%key, error = %e, "failed to write metadata cache entry");
        }
    }
}

#[async_trait]
impl<U: MetadataCache, S: CacheStorage> MetadataCache for CachedMetadata<U, S> {
    async fn resolve_artwork(&self, context: &ArtworkContext) -> Result<Option<ArtworkRef>> {
        let key = context.cache_key();
        if let Some(hit) = self.cached::<ArtworkRef>(&key).await {
            return Ok(hit);
        }
        let value = self.upstream.resolve_artwork(context).await?;
        self.store(&key, &value).await;
        Ok(value)
    }

    async fn resolve_comic_details(&self, series: &str, year: Option<i64>, issue: Option<&str>) -> Result<Option<ComicDetails>> {
        let key = format!(
            "comic|{}|{}|{}",
            series.trim().to_ascii_lowercase(),
            year.map(|y| y.to_string()).unwrap_or_default(),
            issue.unwrap_or("").trim()
        );
        if let Some(hit) = self.cached::<ComicDetails>(&key).await {
            return Ok(hit);
        }
        let value = self.upstream.resolve_comic_details(series, year, issue).await?;
        self.store(&key, &value).await;
        Ok(value)
    }
}

/// Runs one lookup under `timeout`, folding timeouts and failures into a miss.
/// Returns the warning to surface alongside the value, if any.
async fn bounded<T, F>(what: &str, timeout: Duration, fut: F) -> (Option<T>, Option<String>)
where
    F: std::future::Future<Output = Result<Option<T>>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => (value, None),
        Ok(Err(e)) => {
            warn!(lookup = what, error = %e, "metadata lookup failed; continuing without it");
            (None, Some(format!("{what} lookup failed")))
        }
        Err(_) => {
            let e = NextupError::EnrichmentTimeout(timeout);
            warn!(lookup = what, error = %e, "metadata lookup abandoned");
            (None, Some(e.to_string()))
        }
    }
}

/// Attaches artwork (and comic details for comic items) to `item`.
/// Never fails; a soft warning is recorded on the item instead.
pub async fn enrich<M: MetadataCache + ?Sized>(metadata: &M, item: &mut NextItem, timeout: Duration) {
    let mut warnings: Vec<String> = Vec::new();

    let context = item.artwork_context();
    let (artwork, warning) = bounded("artwork", timeout, metadata.resolve_artwork(&context)).await;
    warnings.extend(warning);

    let mut comic = None;
    if let Some(ItemPayload::Comic { series, year, issue }) = &item.payload {
        let (details, warning) =
            bounded("comic details", timeout, metadata.resolve_comic_details(series, *year, issue.as_deref())).await;
        comic = details;
        warnings.extend(warning);
    }

    let enrichment = Enrichment { artwork, comic };
    item.enrichment = (!enrichment.is_empty()).then_some(enrichment);
    if !warnings.is_empty() {
        item.warning = Some(warnings.join("; "));
    }
}

fn current_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
