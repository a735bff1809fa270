//! Custom order traversal and item progress.

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::error::{NextupError, Result};
use crate::storage::CatalogStore;
use crate::types::{BookProgress, CustomOrder, CustomOrderItem, ItemPayload};

/// Picks one active order with something left (uniformly at random) and
/// returns its unwatched item with the smallest sort order.
pub fn pick_next<'a, R: Rng>(orders: &'a [CustomOrder], rng: &mut R) -> Result<(&'a CustomOrder, &'a CustomOrderItem)> {
    let eligible: Vec<&CustomOrder> = orders.iter().filter(|o| o.is_active && o.next_unwatched().is_some()).collect();
    let order = eligible.choose(rng).copied().ok_or(NextupError::NoEligibleContent)?;
    let item = order.next_unwatched().ok_or(NextupError::NoEligibleContent)?;
    debug!(order = %order.name, item = %item.title, sort_order = item.sort_order, "picked custom order item");
    Ok((order, item))
}

/// Next item across the active custom orders.
pub async fn next_custom_order_item<C, R>(catalog: &C, rng: &mut R) -> Result<(CustomOrder, CustomOrderItem)>
where
    C: CatalogStore + ?Sized,
    R: Rng + Send,
{
    let orders = catalog.list_active_custom_orders().await?;
    let (order, item) = pick_next(&orders, rng)?;
    Ok((order.clone(), item.clone()))
}

/// Flags an item as consumed. Idempotent; the flag never reverts.
pub async fn mark_watched<C: CatalogStore + ?Sized>(catalog: &C, item_id: &str) -> Result<CustomOrderItem> {
    if !catalog.mark_custom_order_item_watched(item_id).await? {
        return Err(NextupError::not_found("custom order item", item_id));
    }
    info!(%item_id, "custom order item marked watched");
    catalog
        .get_custom_order_item(item_id)
        .await?
        .ok_or_else(|| NextupError::not_found("custom order item", item_id))
}

/// Records the current page of a book item, marking it watched once the last
/// page is reached.
pub async fn record_book_progress<C: CatalogStore + ?Sized>(
    catalog: &C,
    item_id: &str,
    current_page: i64,
    page_count: Option<i64>,
) -> Result<CustomOrderItem> {
    let item = catalog
        .get_custom_order_item(item_id)
        .await?
        .ok_or_else(|| NextupError::not_found("custom order item", item_id))?;
    let ItemPayload::Book(existing) = &item.payload else {
        return Err(NextupError::InvalidProgress(format!(
            "item {item_id} is a {}, not a book",
            item.media_type()
        )));
    };
    if current_page < 0 {
        return Err(NextupError::InvalidProgress(format!("page {current_page} is negative")));
    }

    let progress = BookProgress::new(page_count.or(existing.page_count), current_page);
    let finished = progress.is_finished();
    if !catalog.set_book_progress(item_id, &progress, finished).await? {
        return Err(NextupError::not_found("custom order item", item_id));
    }
    info!(%item_id, page = progress.current_page, percent = progress.percent_read, finished, "book progress recorded");
    catalog
        .get_custom_order_item(item_id)
        .await?
        .ok_or_else(|| NextupError::not_found("custom order item", item_id))
}
