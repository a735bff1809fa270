mod common;

use common::*;
use nextup::prelude::*;
use nextup::storage::Store;

fn three_items() -> Vec<CustomOrderItem> {
    vec![movie_item("i1", 1, true), movie_item("i2", 2, false), movie_item("i3", 3, false)]
}

#[tokio::test]
async fn next_item_skips_watched_prefix_in_memory() {
    let app = memory_app();
    CatalogBuilder::new().order("o", "Saga", true, three_items()).load(&app).await;

    let next = app.next_custom_order_item().await.unwrap();
    assert_eq!(next.subject, SubjectRef::CustomOrderItem { item_id: "i2".into() });
    assert_eq!(next.sort_order, Some(2));
}

#[tokio::test]
async fn next_item_skips_watched_prefix_in_sqlite() {
    let (_dir, app) = sqlite_app().await;
    CatalogBuilder::new().order("o", "Saga", true, three_items()).load(&app).await;

    let next = app.next_custom_order_item().await.unwrap();
    assert_eq!(next.title, "Item i2");

    app.mark_custom_order_item_watched("i2").await.unwrap();
    let next = app.next_custom_order_item().await.unwrap();
    assert_eq!(next.title, "Item i3");

    app.mark_custom_order_item_watched("i3").await.unwrap();
    assert!(matches!(app.next_custom_order_item().await, Err(NextupError::NoEligibleContent)));
}

#[tokio::test]
async fn inactive_orders_are_ignored() {
    let (_dir, app) = sqlite_app().await;
    CatalogBuilder::new().order("o", "Shelved", false, three_items()).load(&app).await;
    assert!(matches!(app.next_custom_order_item().await, Err(NextupError::NoEligibleContent)));
}

#[tokio::test]
async fn watched_flag_survives_reimport() {
    let (_dir, app) = sqlite_app().await;
    let seed = CatalogBuilder::new().order("o", "Saga", true, three_items()).build();
    app.import_catalog(&seed).await.unwrap();
    app.mark_custom_order_item_watched("i2").await.unwrap();

    app.import_catalog(&seed).await.unwrap();
    let next = app.next_custom_order_item().await.unwrap();
    assert_eq!(next.title, "Item i3");
}

async fn reimport_replaces_item_list<S: Store + 'static>(app: &Nextup<S>) {
    let first = vec![movie_item("a", 1, false), movie_item("b", 2, false), movie_item("c", 3, false)];
    CatalogBuilder::new().order("o", "Saga", true, first).load(app).await;
    app.mark_custom_order_item_watched("a").await.unwrap();

    // b and a swap places, c is dropped
    let second = vec![movie_item("b", 1, false), movie_item("a", 2, false)];
    CatalogBuilder::new().order("o", "Saga", true, second).load(app).await;

    let next = app.next_custom_order_item().await.unwrap();
    assert_eq!(next.title, "Item b");
    assert_eq!(next.sort_order, Some(1));

    app.mark_custom_order_item_watched("b").await.unwrap();
    assert!(matches!(app.next_custom_order_item().await, Err(NextupError::NoEligibleContent)));
    assert!(matches!(app.mark_custom_order_item_watched("c").await, Err(NextupError::NotFound { .. })));
}

#[tokio::test]
async fn reimport_reorders_and_drops_items_in_sqlite() {
    let (_dir, app) = sqlite_app().await;
    reimport_replaces_item_list(&app).await;
}

#[tokio::test]
async fn reimport_reorders_and_drops_items_in_memory() {
    reimport_replaces_item_list(&memory_app()).await;
}

#[tokio::test]
async fn marking_unknown_item_is_not_found() {
    let app = memory_app();
    let err = app.mark_custom_order_item_watched("ghost").await.unwrap_err();
    assert!(matches!(err, NextupError::NotFound { kind: "custom order item", .. }));
}

#[tokio::test]
async fn duplicate_sort_orders_are_rejected() {
    let app = memory_app();
    let seed = CatalogBuilder::new()
        .order("o", "Broken", true, vec![movie_item("a", 1, false), movie_item("b", 1, false)])
        .build();
    assert!(matches!(app.import_catalog(&seed).await, Err(NextupError::InvalidCatalog(_))));
}

#[tokio::test]
async fn book_progress_marks_item_watched_on_last_page() {
    let (_dir, app) = sqlite_app().await;
    CatalogBuilder::new()
        .order("o", "Books", true, vec![book_item("b1", 1, Some(200)), movie_item("m1", 2, false)])
        .load(&app)
        .await;

    let item = app.record_book_progress("b1", 50, None).await.unwrap();
    assert!(!item.is_watched);
    match item.payload {
        ItemPayload::Book(p) => {
            assert_eq!(p.current_page, 50);
            assert_eq!(p.percent_read, 25.0);
            assert_eq!(p.next_page(), Some(51));
        }
        other => panic!("expected book payload, got {other:?}"),
    }

    let item = app.record_book_progress("b1", 250, None).await.unwrap();
    assert!(item.is_watched);
    assert!(matches!(item.payload, ItemPayload::Book(BookProgress { current_page: 200, .. })));

    // Going back a page never unwatches
    let item = app.record_book_progress("b1", 10, None).await.unwrap();
    assert!(item.is_watched);

    assert_eq!(app.next_custom_order_item().await.unwrap().title, "Item m1");
}

#[tokio::test]
async fn book_progress_learns_page_count() {
    let app = memory_app();
    CatalogBuilder::new().order("o", "Books", true, vec![book_item("b1", 1, None)]).load(&app).await;

    let item = app.record_book_progress("b1", 40, None).await.unwrap();
    assert!(matches!(item.payload, ItemPayload::Book(BookProgress { page_count: None, current_page: 40, .. })));

    let item = app.record_book_progress("b1", 80, Some(80)).await.unwrap();
    assert!(item.is_watched);
}

#[tokio::test]
async fn book_progress_rejects_other_media() {
    let app = memory_app();
    CatalogBuilder::new()
        .order("o", "Mixed", true, vec![movie_item("m1", 1, false), book_item("b1", 2, Some(10))])
        .load(&app)
        .await;

    assert!(matches!(app.record_book_progress("m1", 3, None).await, Err(NextupError::InvalidProgress(_))));
    assert!(matches!(app.record_book_progress("b1", -1, None).await, Err(NextupError::InvalidProgress(_))));
    assert!(matches!(app.record_book_progress("zz", 1, None).await, Err(NextupError::NotFound { .. })));
}

#[tokio::test]
async fn sessions_can_track_custom_order_items() {
    let app = memory_app();
    CatalogBuilder::new().order("o", "Books", true, vec![book_item("b1", 1, Some(300))]).load(&app).await;

    let next = app.next_custom_order_item().await.unwrap();
    let session = app.start_session(&next.session_subject()).await.unwrap();
    assert_eq!(session.activity_type.as_str(), "read");
    assert_eq!(session.subject.key(), "order-item:b1");
    assert!(matches!(app.start_session(&next.session_subject()).await, Err(NextupError::Conflict { .. })));
}
