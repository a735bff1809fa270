mod common;

use std::sync::Arc;

use chrono::Utc;
use common::*;
use nextup::prelude::*;
use nextup::storage::SessionStore;
use nextup::types::ActivityType;
use tokio::task::JoinSet;

fn heat() -> Movie {
    Movie { id: "m1".into(), title: "Heat".into(), year: Some(1995), collections: vec![] }
}

#[tokio::test]
async fn sqlite_rejects_second_running_session() {
    let (_dir, app) = sqlite_app().await;
    let first = app.start_session(&SessionSubject::movie(&heat())).await.unwrap();
    assert_eq!(first.state(), SessionState::Active);

    let err = app.start_session(&SessionSubject::movie(&heat())).await.unwrap_err();
    assert!(matches!(err, NextupError::Conflict { ref subject } if subject == "plex:m1"));

    app.complete_session(&first.id, 100).await.unwrap();
    let second = app.start_session(&SessionSubject::movie(&heat())).await.unwrap();
    assert_ne!(second.id, first.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_starts_admit_exactly_one() {
    let (_dir, app) = sqlite_app_pooled(4).await;
    let app = Arc::new(app);
    let subject = SessionSubject::movie(&heat());

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let app = app.clone();
        let subject = subject.clone();
        tasks.spawn(async move { app.start_session(&subject).await });
    }
    let mut started = 0;
    while let Some(res) = tasks.join_next().await {
        match res.unwrap() {
            Ok(_) => started += 1,
            Err(e) => assert!(matches!(e, NextupError::Conflict { .. }), "unexpected error: {e}"),
        }
    }
    assert_eq!(started, 1);

    let open = SessionFilter { active_only: true, ..SessionFilter::default() };
    assert_eq!(app.list_sessions(&open).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_unfinished_row_with_end_time_counts_as_paused() {
    let (_dir, app) = sqlite_app().await;
    sqlx::query(
        "INSERT INTO sessions(id, media_type, activity_type, subject_key, title, start_time, end_time,
           total_watch_time, is_completed, is_paused)
         VALUES('old', 'movie', 'watch', 'plex:m1', 'Heat', '2024-01-01T20:00:00.000000Z',
           '2024-01-01T21:00:00.000000Z', 60, 0, 0)",
    )
    .execute(app.store().pool())
    .await
    .unwrap();

    let old = app.get_session("old").await.unwrap();
    assert_eq!(old.state(), SessionState::Paused);
    assert!(old.series_id.is_none());

    // A paused session does not hold the subject
    let fresh = app.start_session(&SessionSubject::movie(&heat())).await.unwrap();
    assert_eq!(app.pause_session("old").await.unwrap().state(), SessionState::Paused);
    assert!(matches!(app.resume_session("old").await, Err(NextupError::Conflict { .. })));

    app.complete_session(&fresh.id, 20).await.unwrap();
    let resumed = app.resume_session("old").await.unwrap();
    assert_eq!(resumed.state(), SessionState::Active);
    assert!(resumed.end_time.is_none());
    assert_eq!(resumed.total_watch_time, 60);
    assert!(matches!(app.start_session(&SessionSubject::movie(&heat())).await, Err(NextupError::Conflict { .. })));
}

#[tokio::test]
async fn memory_unfinished_session_with_end_time_does_not_block() {
    let app = memory_app();
    let legacy = Session {
        id: "old".into(),
        media_type: MediaType::Movie,
        activity_type: ActivityType::Watch,
        subject: SubjectRef::Catalog { plex_key: "m1".into() },
        title: "Heat".into(),
        series_id: None,
        series_title: None,
        season_number: None,
        episode_number: None,
        start_time: Utc::now(),
        end_time: Some(Utc::now()),
        total_watch_time: 60,
        is_completed: false,
        is_paused: false,
    };
    assert!(app.store().insert_session(&legacy).await.unwrap());
    app.start_session(&SessionSubject::movie(&heat())).await.unwrap();
    assert!(matches!(app.resume_session("old").await, Err(NextupError::Conflict { .. })));
}

#[tokio::test]
async fn sqlite_pause_resume_complete_roundtrip() {
    let (_dir, app) = sqlite_app().await;
    let s = app.start_session(&SessionSubject::movie(&heat())).await.unwrap();

    let paused = app.pause_session(&s.id).await.unwrap();
    assert_eq!(paused.state(), SessionState::Paused);
    assert!(app.pause_session(&s.id).await.unwrap().is_paused);

    let other = app.start_session(&SessionSubject::movie(&heat())).await.unwrap();
    assert!(matches!(app.resume_session(&s.id).await, Err(NextupError::Conflict { .. })));
    app.delete_session(&other.id).await.unwrap();

    let resumed = app.resume_session(&s.id).await.unwrap();
    assert_eq!(resumed.state(), SessionState::Active);
    assert!(resumed.end_time.is_none());

    app.pause_session(&s.id).await.unwrap();
    let done = app.complete_session(&s.id, 30).await.unwrap();
    assert_eq!(done.state(), SessionState::Completed);
    assert!(!done.is_paused);
    assert_eq!(done.total_watch_time, 30);

    let again = app.complete_session(&s.id, 30).await.unwrap();
    assert_eq!(again.total_watch_time, 30);
    assert!(matches!(app.resume_session(&s.id).await, Err(NextupError::NotFound { .. })));
}

#[tokio::test]
async fn sqlite_unknown_sessions_are_not_found() {
    let (_dir, app) = sqlite_app().await;
    assert!(matches!(app.delete_session("missing").await, Err(NextupError::NotFound { .. })));
    assert!(matches!(app.pause_session("missing").await, Err(NextupError::NotFound { .. })));
    assert!(matches!(app.get_session("missing").await, Err(NextupError::NotFound { .. })));
}

#[tokio::test]
async fn sqlite_list_sessions_filters_by_subject_and_state() {
    let (_dir, app) = sqlite_app().await;
    let heat_subject = SessionSubject::movie(&heat());
    let ronin = Movie { id: "m2".into(), title: "Ronin".into(), year: None, collections: vec![] };

    let done = app.start_session(&heat_subject).await.unwrap();
    app.complete_session(&done.id, 10).await.unwrap();
    let open = app.start_session(&heat_subject).await.unwrap();
    app.start_session(&SessionSubject::movie(&ronin)).await.unwrap();

    let all = app.list_sessions(&SessionFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].start_time >= w[1].start_time));

    let heat_only = SessionFilter { subject: Some(heat_subject.subject.clone()), ..SessionFilter::default() };
    assert_eq!(app.list_sessions(&heat_only).await.unwrap().len(), 2);

    let active_heat = SessionFilter { active_only: true, ..heat_only };
    let active = app.list_sessions(&active_heat).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, open.id);

    let limited = SessionFilter { limit: Some(1), ..SessionFilter::default() };
    assert_eq!(app.list_sessions(&limited).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_progression_follows_completed_sessions() {
    let (_dir, app) = sqlite_app().await;
    CatalogBuilder::new().series("show", "Show", &[(1, 6), (2, 2)]).load(&app).await;

    assert_eq!(app.next_episode("show").await.unwrap().episode_id, episode_id("show", 1, 1));

    watch_episode(&app, "show", "Show", 1, 4).await;
    let next = app.next_episode("show").await.unwrap();
    assert_eq!((next.season_number, next.episode_number), (1, 5));
    assert_eq!(app.next_episode("show").await.unwrap(), next);

    watch_episode(&app, "show", "Show", 1, 5).await;
    let next = app.next_episode("show").await.unwrap();
    assert_eq!((next.season_number, next.episode_number), (1, 6));

    watch_episode(&app, "show", "Show", 1, 6).await;
    let next = app.next_episode("show").await.unwrap();
    assert_eq!((next.season_number, next.episode_number), (2, 1));

    watch_episode(&app, "show", "Show", 2, 2).await;
    let err = app.next_episode("show").await.unwrap_err();
    assert!(matches!(err, NextupError::AllWatched { ref series_id } if series_id == "show"));
}

#[tokio::test]
async fn unfinished_sessions_do_not_advance_progression() {
    let app = memory_app();
    CatalogBuilder::new().series("show", "Show", &[(1, 3)]).load(&app).await;
    let ep = app.next_episode("show").await.unwrap();
    let s = app.start_session(&SessionSubject::episode(&ep)).await.unwrap();
    app.pause_session(&s.id).await.unwrap();
    assert_eq!(app.next_episode("show").await.unwrap(), ep);
}

#[tokio::test]
async fn unknown_series_is_not_found() {
    let (_dir, app) = sqlite_app().await;
    assert!(matches!(app.next_episode("nope").await, Err(NextupError::NotFound { kind: "series", .. })));
}

#[tokio::test]
async fn sqlite_settings_are_created_lazily_and_cache_is_invalidated() {
    let (_dir, app) = sqlite_app().await;
    assert_eq!(app.settings().await.unwrap(), Settings::default());

    let updated = app
        .update_settings(&SettingsUpdate { tv_general_percent: Some(70), ..SettingsUpdate::default() })
        .await
        .unwrap();
    assert_eq!(updated.tv_general_percent, 70);
    assert_eq!(updated.movies_general_percent, 40);
    assert_eq!(app.settings().await.unwrap(), updated);
}

#[tokio::test]
async fn settings_written_by_another_engine_are_seen_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let app = sqlite_app_in(dir.path(), 1).await;
    let other = sqlite_app_in(dir.path(), 1).await;
    assert_eq!(app.settings().await.unwrap().tv_general_percent, 40);

    other
        .update_settings(&SettingsUpdate { tv_general_percent: Some(90), ..SettingsUpdate::default() })
        .await
        .unwrap();
    assert_eq!(app.settings().await.unwrap().tv_general_percent, 40);
    assert_eq!(app.reload_settings().await.unwrap().tv_general_percent, 90);
    assert_eq!(app.settings().await.unwrap().tv_general_percent, 90);
}
