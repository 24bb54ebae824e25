mod common;

use std::sync::Arc;

use common::{new_comment, new_post, service, FlakyStore};
use pawfeed::core::{TargetId, UserId};
use pawfeed::error::AppError;
use pawfeed::models::{NewPost, TargetType};

#[tokio::test]
async fn test_feed_reflects_service_toggles() {
    let store = Arc::new(FlakyStore::new());
    let older = new_post(&store, "maya").await;
    let newer = new_post(&store, "theo").await;
    new_comment(&store, &older, "priya", "cute").await;
    let social = service(store.clone());
    let ana = UserId::from("ana");

    let liked = social
        .toggle_like(&ana, &(&older.id).into(), TargetType::Post)
        .await
        .unwrap();
    assert!(liked.present);
    social
        .toggle_like(&"jun".into(), &(&older.id).into(), TargetType::Post)
        .await
        .unwrap();
    social.toggle_save(&ana, &newer.id).await.unwrap();

    let feed = social.get_feed(&ana).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].post.id, newer.id);
    assert!(feed[0].stats.is_saved_by_me);
    assert_eq!(feed[0].stats.like_count, 0);

    assert_eq!(feed[1].post.id, older.id);
    assert_eq!(feed[1].stats.like_count, 2);
    assert!(feed[1].stats.is_liked_by_me);
    assert_eq!(feed[1].stats.comment_count, 1);

    // Second toggle undoes the first
    let unliked = social
        .toggle_like(&ana, &(&older.id).into(), TargetType::Post)
        .await
        .unwrap();
    assert!(!unliked.present);
    let feed = social.get_feed(&ana).await.unwrap();
    assert_eq!(feed[1].stats.like_count, 1);
    assert!(!feed[1].stats.is_liked_by_me);
}

#[tokio::test]
async fn test_feed_is_per_viewer() {
    let store = Arc::new(FlakyStore::new());
    let post = new_post(&store, "maya").await;
    let social = service(store.clone());
    social
        .toggle_like(&"ana".into(), &(&post.id).into(), TargetType::Post)
        .await
        .unwrap();

    let for_ana = social.get_feed(&"ana".into()).await.unwrap();
    let for_theo = social.get_feed(&"theo".into()).await.unwrap();
    assert!(for_ana[0].stats.is_liked_by_me);
    assert!(!for_theo[0].stats.is_liked_by_me);
    assert_eq!(for_theo[0].stats.like_count, 1);
}

#[tokio::test]
async fn test_failed_write_leaves_feed_unchanged() {
    let store = Arc::new(FlakyStore::new());
    let post = new_post(&store, "maya").await;
    let social = service(store.clone());

    store.fail_next_edge_writes(1);
    let err = social
        .toggle_save(&"ana".into(), &post.id)
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let feed = social.get_feed(&"ana".into()).await.unwrap();
    assert!(!feed[0].stats.is_saved_by_me);
}

#[tokio::test]
async fn test_toggles_on_missing_targets_are_rejected() {
    let store = Arc::new(FlakyStore::new());
    let social = service(store);

    let err = social
        .toggle_like(&"ana".into(), &TargetId::from("ghost"), TargetType::Comment)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = social
        .toggle_save(&"ana".into(), &"ghost".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = social.get_feed(&"".into()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_create_post_validation() {
    let store = Arc::new(FlakyStore::new());
    let social = service(store);

    let err = social
        .create_post(NewPost {
            author_id: "maya".into(),
            content: "   ".into(),
            media: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let photo_only = social
        .create_post(NewPost {
            author_id: "maya".into(),
            content: String::new(),
            media: vec!["https://img.example/biscuit.jpg".into()],
        })
        .await
        .unwrap();
    assert_eq!(photo_only.media.len(), 1);
}

#[tokio::test]
async fn test_thread_snapshot_matches_live_view() {
    let store = Arc::new(FlakyStore::new());
    let post = new_post(&store, "maya").await;
    let c1 = new_comment(&store, &post, "theo", "first").await;
    new_comment(&store, &post, "priya", "second").await;
    let social = service(store.clone());
    social
        .toggle_like(&"ana".into(), &(&c1.id).into(), TargetType::Comment)
        .await
        .unwrap();

    let snapshot = social
        .thread_snapshot(&post.id, &"ana".into())
        .await
        .unwrap();
    let session = social.open_thread(post.id.clone(), "ana".into()).await.unwrap();
    let live = common::settle(&session, |v| v.loaded).await;

    assert_eq!(snapshot, live.comments);
    assert_eq!(snapshot[0].like_count, 1);
    assert!(snapshot[0].is_liked_by_me);
    session.close().await;
}
