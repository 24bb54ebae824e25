use std::sync::Arc;
use std::time::Duration;

use pawfeed::app_state::open_store;
use pawfeed::config::EngineConfig;
use pawfeed::engine::ToggleOutcome;
use pawfeed::infrastructure::{SqliteStore, TracedStore};
use pawfeed::models::{NewPost, TargetType};
use pawfeed::services::SocialService;
use tempfile::tempdir;

#[tokio::test]
async fn test_thread_over_sqlite() {
    let store = Arc::new(TracedStore::new(SqliteStore::new_in_memory().await.unwrap()));
    let social = SocialService::new(store.clone(), &EngineConfig::default());

    let post = social
        .create_post(NewPost {
            author_id: "maya".into(),
            content: "Pepper's first swim".into(),
            media: vec![],
        })
        .await
        .unwrap();

    let session = social.open_thread(post.id.clone(), "ana".into()).await.unwrap();
    let wait = |pred: fn(&pawfeed::models::ThreadView) -> bool| {
        tokio::time::timeout(Duration::from_secs(5), session.wait_for(pred))
    };
    wait(|v| v.loaded).await.unwrap().unwrap();

    let comment = session.post_comment("so brave").await.unwrap();
    wait(|v| v.comments.len() == 1).await.unwrap().unwrap();

    let outcome = session.toggle_like(&comment.id).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { predicted: true });
    let view = wait(|v| v.comments[0].is_liked_by_me).await.unwrap().unwrap();
    assert_eq!(view.comments[0].like_count, 1);

    session.toggle_save(&post.id).await.unwrap();
    wait(|v| v.post.is_saved_by_me).await.unwrap().unwrap();
    session.close().await;

    // Both writes were issued in the background; wait for them to land
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.stats().await.get("create_edge").map_or(0, |s| s.calls) < 2 {
        assert!(tokio::time::Instant::now() < deadline, "edge writes never landed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let feed = social.get_feed(&"ana".into()).await.unwrap();
    assert_eq!(feed[0].stats.comment_count, 1);
    assert!(feed[0].stats.is_saved_by_me);

    let stats = store.stats().await;
    assert_eq!(stats["create_edge"].calls, 2);
    assert_eq!(stats["create_edge"].failures, 0);
}

#[tokio::test]
async fn test_file_backed_store_keeps_edges_across_reopen() {
    let dir = tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("pawfeed.db").display());

    let post_id = {
        let social = SocialService::new(open_store(&url).await.unwrap(), &EngineConfig::default());
        let post = social
            .create_post(NewPost {
                author_id: "theo".into(),
                content: "Miso napping".into(),
                media: vec![],
            })
            .await
            .unwrap();
        social
            .toggle_like(&"ana".into(), &(&post.id).into(), TargetType::Post)
            .await
            .unwrap();
        post.id
    };

    let social = SocialService::new(open_store(&url).await.unwrap(), &EngineConfig::default());
    let feed = social.get_feed(&"ana".into()).await.unwrap();
    assert_eq!(feed[0].post.id, post_id);
    assert_eq!(feed[0].stats.like_count, 1);
    assert!(feed[0].stats.is_liked_by_me);
}
