// Demo data seeding - a handful of pet owners, posts, comments and relations

use tracing::info;

use crate::{
    core::{TargetId, UserId},
    error::AppResult,
    models::{NewPost, TargetType},
    services::SocialService,
};

const OWNERS: [&str; 4] = ["maya", "theo", "priya", "jun"];

const POSTS: [(&str, &str); 4] = [
    ("maya", "Biscuit finally learned to sit on command!"),
    ("theo", "Any tips for a cat that hates the carrier?"),
    ("priya", "Sunday hike with Pepper and Miso"),
    ("jun", "First vet visit for the new kitten went great"),
];

const COMMENTS: [(usize, &str, &str); 5] = [
    (0, "theo", "Good boy Biscuit!"),
    (0, "priya", "What treats did you use?"),
    (1, "maya", "Leave it open in the living room for a week"),
    (2, "jun", "Where is that trail?"),
    (3, "theo", "So tiny!"),
];

/// Seed a small demo graph through the service layer. Safe to call on an
/// empty store only; it does not check for existing data.
pub async fn seed_demo_data(social: &SocialService) -> AppResult<()> {
    let mut posts = Vec::with_capacity(POSTS.len());
    for (author, content) in POSTS {
        let post = social
            .create_post(NewPost {
                author_id: UserId::from(author),
                content: content.to_string(),
                media: vec![],
            })
            .await?;
        posts.push(post);
    }

    let mut comments = Vec::with_capacity(COMMENTS.len());
    for (post_index, author, content) in COMMENTS {
        let comment = social
            .create_comment(posts[post_index].id.clone(), UserId::from(author), content)
            .await?;
        comments.push(comment);
    }

    // Every owner likes the first post; comments get a like from the post author
    for owner in OWNERS {
        let target: TargetId = (&posts[0].id).into();
        social
            .toggle_like(&UserId::from(owner), &target, TargetType::Post)
            .await?;
    }
    for comment in &comments {
        let Some(post) = posts.iter().find(|p| p.id == comment.post_id) else {
            continue;
        };
        if post.author_id != comment.author_id {
            social
                .toggle_like(&post.author_id, &(&comment.id).into(), TargetType::Comment)
                .await?;
        }
    }
    social.toggle_save(&UserId::from("maya"), &posts[2].id).await?;
    social.toggle_save(&UserId::from("jun"), &posts[1].id).await?;

    info!(
        owners = OWNERS.len(),
        posts = posts.len(),
        comments = comments.len(),
        "demo data seeded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::infrastructure::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seeded_feed_has_stats() {
        let social = SocialService::new(Arc::new(MemoryStore::new()), &EngineConfig::default());
        seed_demo_data(&social).await.unwrap();

        let feed = social.get_feed(&"maya".into()).await.unwrap();
        assert_eq!(feed.len(), POSTS.len());

        let biscuit = feed
            .iter()
            .find(|item| item.post.content.starts_with("Biscuit"))
            .unwrap();
        assert_eq!(biscuit.stats.like_count, OWNERS.len() as u64);
        assert!(biscuit.stats.is_liked_by_me);
        assert_eq!(biscuit.stats.comment_count, 2);

        let hike = feed
            .iter()
            .find(|item| item.post.content.starts_with("Sunday"))
            .unwrap();
        assert!(hike.stats.is_saved_by_me);
    }
}
