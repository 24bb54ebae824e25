// Social HTTP interface - feed, thread and toggle endpoints over SocialService

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::trace;

use crate::{
    core::{PostId, TargetId, UserId},
    engine::WriteOutcome,
    error::AppError,
    models::{Comment, CommentViewModel, NewPost, Post, PostViewModel, TargetType},
    services::SocialService,
};

#[derive(Deserialize)]
pub struct ViewerQuery {
    pub user_id: UserId,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub user_id: UserId,
    pub content: String,
}

#[derive(Deserialize)]
pub struct ToggleLikeRequest {
    pub user_id: UserId,
    pub target_id: TargetId,
    pub target_type: TargetType,
}

#[derive(Deserialize)]
pub struct ToggleSaveRequest {
    pub user_id: UserId,
    pub post_id: PostId,
}

fn outcome_json(outcome: &WriteOutcome) -> Json<Value> {
    Json(json!({
        "present": outcome.present,
        "created": outcome.created,
        "removed": outcome.removed,
    }))
}

// HTTP Handlers

pub async fn get_feed_handler(
    State(social): State<SocialService>,
    AxumPath(user_id): AxumPath<UserId>,
) -> Result<Json<Vec<PostViewModel>>, AppError> {
    Ok(Json(social.get_feed(&user_id).await?))
}

pub async fn create_post_handler(
    State(social): State<SocialService>,
    Json(req): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = social.create_post(req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_comments_handler(
    State(social): State<SocialService>,
    AxumPath(post_id): AxumPath<PostId>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<Vec<CommentViewModel>>, AppError> {
    Ok(Json(social.thread_snapshot(&post_id, &viewer.user_id).await?))
}

pub async fn create_comment_handler(
    State(social): State<SocialService>,
    AxumPath(post_id): AxumPath<PostId>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = social
        .create_comment(post_id, req.user_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Live thread view as server-sent events. The thread session lives as long
/// as the response stream; a disconnecting client drops it, which tears the
/// subscriptions down.
pub async fn thread_stream_handler(
    State(social): State<SocialService>,
    AxumPath(post_id): AxumPath<PostId>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let session = Arc::new(social.open_thread(post_id, viewer.user_id).await?);
    let holder = session.clone();
    let events = session.view_stream().map(move |view| {
        trace!(post = %holder.post_id(), comments = view.comments.len(), "pushing thread view");
        Event::default().event("thread").json_data(&view)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn toggle_like_handler(
    State(social): State<SocialService>,
    Json(req): Json<ToggleLikeRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = social
        .toggle_like(&req.user_id, &req.target_id, req.target_type)
        .await?;
    Ok(outcome_json(&outcome))
}

pub async fn toggle_save_handler(
    State(social): State<SocialService>,
    Json(req): Json<ToggleSaveRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = social.toggle_save(&req.user_id, &req.post_id).await?;
    Ok(outcome_json(&outcome))
}

// Create social router
pub fn create_social_router(social: SocialService) -> Router {
    Router::new()
        // Feed and posts
        .route("/feed/{user_id}", get(get_feed_handler))
        .route("/posts", post(create_post_handler))
        // Comment threads
        .route(
            "/posts/{post_id}/comments",
            get(get_comments_handler).post(create_comment_handler),
        )
        .route("/posts/{post_id}/thread/stream", get(thread_stream_handler))
        // Relation toggles
        .route("/likes/toggle", post(toggle_like_handler))
        .route("/saves/toggle", post(toggle_save_handler))
        .with_state(social)
}
