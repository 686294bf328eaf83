use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Comment, CommentNode, Thread},
    error::Result,
    middleware::auth::AuthUser,
    services::{
        comments::{self, NewComment},
        notify::ChangeEvent,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/versions/:version_id/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/:id", get(get_comment))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub line: i64,
    pub body: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentsListResponse {
    pub comments: Vec<CommentNode>,
}

async fn list_comments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(version_id): Path<String>,
) -> Result<Json<CommentsListResponse>> {
    let comments = comments::list_comments(&state.db, &user.id, &version_id).await?;
    Ok(Json(CommentsListResponse { comments }))
}

async fn get_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Comment>> {
    Ok(Json(comments::get_comment(&state.db, &user.id, &id).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(version_id): Path<String>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = comments::create_comment(
        &state.db,
        &user.id,
        &version_id,
        NewComment {
            line: body.line,
            body: body.body,
            thread: Thread::from(body.parent_id),
        },
    )
    .await?;

    state
        .notifier
        .publish(ChangeEvent::CommentCreated {
            version_id: comment.version_id.clone(),
            comment_id: comment.id.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(comment)))
}
