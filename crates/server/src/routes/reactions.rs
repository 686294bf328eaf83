use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Reaction, ReactionCount},
    error::Result,
    middleware::auth::AuthUser,
    services::{notify::ChangeEvent, reactions},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/comments/:id/reactions",
        get(list_reactions).post(add_reaction),
    )
}

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionsListResponse {
    pub reactions: Vec<ReactionCount>,
}

async fn list_reactions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(comment_id): Path<String>,
) -> Result<Json<ReactionsListResponse>> {
    let reactions = reactions::list_reactions(&state.db, &user.id, &comment_id).await?;
    Ok(Json(ReactionsListResponse { reactions }))
}

async fn add_reaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(comment_id): Path<String>,
    Json(body): Json<AddReactionRequest>,
) -> Result<(StatusCode, Json<Reaction>)> {
    let (reaction, scope) =
        reactions::add_reaction(&state.db, &user.id, &comment_id, &body.kind).await?;

    state
        .notifier
        .publish(ChangeEvent::ReactionAdded {
            version_id: scope.version_id,
            comment_id: reaction.comment_id.clone(),
            kind: reaction.kind.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(reaction)))
}
