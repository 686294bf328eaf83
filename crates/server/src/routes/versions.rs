use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Version, VersionSummary},
    error::Result,
    middleware::auth::AuthUser,
    services::{
        notify::ChangeEvent,
        versions::{self, NewVersion},
    },
    AppState,
};

// Merged into the projects router, so the project segment keeps its `:id` name
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/versions", get(list_versions).post(create_version))
        .route("/:id/versions/:version_id", get(get_version))
}

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    pub content: String,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub versions: Vec<VersionSummary>,
}

async fn list_versions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<VersionListResponse>> {
    let versions = versions::list_versions(&state.db, &user.id, &project_id).await?;
    Ok(Json(VersionListResponse { versions }))
}

async fn get_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, version_id)): Path<(String, String)>,
) -> Result<Json<Version>> {
    let version = versions::get_version(&state.db, &user.id, &project_id, &version_id).await?;
    Ok(Json(version))
}

async fn create_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateVersionRequest>,
) -> Result<(StatusCode, Json<Version>)> {
    let version = versions::create_version(
        &state.db,
        &user.id,
        &project_id,
        NewVersion {
            content: body.content,
            language: body.language,
        },
    )
    .await?;

    state
        .notifier
        .publish(ChangeEvent::VersionCreated {
            project_id: version.project_id.clone(),
            version_id: version.id.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(version)))
}
