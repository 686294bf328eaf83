use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Project, ProjectMember, ReviewActivity},
    error::Result,
    middleware::auth::AuthUser,
    services::{
        projects::{self, NewProject},
        scoring,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:id", get(get_project).delete(delete_project))
        .route("/:id/members", get(list_members).post(add_member))
        .route(
            "/:id/members/:user_id",
            axum::routing::delete(remove_member),
        )
        .route("/:id/activity", get(list_activity))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct MembersListResponse {
    pub members: Vec<ProjectMember>,
}

#[derive(Debug, Serialize)]
pub struct ActivityListResponse {
    pub activity: Vec<ReviewActivity>,
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProjectListResponse>> {
    let projects = projects::list_projects(&state.db, &user.id).await?;
    Ok(Json(ProjectListResponse { projects }))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>)> {
    let project = projects::create_project(
        &state.db,
        &user.id,
        NewProject {
            name: body.name,
            description: body.description,
            language: body.language,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Project>> {
    Ok(Json(projects::get_project(&state.db, &user.id, &id).await?))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    projects::delete_project(&state.db, &user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MembersListResponse>> {
    let members = projects::list_members(&state.db, &user.id, &id).await?;
    Ok(Json(MembersListResponse { members }))
}

async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<ProjectMember>> {
    let member = projects::add_member(&state.db, &user.id, &id, &body.email, &body.role).await?;
    Ok(Json(member))
}

async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    projects::remove_member(&state.db, &user.id, &id, &member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_activity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ActivityListResponse>> {
    let activity = scoring::list_project_activity(&state.db, &user.id, &id).await?;
    Ok(Json(ActivityListResponse { activity }))
}
