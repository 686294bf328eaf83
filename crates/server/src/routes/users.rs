use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::models::UserStat, error::Result, middleware::auth::AuthUser, services::scoring, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me/stats", get(my_stats))
        .route("/users/:id/stats", get(user_stats))
}

async fn my_stats(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserStat>> {
    Ok(Json(scoring::get_user_stat(&state.db, &user.id).await?))
}

async fn user_stats(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserStat>> {
    Ok(Json(scoring::get_user_stat(&state.db, &id).await?))
}
