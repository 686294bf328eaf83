// Owner-or-member authorization, re-derived from storage on every call.

use sqlx::SqliteConnection;

use crate::{
    db::models::MemberRole,
    error::{AppError, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub project_id: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAccess {
    pub version_id: String,
    pub access: Access,
}

/// Ownership and membership are independent; either one grants access.
/// The owner always resolves to `MemberRole::Owner`, membership row or not.
pub async fn resolve_project_access(
    conn: &mut SqliteConnection,
    user_id: &str,
    project_id: &str,
) -> Result<Access> {
    let owner_id = sqlx::query_scalar::<_, String>("SELECT owner_id FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    if owner_id == user_id {
        return Ok(Access {
            project_id: project_id.to_string(),
            role: MemberRole::Owner,
        });
    }

    let role = sqlx::query_scalar::<_, String>(
        "SELECT role FROM project_members WHERE project_id = ? AND user_id = ?",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::Forbidden("Not a member of this project".to_string()))?;

    Ok(Access {
        project_id: project_id.to_string(),
        role: role.parse()?,
    })
}

pub async fn resolve_version_access(
    conn: &mut SqliteConnection,
    user_id: &str,
    version_id: &str,
) -> Result<Access> {
    let project_id = sqlx::query_scalar::<_, String>("SELECT project_id FROM versions WHERE id = ?")
        .bind(version_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Version not found".to_string()))?;

    resolve_project_access(conn, user_id, &project_id).await
}

pub async fn resolve_comment_access(
    conn: &mut SqliteConnection,
    user_id: &str,
    comment_id: &str,
) -> Result<CommentAccess> {
    let version_id = sqlx::query_scalar::<_, String>("SELECT version_id FROM comments WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    let access = resolve_version_access(conn, user_id, &version_id).await?;
    Ok(CommentAccess { version_id, access })
}
