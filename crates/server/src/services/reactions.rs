use uuid::Uuid;

use crate::{
    db::{
        models::{Reaction, ReactionCount},
        now, Database,
    },
    error::{AppError, Result},
    services::access::{self, CommentAccess},
};

const MAX_KIND_LEN: usize = 32;

// Uniqueness of (comment, user, kind) is enforced by the table constraint.
pub async fn add_reaction(
    db: &Database,
    user_id: &str,
    comment_id: &str,
    kind: &str,
) -> Result<(Reaction, CommentAccess)> {
    let mut conn = db.pool.acquire().await?;
    let scope = access::resolve_comment_access(&mut conn, user_id, comment_id).await?;

    let kind = kind.trim();
    if kind.is_empty() || kind.chars().count() > MAX_KIND_LEN {
        return Err(AppError::Validation(format!(
            "Reaction kind must be 1-{MAX_KIND_LEN} characters"
        )));
    }

    let reaction = Reaction {
        id: Uuid::new_v4().to_string(),
        comment_id: comment_id.to_string(),
        user_id: user_id.to_string(),
        kind: kind.to_string(),
        created_at: now(),
    };

    sqlx::query(
        "INSERT INTO reactions (id, comment_id, user_id, kind, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&reaction.id)
    .bind(&reaction.comment_id)
    .bind(&reaction.user_id)
    .bind(&reaction.kind)
    .bind(&reaction.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "Reaction already exists"))?;

    tracing::info!(
        comment_id = %reaction.comment_id,
        kind = %reaction.kind,
        "added reaction"
    );

    Ok((reaction, scope))
}

pub async fn list_reactions(
    db: &Database,
    user_id: &str,
    comment_id: &str,
) -> Result<Vec<ReactionCount>> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_comment_access(&mut conn, user_id, comment_id).await?;

    let counts = sqlx::query_as::<_, ReactionCount>(
        "SELECT kind, COUNT(*) AS count FROM reactions WHERE comment_id = ? GROUP BY kind ORDER BY kind ASC",
    )
    .bind(comment_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(counts)
}
