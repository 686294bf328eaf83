// Per-user counters and the audit trail behind them. Both are only written
// from inside the comment-creation transaction.

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    db::{
        models::{ActivityKind, ReviewActivity, UserStat},
        now, Database,
    },
    error::Result,
    services::access,
};

pub const COMMENT_POINTS: i64 = 2;

/// Bumps the author's counters and appends the matching audit row. Must run
/// on the caller's open transaction; the increment happens in a single
/// upsert statement so concurrent commenters never lose an update.
pub async fn record_comment_award(
    conn: &mut SqliteConnection,
    user_id: &str,
    project_id: &str,
    version_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_stats (user_id, points, comments_count) VALUES (?, ?, 1)
        ON CONFLICT(user_id) DO UPDATE SET
            points = points + excluded.points,
            comments_count = comments_count + 1
        "#,
    )
    .bind(user_id)
    .bind(COMMENT_POINTS)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO review_activities (id, user_id, project_id, version_id, kind, points, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(project_id)
    .bind(version_id)
    .bind(ActivityKind::Comment.as_str())
    .bind(COMMENT_POINTS)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_user_stat(db: &Database, user_id: &str) -> Result<UserStat> {
    let stat = sqlx::query_as::<_, UserStat>(
        "SELECT user_id, points, comments_count FROM user_stats WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&db.pool)
    .await?;

    Ok(stat.unwrap_or_else(|| UserStat {
        user_id: user_id.to_string(),
        ..Default::default()
    }))
}

pub async fn list_project_activity(
    db: &Database,
    user_id: &str,
    project_id: &str,
) -> Result<Vec<ReviewActivity>> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_project_access(&mut conn, user_id, project_id).await?;

    let activities = sqlx::query_as::<_, ReviewActivity>(
        r#"
        SELECT id, user_id, project_id, version_id, kind, points, created_at
        FROM review_activities
        WHERE project_id = ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(activities)
}
