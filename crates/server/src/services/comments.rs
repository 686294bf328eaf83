// Line-anchored comments on a version, one level of threading.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    db::{
        models::{Author, Comment, CommentNode, Thread, Version},
        now, Database,
    },
    error::{AppError, Result},
    services::{access, scoring},
};

#[derive(Debug, Clone)]
pub struct NewComment {
    pub line: i64,
    pub body: String,
    pub thread: Thread,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    version_id: String,
    line: i64,
    body: String,
    parent_id: Option<String>,
    created_at: String,
    author_id: String,
    author_name: String,
    author_email: String,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            version_id: row.version_id,
            line: row.line,
            body: row.body,
            thread: Thread::from(row.parent_id),
            created_at: row.created_at,
            author: Author {
                id: row.author_id,
                name: row.author_name,
                email: row.author_email,
            },
        }
    }
}

const SELECT_COMMENTS: &str = r#"
    SELECT c.id, c.version_id, c.line, c.body, c.parent_id, c.created_at,
           u.id AS author_id, u.name AS author_name, u.email AS author_email
    FROM comments c
    JOIN users u ON c.author_id = u.id
"#;

pub async fn list_comments(
    db: &Database,
    user_id: &str,
    version_id: &str,
) -> Result<Vec<CommentNode>> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_version_access(&mut conn, user_id, version_id).await?;

    let rows = sqlx::query_as::<_, CommentRow>(&format!(
        "{SELECT_COMMENTS} WHERE c.version_id = ? ORDER BY c.line ASC, c.created_at ASC, c.rowid ASC"
    ))
    .bind(version_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(build_thread_tree(rows.into_iter().map(Comment::from)))
}

/// Expects comments already sorted; keeps that order at both levels.
fn build_thread_tree(comments: impl IntoIterator<Item = Comment>) -> Vec<CommentNode> {
    let mut roots = Vec::new();
    let mut replies: HashMap<String, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match comment.thread.parent_id() {
            Some(parent_id) => replies
                .entry(parent_id.to_string())
                .or_default()
                .push(comment),
            None => roots.push(comment),
        }
    }

    roots
        .into_iter()
        .map(|comment| CommentNode {
            replies: replies.remove(&comment.id).unwrap_or_default(),
            comment,
        })
        .collect()
}

pub async fn get_comment(db: &Database, user_id: &str, comment_id: &str) -> Result<Comment> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_comment_access(&mut conn, user_id, comment_id).await?;

    let row = sqlx::query_as::<_, CommentRow>(&format!("{SELECT_COMMENTS} WHERE c.id = ?"))
        .bind(comment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    Ok(row.into())
}

/// Inserts the comment, bumps the author's stats and appends the audit row
/// in one transaction. Any failure leaves none of the three behind.
pub async fn create_comment(
    db: &Database,
    user_id: &str,
    version_id: &str,
    input: NewComment,
) -> Result<Comment> {
    let mut tx = db.begin_write().await?;

    let access = access::resolve_version_access(&mut tx, user_id, version_id).await?;

    if input.body.trim().is_empty() {
        return Err(AppError::Validation(
            "Comment body is required".to_string(),
        ));
    }

    if let Thread::Reply(parent_id) = &input.thread {
        let (parent_version_id, grandparent_id) = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT version_id, parent_id FROM comments WHERE id = ?",
        )
        .bind(parent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Validation("Parent comment not found".to_string()))?;

        if parent_version_id != version_id {
            return Err(AppError::Validation(
                "Parent comment belongs to a different version".to_string(),
            ));
        }
        if grandparent_id.is_some() {
            return Err(AppError::Validation(
                "Replies can only be made to top-level comments".to_string(),
            ));
        }
    }

    let version = sqlx::query_as::<_, Version>(
        "SELECT id, project_id, author_id, language, content, created_at FROM versions WHERE id = ?",
    )
    .bind(version_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Version not found".to_string()))?;

    let line_count = version.line_count() as i64;
    if input.line < 1 || input.line > line_count {
        return Err(AppError::Validation(format!(
            "Line {} is outside the version (1-{line_count})",
            input.line
        )));
    }

    let comment_id = Uuid::new_v4().to_string();
    let created_at = now();

    sqlx::query(
        "INSERT INTO comments (id, version_id, author_id, line, body, parent_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&comment_id)
    .bind(version_id)
    .bind(user_id)
    .bind(input.line)
    .bind(&input.body)
    .bind(input.thread.parent_id())
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;

    scoring::record_comment_award(&mut tx, user_id, &access.project_id, version_id).await?;

    let author = sqlx::query_as::<_, Author>("SELECT id, name, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        comment_id = %comment_id,
        version_id = %version_id,
        line = input.line,
        points = scoring::COMMENT_POINTS,
        "created comment"
    );

    Ok(Comment {
        id: comment_id,
        version_id: version_id.to_string(),
        line: input.line,
        body: input.body,
        thread: input.thread,
        created_at,
        author,
    })
}
