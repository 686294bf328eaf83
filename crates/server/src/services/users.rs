// Local mirror of identities issued by the external identity provider.

use sqlx::SqliteConnection;

use crate::{
    db::{models::User, now, Database},
    error::{AppError, Result},
};

/// Inserts the user on first sight; later calls are no-ops. Name and email
/// are immutable once mirrored.
pub async fn ensure_user(db: &Database, id: &str, email: &str, name: &str) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
    )
    .bind(id)
    .bind(email)
    .bind(name)
    .bind(now())
    .execute(&db.pool)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "Email already registered"))?
    .rows_affected();

    if inserted > 0 {
        tracing::info!(user_id = %id, "registered user");
    }
    Ok(())
}

pub async fn find_user_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, name, created_at FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}
