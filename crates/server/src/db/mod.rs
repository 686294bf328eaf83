pub mod models;

use std::{
    ops::{Deref, DerefMut},
    str::FromStr,
    time::Duration,
};

use chrono::{SecondsFormat, Utc};
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqliteConnection, SqlitePool,
};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        if url.starts_with("sqlite::memory:") {
            return Self::in_memory().await;
        }

        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = pool_options()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// A private in-memory database. Pinned to one connection, since every
    /// SQLite connection to `:memory:` opens a separate database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = pool_options()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Takes the write lock up front, so waiting for it is covered by the
    /// busy timeout.
    pub async fn begin_write(&self) -> Result<WriteTx, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(WriteTx { conn })
    }
}

fn pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new().after_release(|conn, _meta| {
        Box::pin(async move {
            // Rolls back a write that was never committed, whether it failed
            // or its future was dropped. Fails harmlessly when nothing is open.
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Ok::<_, sqlx::Error>(true)
        })
    })
}

/// An open `BEGIN IMMEDIATE` transaction. Dropping it without `commit`
/// rolls back once the connection returns to the pool.
pub struct WriteTx {
    conn: PoolConnection<Sqlite>,
}

impl WriteTx {
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        Ok(())
    }
}

impl Deref for WriteTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.conn
    }
}

impl DerefMut for WriteTx {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

/// Current time as fixed-width RFC 3339, so text ordering matches time ordering.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
pub mod test_support {
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::{now, Database};
    use crate::db::models::MemberRole;

    pub async fn memory_db() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    /// A WAL database file with the production pool, for tests where
    /// connections really race. Keep the `TempDir` alive for the test.
    pub async fn file_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("review.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.run_migrations().await.unwrap();
        (db, dir)
    }

    pub async fn seed_user(db: &Database, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(format!("{}@example.com", name.to_lowercase()))
            .bind(name)
            .bind(now())
            .execute(&db.pool)
            .await
            .unwrap();
        id
    }

    pub async fn seed_project(db: &Database, owner_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO projects (id, owner_id, name, description, language, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind("Review Platform")
        .bind(Option::<String>::None)
        .bind("JAVASCRIPT")
        .bind(now())
        .execute(&db.pool)
        .await
        .unwrap();
        id
    }

    pub async fn seed_member(db: &Database, project_id: &str, user_id: &str, role: MemberRole) {
        sqlx::query("INSERT INTO project_members (project_id, user_id, role) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(user_id)
            .bind(role.as_str())
            .execute(&db.pool)
            .await
            .unwrap();
    }

    pub async fn seed_version(db: &Database, project_id: &str, author_id: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO versions (id, project_id, author_id, language, content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(author_id)
        .bind("JAVASCRIPT")
        .bind(content)
        .bind(now())
        .execute(&db.pool)
        .await
        .unwrap();
        id
    }

    pub async fn count_rows(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }
}
