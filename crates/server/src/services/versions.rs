// Append-only code history. Versions are inserted, listed and read; nothing
// in this crate updates or deletes a single version row.

use uuid::Uuid;

use crate::{
    db::{
        models::{Language, Version, VersionSummary},
        now, Database,
    },
    error::{AppError, Result},
    services::access,
};

#[derive(Debug, Clone)]
pub struct NewVersion {
    pub content: String,
    pub language: Option<String>,
}

pub async fn create_version(
    db: &Database,
    user_id: &str,
    project_id: &str,
    input: NewVersion,
) -> Result<Version> {
    let mut tx = db.begin_write().await?;

    access::resolve_project_access(&mut tx, user_id, project_id).await?;

    let language = match input.language {
        Some(language) => language.parse::<Language>()?,
        None => {
            let project_language =
                sqlx::query_scalar::<_, String>("SELECT language FROM projects WHERE id = ?")
                    .bind(project_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
            project_language.parse::<Language>()?
        }
    };

    let version = Version {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        author_id: user_id.to_string(),
        language: language.as_str().to_string(),
        content: input.content,
        created_at: now(),
    };

    sqlx::query(
        "INSERT INTO versions (id, project_id, author_id, language, content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&version.id)
    .bind(&version.project_id)
    .bind(&version.author_id)
    .bind(&version.language)
    .bind(&version.content)
    .bind(&version.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        version_id = %version.id,
        project_id = %version.project_id,
        lines = version.line_count(),
        "created version"
    );

    Ok(version)
}

pub async fn list_versions(
    db: &Database,
    user_id: &str,
    project_id: &str,
) -> Result<Vec<VersionSummary>> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_project_access(&mut conn, user_id, project_id).await?;

    let versions = sqlx::query_as::<_, VersionSummary>(
        r#"
        SELECT id, project_id, author_id, language, created_at
        FROM versions
        WHERE project_id = ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(versions)
}

/// A version id is only honoured inside the project it belongs to.
pub async fn get_version(
    db: &Database,
    user_id: &str,
    project_id: &str,
    version_id: &str,
) -> Result<Version> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_project_access(&mut conn, user_id, project_id).await?;

    sqlx::query_as::<_, Version>(
        "SELECT id, project_id, author_id, language, content, created_at FROM versions WHERE id = ? AND project_id = ?",
    )
    .bind(version_id)
    .bind(project_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Version not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{models::MemberRole, test_support::*};

    fn new_version(content: &str, language: Option<&str>) -> NewVersion {
        NewVersion {
            content: content.to_string(),
            language: language.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_language_defaults_to_project_language() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let project = seed_project(&db, &alice).await;

        let version = create_version(&db, &alice, &project, new_version("x", None))
            .await
            .unwrap();
        assert_eq!(version.language, "JAVASCRIPT");

        let version = create_version(&db, &alice, &project, new_version("x", Some("python")))
            .await
            .unwrap();
        assert_eq!(version.language, "PYTHON");
    }

    #[tokio::test]
    async fn test_unknown_language_is_rejected() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let project = seed_project(&db, &alice).await;

        let err = create_version(&db, &alice, &project, new_version("x", Some("cobol")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(count_rows(&db, "versions").await, 0);
    }

    #[tokio::test]
    async fn test_create_version_checks_access() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let carol = seed_user(&db, "Carol").await;
        let project = seed_project(&db, &alice).await;

        let err = create_version(&db, &carol, &project, new_version("x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = create_version(&db, &alice, "missing", new_version("x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(count_rows(&db, "versions").await, 0);
    }

    #[tokio::test]
    async fn test_versions_append_and_list_newest_first() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let bob = seed_user(&db, "Bob").await;
        let project = seed_project(&db, &alice).await;
        seed_member(&db, &project, &bob, MemberRole::Maintainer).await;

        let first = create_version(&db, &alice, &project, new_version("v1", None))
            .await
            .unwrap();
        let second = create_version(&db, &bob, &project, new_version("v2", None))
            .await
            .unwrap();

        let listed = list_versions(&db, &bob, &project).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

        // The earlier snapshot is untouched by the later one
        let fetched = get_version(&db, &bob, &project, &first.id).await.unwrap();
        assert_eq!(fetched.content, "v1");
        assert_eq!(fetched.author_id, alice);
    }

    #[tokio::test]
    async fn test_get_version_is_scoped_to_project() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let project = seed_project(&db, &alice).await;
        let other = seed_project(&db, &alice).await;
        let version = seed_version(&db, &other, &alice, "x").await;

        let err = get_version(&db, &alice, &project, &version)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_versions_all_commit() {
        let (db, _dir) = file_db().await;
        let alice = seed_user(&db, "Alice").await;
        let project = seed_project(&db, &alice).await;

        let mut handles = Vec::new();
        for i in 0..32 {
            let (db, alice, project) = (db.clone(), alice.clone(), project.clone());
            handles.push(tokio::spawn(async move {
                create_version(&db, &alice, &project, new_version(&format!("v{i}"), None)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(list_versions(&db, &alice, &project).await.unwrap().len(), 32);
    }
}
