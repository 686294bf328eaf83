use uuid::Uuid;

use crate::{
    db::{
        models::{Language, MemberRole, Project, ProjectMember},
        now, Database,
    },
    error::{AppError, Result},
    services::{access, users},
};

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub language: String,
}

pub async fn create_project(db: &Database, owner_id: &str, input: NewProject) -> Result<Project> {
    if input.name.trim().is_empty() {
        return Err(AppError::Validation("Project name is required".to_string()));
    }
    let language = input.language.parse::<Language>()?;

    let project = Project {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        name: input.name.trim().to_string(),
        description: input.description,
        language: language.as_str().to_string(),
        created_at: now(),
    };

    sqlx::query(
        "INSERT INTO projects (id, owner_id, name, description, language, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&project.id)
    .bind(&project.owner_id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.language)
    .bind(&project.created_at)
    .execute(&db.pool)
    .await?;

    tracing::info!(project_id = %project.id, owner_id = %project.owner_id, "created project");

    Ok(project)
}

pub async fn list_projects(db: &Database, user_id: &str) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        r#"
        SELECT DISTINCT p.id, p.owner_id, p.name, p.description, p.language, p.created_at
        FROM projects p
        LEFT JOIN project_members pm ON p.id = pm.project_id
        WHERE p.owner_id = ? OR pm.user_id = ?
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&db.pool)
    .await?;

    Ok(projects)
}

pub async fn get_project(db: &Database, user_id: &str, project_id: &str) -> Result<Project> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_project_access(&mut conn, user_id, project_id).await?;

    sqlx::query_as::<_, Project>(
        "SELECT id, owner_id, name, description, language, created_at FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn require_owner(
    conn: &mut sqlx::SqliteConnection,
    user_id: &str,
    project_id: &str,
) -> Result<()> {
    let owner_id = sqlx::query_scalar::<_, String>("SELECT owner_id FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "Only the owner can manage this project".to_string(),
        ));
    }
    Ok(())
}

/// Deletes the project and everything under it, leaves first, in one
/// transaction. Audit rows and earned stats outlive the project.
pub async fn delete_project(db: &Database, user_id: &str, project_id: &str) -> Result<()> {
    let mut tx = db.begin_write().await?;
    require_owner(&mut tx, user_id, project_id).await?;

    let cascade = [
        r#"DELETE FROM reactions WHERE comment_id IN (
            SELECT c.id FROM comments c JOIN versions v ON c.version_id = v.id
            WHERE v.project_id = ?)"#,
        r#"DELETE FROM comments WHERE parent_id IS NOT NULL AND version_id IN (
            SELECT id FROM versions WHERE project_id = ?)"#,
        "DELETE FROM comments WHERE version_id IN (SELECT id FROM versions WHERE project_id = ?)",
        "DELETE FROM versions WHERE project_id = ?",
        "DELETE FROM project_members WHERE project_id = ?",
        "DELETE FROM projects WHERE id = ?",
    ];

    for statement in cascade {
        sqlx::query(statement)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(project_id = %project_id, "deleted project");
    Ok(())
}

pub async fn list_members(
    db: &Database,
    user_id: &str,
    project_id: &str,
) -> Result<Vec<ProjectMember>> {
    let mut conn = db.pool.acquire().await?;
    access::resolve_project_access(&mut conn, user_id, project_id).await?;

    let members = sqlx::query_as::<_, ProjectMember>(
        r#"
        SELECT pm.project_id, u.id AS user_id, u.name AS user_name, u.email AS user_email, pm.role
        FROM project_members pm
        JOIN users u ON pm.user_id = u.id
        WHERE pm.project_id = ?
        ORDER BY u.name ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(members)
}

pub async fn add_member(
    db: &Database,
    user_id: &str,
    project_id: &str,
    email: &str,
    role: &str,
) -> Result<ProjectMember> {
    let role = role.parse::<MemberRole>()?;

    let mut tx = db.begin_write().await?;
    require_owner(&mut tx, user_id, project_id).await?;

    let target = users::find_user_by_email(&mut tx, email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if target.id == user_id {
        return Err(AppError::Validation(
            "The owner already has full access".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO project_members (project_id, user_id, role) VALUES (?, ?, ?)
        ON CONFLICT(project_id, user_id) DO UPDATE SET role = excluded.role
        "#,
    )
    .bind(project_id)
    .bind(&target.id)
    .bind(role.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(project_id = %project_id, user_id = %target.id, role = %role, "set project member");

    Ok(ProjectMember {
        project_id: project_id.to_string(),
        user_id: target.id,
        user_name: target.name,
        user_email: target.email,
        role: role.as_str().to_string(),
    })
}

/// The owner may remove anyone; a member may remove themselves.
pub async fn remove_member(
    db: &Database,
    user_id: &str,
    project_id: &str,
    member_id: &str,
) -> Result<()> {
    let mut conn = db.pool.acquire().await?;
    if member_id != user_id {
        require_owner(&mut conn, user_id, project_id).await?;
    }

    let removed = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(project_id)
        .bind(member_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound("Member not found".to_string()));
    }

    tracing::info!(project_id = %project_id, user_id = %member_id, "removed project member");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{models::Thread, test_support::*},
        services::{
            comments::{create_comment, NewComment},
            reactions::add_reaction,
            scoring::get_user_stat,
        },
    };

    fn new_project(name: &str, language: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            description: None,
            language: language.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_projects() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let bob = seed_user(&db, "Bob").await;

        let project = create_project(&db, &alice, new_project("Analyzer", "java"))
            .await
            .unwrap();
        assert_eq!(project.language, "JAVA");

        assert_eq!(list_projects(&db, &alice).await.unwrap().len(), 1);
        assert!(list_projects(&db, &bob).await.unwrap().is_empty());

        add_member(&db, &alice, &project.id, "bob@example.com", "reviewer")
            .await
            .unwrap();
        let listed = list_projects(&db, &bob).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, project.id);
    }

    #[tokio::test]
    async fn test_create_project_validates_input() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;

        let err = create_project(&db, &alice, new_project(" ", "java"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create_project(&db, &alice, new_project("x", "rust"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_only_owner_manages_members() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let bob = seed_user(&db, "Bob").await;
        seed_user(&db, "Carol").await;
        let project = seed_project(&db, &alice).await;
        seed_member(&db, &project, &bob, MemberRole::Maintainer).await;

        let err = add_member(&db, &bob, &project, "carol@example.com", "reviewer")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = add_member(&db, &alice, &project, "alice@example.com", "reviewer")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = add_member(&db, &alice, &project, "nobody@example.com", "reviewer")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let updated = add_member(&db, &alice, &project, "bob@example.com", "REVIEWER")
            .await
            .unwrap();
        assert_eq!(updated.role, "REVIEWER");
        assert_eq!(count_rows(&db, "project_members").await, 1);
    }

    #[tokio::test]
    async fn test_member_can_leave_and_loses_access() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let bob = seed_user(&db, "Bob").await;
        let carol = seed_user(&db, "Carol").await;
        let project = seed_project(&db, &alice).await;
        seed_member(&db, &project, &bob, MemberRole::Reviewer).await;
        seed_member(&db, &project, &carol, MemberRole::Reviewer).await;

        let err = remove_member(&db, &carol, &project, &bob).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        remove_member(&db, &bob, &project, &bob).await.unwrap();
        let err = get_project(&db, &bob, &project).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let members = list_members(&db, &alice, &project).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, carol);
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let db = memory_db().await;
        let alice = seed_user(&db, "Alice").await;
        let bob = seed_user(&db, "Bob").await;
        let project = seed_project(&db, &alice).await;
        let kept = seed_project(&db, &alice).await;
        seed_member(&db, &project, &bob, MemberRole::Reviewer).await;
        let version = seed_version(&db, &project, &alice, "a\nb").await;
        let kept_version = seed_version(&db, &kept, &alice, "a").await;

        let root = create_comment(
            &db,
            &bob,
            &version,
            NewComment { line: 1, body: "a".into(), thread: Thread::Root },
        )
        .await
        .unwrap();
        create_comment(
            &db,
            &alice,
            &version,
            NewComment { line: 1, body: "b".into(), thread: Thread::Reply(root.id.clone()) },
        )
        .await
        .unwrap();
        add_reaction(&db, &alice, &root.id, "upvote").await.unwrap();
        create_comment(
            &db,
            &alice,
            &kept_version,
            NewComment { line: 1, body: "kept".into(), thread: Thread::Root },
        )
        .await
        .unwrap();

        let err = delete_project(&db, &bob, &project).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        delete_project(&db, &alice, &project).await.unwrap();

        assert_eq!(count_rows(&db, "projects").await, 1);
        assert_eq!(count_rows(&db, "versions").await, 1);
        assert_eq!(count_rows(&db, "comments").await, 1);
        assert_eq!(count_rows(&db, "reactions").await, 0);
        assert_eq!(count_rows(&db, "project_members").await, 0);
        assert_eq!(count_rows(&db, "review_activities").await, 3);

        let audited = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM review_activities WHERE project_id = ? AND version_id = ?",
        )
        .bind(&project)
        .bind(&version)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(audited, 2);

        let bob_stat = get_user_stat(&db, &bob).await.unwrap();
        assert_eq!((bob_stat.points, bob_stat.comments_count), (2, 1));
        let alice_stat = get_user_stat(&db, &alice).await.unwrap();
        assert_eq!((alice_stat.points, alice_stat.comments_count), (4, 2));

        let err = get_project(&db, &alice, &project).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
