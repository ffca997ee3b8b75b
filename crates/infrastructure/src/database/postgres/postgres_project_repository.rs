use async_trait::async_trait;
use sqlx::{PgPool, Row};

use reconflow_domain::entities::{Page, Project, ProjectTarget};
use reconflow_domain::repositories::{ProjectRepository, ProjectTargetRepository};
use reconflow_errors::{ReconError, ReconResult};

/// 项目仓储的 Postgres 实现
pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_project(row: &sqlx::postgres::PgRow) -> ReconResult<Project> {
        Ok(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

const PROJECT_COLUMNS: &str =
    "id, name, description, status, created_at, updated_at, deleted_at";

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn create(&self, project: &Project) -> ReconResult<Project> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO projects (name, description, status)
            VALUES ($1, $2, $3)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_project(&row)
    }

    async fn find_by_id(&self, id: i64) -> ReconResult<Option<Project>> {
        let row = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn find_by_name(&self, name: &str) -> ReconResult<Option<Project>> {
        let row = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn list(&self, page: i64, page_size: i64) -> ReconResult<Page<Project>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {PROJECT_COLUMNS} FROM projects
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            OFFSET $1 LIMIT $2
            "#
        ))
        .bind((page - 1) * page_size)
        .bind(page_size)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_project)
            .collect::<ReconResult<Vec<_>>>()?;

        Ok(Page {
            total,
            page,
            page_size,
            items,
        })
    }

    async fn update(&self, project: &Project) -> ReconResult<Project> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE projects
            SET name = $2, description = $3, status = $4, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ReconError::ProjectNotFound { id: project.id })?;
        Self::row_to_project(&row)
    }

    async fn delete(&self, id: i64) -> ReconResult<bool> {
        let affected = sqlx::query(
            "UPDATE projects SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }
}

/// 扫描目标仓储的 Postgres 实现
pub struct PostgresProjectTargetRepository {
    pool: PgPool,
}

impl PostgresProjectTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_target(row: &sqlx::postgres::PgRow) -> ReconResult<ProjectTarget> {
        Ok(ProjectTarget {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            value: row.try_get("value")?,
            target_type: row.try_get("target_type")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ProjectTargetRepository for PostgresProjectTargetRepository {
    async fn create(&self, target: &ProjectTarget) -> ReconResult<ProjectTarget> {
        let row = sqlx::query(
            r#"
            INSERT INTO project_targets (project_id, value, target_type, description, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, project_id, value, target_type, description, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(target.project_id)
        .bind(&target.value)
        .bind(target.target_type)
        .bind(&target.description)
        .bind(target.is_active)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_target(&row)
    }

    async fn find_by_project(&self, project_id: i64) -> ReconResult<Vec<ProjectTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, value, target_type, description, is_active,
                   created_at, updated_at
            FROM project_targets
            WHERE project_id = $1
            ORDER BY id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_target).collect()
    }

    async fn delete(&self, id: i64) -> ReconResult<bool> {
        let affected = sqlx::query("DELETE FROM project_targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}
