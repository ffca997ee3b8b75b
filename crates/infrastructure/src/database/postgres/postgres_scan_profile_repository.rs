use async_trait::async_trait;
use sqlx::{PgPool, Row};

use reconflow_domain::entities::{Page, ScanProfile, WorkflowStep};
use reconflow_domain::repositories::ScanProfileRepository;
use reconflow_errors::{ReconError, ReconResult};

/// 扫描模板仓储的 Postgres 实现
///
/// `workflow_steps` 以 JSONB 存储，读取时反序列化为步骤数组。
pub struct PostgresScanProfileRepository {
    pool: PgPool,
}

impl PostgresScanProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_profile(row: &sqlx::postgres::PgRow) -> ReconResult<ScanProfile> {
        let steps_json: serde_json::Value = row.try_get("workflow_steps")?;
        let workflow_steps: Vec<WorkflowStep> = serde_json::from_value(steps_json)?;
        Ok(ScanProfile {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            workflow_steps,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const PROFILE_COLUMNS: &str =
    "id, name, description, workflow_steps, is_active, created_at, updated_at";

#[async_trait]
impl ScanProfileRepository for PostgresScanProfileRepository {
    async fn create(&self, profile: &ScanProfile) -> ReconResult<ScanProfile> {
        let steps_json = serde_json::to_value(&profile.workflow_steps)?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO scan_profiles (name, description, workflow_steps, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(steps_json)
        .bind(profile.is_active)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_profile(&row)
    }

    async fn find_by_id(&self, id: i64) -> ReconResult<Option<ScanProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM scan_profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_profile).transpose()
    }

    async fn find_by_name(&self, name: &str) -> ReconResult<Option<ScanProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM scan_profiles WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_profile).transpose()
    }

    async fn list(&self, page: i64, page_size: i64) -> ReconResult<Page<ScanProfile>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_profiles")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM scan_profiles
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
            .map(Self::row_to_profile)
            .collect::<ReconResult<Vec<_>>>()?;

        Ok(Page {
            total,
            page,
            page_size,
            items,
        })
    }

    async fn update(&self, profile: &ScanProfile) -> ReconResult<ScanProfile> {
        let steps_json = serde_json::to_value(&profile.workflow_steps)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE scan_profiles
            SET name = $2, description = $3, workflow_steps = $4, is_active = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(steps_json)
        .bind(profile.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ReconError::ProfileNotFound { id: profile.id })?;
        Self::row_to_profile(&row)
    }

    async fn delete(&self, id: i64) -> ReconResult<bool> {
        let affected = sqlx::query("DELETE FROM scan_profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}
