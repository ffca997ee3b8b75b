use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use reconflow_domain::entities::TaskOutput;
use reconflow_domain::repositories::TaskOutputRepository;
use reconflow_errors::{ReconError, ReconResult};

/// 任务输出仓储的 Postgres 实现
pub struct PostgresTaskOutputRepository {
    pool: PgPool,
}

impl PostgresTaskOutputRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_output(row: &sqlx::postgres::PgRow) -> ReconResult<TaskOutput> {
        Ok(TaskOutput {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            parent_task_id: row.try_get("parent_task_id")?,
            output_type: row.try_get("output_type")?,
            data: row
                .try_get::<Option<serde_json::Value>, _>("data")?
                .unwrap_or(serde_json::Value::Null),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TaskOutputRepository for PostgresTaskOutputRepository {
    async fn create(&self, output: &TaskOutput) -> ReconResult<TaskOutput> {
        let row = sqlx::query(
            r#"
            INSERT INTO task_outputs (task_id, parent_task_id, output_type, data)
            VALUES ($1, $2, $3, $4)
            RETURNING id, task_id, parent_task_id, output_type, data, created_at
            "#,
        )
        .bind(output.task_id)
        .bind(output.parent_task_id)
        .bind(&output.output_type)
        .bind(&output.data)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_output(&row)?;
        debug!(task_id = created.task_id, "任务输出已保存");
        Ok(created)
    }

    async fn find_by_task_id(&self, task_id: i64) -> ReconResult<Option<TaskOutput>> {
        let row = sqlx::query(
            r#"
            SELECT id, task_id, parent_task_id, output_type, data, created_at
            FROM task_outputs
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_output).transpose()
    }

    async fn update_data(&self, task_id: i64, data: &serde_json::Value) -> ReconResult<()> {
        let affected = sqlx::query("UPDATE task_outputs SET data = $2 WHERE task_id = $1")
            .bind(task_id)
            .bind(data)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(ReconError::TaskOutputNotFound { task_id });
        }
        Ok(())
    }

    async fn find_child_outputs(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<Vec<TaskOutput>> {
        // 扇入聚合：按子任务的父指针与步骤名过滤
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.task_id, o.parent_task_id, o.output_type, o.data, o.created_at
            FROM task_outputs o
            JOIN tasks t ON t.id = o.task_id
            WHERE t.parent_task_id = $1 AND t.workflow_step = $2
            ORDER BY o.id
            "#,
        )
        .bind(parent_task_id)
        .bind(workflow_step)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_output).collect()
    }
}
