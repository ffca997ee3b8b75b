use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use reconflow_domain::entities::{Page, Task, TaskStatus};
use reconflow_domain::repositories::TaskRepository;
use reconflow_errors::{ReconError, ReconResult};

/// 任务仓储的 Postgres 实现
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> ReconResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            scan_profile_id: row.try_get("scan_profile_id")?,
            task_type: row.try_get("task_type")?,
            payload: row.try_get("payload")?,
            queue: row.try_get("queue")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            parent_task_id: row.try_get("parent_task_id")?,
            workflow_step: row.try_get("workflow_step")?,
            pending_subtasks: row.try_get("pending_subtasks")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const TASK_COLUMNS: &str = "id, project_id, scan_profile_id, task_type, payload, queue, status, \
     result, started_at, finished_at, parent_task_id, workflow_step, pending_subtasks, \
     created_at, updated_at";

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    #[instrument(skip(self, task), fields(task_type = %task.task_type, step = %task.workflow_step))]
    async fn create(&self, task: &Task) -> ReconResult<Task> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (project_id, scan_profile_id, task_type, payload, queue, status,
                               result, started_at, finished_at, parent_task_id, workflow_step,
                               pending_subtasks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.project_id)
        .bind(task.scan_profile_id)
        .bind(&task.task_type)
        .bind(&task.payload)
        .bind(&task.queue)
        .bind(task.status)
        .bind(&task.result)
        .bind(task.started_at)
        .bind(task.finished_at)
        .bind(task.parent_task_id)
        .bind(&task.workflow_step)
        .bind(task.pending_subtasks)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_task(&row)?;
        debug!(task_id = created.id, "任务记录已创建");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> ReconResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn update(&self, task: &Task) -> ReconResult<Task> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = $2, result = $3, started_at = $4, finished_at = $5,
                pending_subtasks = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(task.status)
        .bind(&task.result)
        .bind(task.started_at)
        .bind(task.finished_at)
        .bind(task.pending_subtasks)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ReconError::TaskNotFound { id: task.id })?;

        Self::row_to_task(&row)
    }

    async fn update_status(&self, id: i64, status: TaskStatus, result: &str) -> ReconResult<()> {
        let finished_at = status.is_terminal().then(Utc::now);
        let affected = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, result = $3,
                finished_at = COALESCE($4, finished_at),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(result)
        .bind(finished_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(ReconError::TaskNotFound { id });
        }
        Ok(())
    }

    async fn find_by_parent_and_step(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<Option<Task>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE parent_task_id = $1 AND workflow_step = $2
            ORDER BY id
            LIMIT 1
            "#
        ))
        .bind(parent_task_id)
        .bind(workflow_step)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn set_pending_subtasks(&self, id: i64, count: i32) -> ReconResult<()> {
        let affected =
            sqlx::query("UPDATE tasks SET pending_subtasks = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(count)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(ReconError::TaskNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn decrement_pending_subtasks(&self, id: i64) -> ReconResult<Option<i32>> {
        let mut tx = self.pool.begin().await?;

        // 行锁串行化并发递减，保证恰好一个调用方观察到归零
        let row = sqlx::query("SELECT pending_subtasks FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ReconError::TaskNotFound { id })?;

        let current: i32 = row.try_get("pending_subtasks")?;
        if current <= 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let remaining = current - 1;
        sqlx::query("UPDATE tasks SET pending_subtasks = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(remaining)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(task_id = id, remaining, "扇出计数递减");
        Ok(Some(remaining))
    }

    async fn list_top_level(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Task>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE project_id = $1 AND parent_task_id = 0",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE project_id = $1 AND parent_task_id = 0
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(project_id)
        .bind((page - 1) * page_size)
        .bind(page_size)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<ReconResult<Vec<_>>>()?;

        Ok(Page {
            total,
            page,
            page_size,
            items,
        })
    }

    async fn find_children(&self, parent_task_id: i64) -> ReconResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_task_id = $1 ORDER BY id"
        ))
        .bind(parent_task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_task).collect()
    }
}
