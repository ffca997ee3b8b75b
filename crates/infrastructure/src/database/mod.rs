//! 数据库连接池与模式迁移

pub mod postgres;

use reconflow_config::DatabaseConfig;
use reconflow_errors::{ReconError, ReconResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// 按配置创建 Postgres 连接池
pub async fn create_pool(config: &DatabaseConfig) -> ReconResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&config.url)
        .await
        .map_err(ReconError::Database)?;

    info!("数据库连接池创建成功 (max_connections={})", config.max_connections);
    Ok(pool)
}

/// 幂等建表
///
/// 启动时执行，已存在的表和索引不受影响。
pub async fn run_migrations(pool: &PgPool) -> ReconResult<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id          BIGSERIAL PRIMARY KEY,
            name        VARCHAR(255) NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            status      VARCHAR(50) NOT NULL DEFAULT 'active',
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at  TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS project_targets (
            id          BIGSERIAL PRIMARY KEY,
            project_id  BIGINT NOT NULL,
            value       VARCHAR(1024) NOT NULL,
            target_type VARCHAR(50) NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_active   BOOLEAN NOT NULL DEFAULT TRUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (project_id, value)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS scan_profiles (
            id             BIGSERIAL PRIMARY KEY,
            name           VARCHAR(100) NOT NULL UNIQUE,
            description    TEXT NOT NULL DEFAULT '',
            workflow_steps JSONB NOT NULL,
            is_active      BOOLEAN NOT NULL DEFAULT TRUE,
            created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id               BIGSERIAL PRIMARY KEY,
            project_id       BIGINT NOT NULL DEFAULT 0,
            scan_profile_id  BIGINT NOT NULL DEFAULT 0,
            task_type        VARCHAR(100) NOT NULL DEFAULT '',
            payload          JSONB NOT NULL DEFAULT 'null',
            queue            VARCHAR(50) NOT NULL DEFAULT '',
            status           VARCHAR(50) NOT NULL DEFAULT 'pending',
            result           TEXT NOT NULL DEFAULT '',
            started_at       TIMESTAMPTZ,
            finished_at      TIMESTAMPTZ,
            parent_task_id   BIGINT NOT NULL DEFAULT 0,
            workflow_step    VARCHAR(100) NOT NULL DEFAULT '',
            pending_subtasks INTEGER NOT NULL DEFAULT 0,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks (project_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_parent_step ON tasks (parent_task_id, workflow_step)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)",
        r#"
        CREATE TABLE IF NOT EXISTS task_outputs (
            id             BIGSERIAL PRIMARY KEY,
            task_id        BIGINT NOT NULL UNIQUE,
            parent_task_id BIGINT NOT NULL DEFAULT 0,
            output_type    VARCHAR(100) NOT NULL DEFAULT '',
            data           JSONB,
            created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_task_outputs_parent ON task_outputs (parent_task_id)",
        r#"
        CREATE TABLE IF NOT EXISTS domains (
            id           BIGSERIAL PRIMARY KEY,
            project_id   BIGINT NOT NULL,
            fqdn         VARCHAR(255) NOT NULL,
            root_domain  VARCHAR(255) NOT NULL DEFAULT '',
            source       VARCHAR(100) NOT NULL DEFAULT '',
            last_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (project_id, fqdn)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_domains_root ON domains (root_domain)",
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id           BIGSERIAL PRIMARY KEY,
            project_id   BIGINT NOT NULL,
            ip           VARCHAR(128) NOT NULL,
            port         INTEGER NOT NULL,
            protocol     VARCHAR(50) NOT NULL DEFAULT '',
            source       VARCHAR(100) NOT NULL DEFAULT '',
            title        TEXT NOT NULL DEFAULT '',
            web_server   VARCHAR(255) NOT NULL DEFAULT '',
            technologies TEXT[] NOT NULL DEFAULT '{}',
            last_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (project_id, ip, port)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS asset_domain_mappings (
            asset_id  BIGINT NOT NULL,
            domain_id BIGINT NOT NULL,
            PRIMARY KEY (asset_id, domain_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ip_metadata (
            ip           VARCHAR(128) PRIMARY KEY,
            asn          VARCHAR(100) NOT NULL DEFAULT '',
            organization VARCHAR(255) NOT NULL DEFAULT '',
            country_code VARCHAR(10) NOT NULL DEFAULT '',
            source       VARCHAR(100) NOT NULL DEFAULT '',
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(ReconError::Database)?;
    }

    info!("数据库迁移完成");
    Ok(())
}
