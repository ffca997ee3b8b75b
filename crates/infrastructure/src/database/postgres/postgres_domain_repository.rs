use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use reconflow_domain::entities::{Domain, Page};
use reconflow_domain::repositories::DomainRepository;
use reconflow_errors::ReconResult;

/// 域名仓储的 Postgres 实现
pub struct PostgresDomainRepository {
    pool: PgPool,
}

impl PostgresDomainRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_domain(row: &sqlx::postgres::PgRow) -> ReconResult<Domain> {
        Ok(Domain {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            fqdn: row.try_get("fqdn")?,
            root_domain: row.try_get("root_domain")?,
            source: row.try_get("source")?,
            last_seen_at: row.try_get("last_seen_at")?,
        })
    }
}

#[async_trait]
impl DomainRepository for PostgresDomainRepository {
    async fn upsert_many(&self, domains: &[Domain]) -> ReconResult<()> {
        if domains.is_empty() {
            return Ok(());
        }

        // (project_id, fqdn) 冲突时保留首次发现记录，仅刷新存活时间
        for domain in domains {
            sqlx::query(
                r#"
                INSERT INTO domains (project_id, fqdn, root_domain, source, last_seen_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (project_id, fqdn)
                DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at, updated_at = NOW()
                "#,
            )
            .bind(domain.project_id)
            .bind(&domain.fqdn)
            .bind(&domain.root_domain)
            .bind(&domain.source)
            .bind(domain.last_seen_at)
            .execute(&self.pool)
            .await?;
        }

        debug!(count = domains.len(), "域名批量写入完成");
        Ok(())
    }

    async fn find_by_fqdns(&self, project_id: i64, fqdns: &[String]) -> ReconResult<Vec<Domain>> {
        if fqdns.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, fqdn, root_domain, source, last_seen_at
            FROM domains
            WHERE project_id = $1 AND fqdn = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(project_id)
        .bind(fqdns)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_domain).collect()
    }

    async fn list_by_project(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Domain>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM domains WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, project_id, fqdn, root_domain, source, last_seen_at
            FROM domains
            WHERE project_id = $1
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(project_id)
        .bind((page - 1) * page_size)
        .bind(page_size)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_domain)
            .collect::<ReconResult<Vec<_>>>()?;

        Ok(Page {
            total,
            page,
            page_size,
            items,
        })
    }
}
