use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use reconflow_domain::entities::{Asset, AssetDomainMapping, Page};
use reconflow_domain::repositories::AssetRepository;
use reconflow_errors::ReconResult;

/// 资产仓储的 Postgres 实现
pub struct PostgresAssetRepository {
    pool: PgPool,
}

impl PostgresAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_asset(row: &sqlx::postgres::PgRow) -> ReconResult<Asset> {
        Ok(Asset {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            ip: row.try_get("ip")?,
            port: row.try_get("port")?,
            protocol: row.try_get("protocol")?,
            source: row.try_get("source")?,
            title: row.try_get("title")?,
            web_server: row.try_get("web_server")?,
            technologies: row.try_get("technologies")?,
            last_seen_at: row.try_get("last_seen_at")?,
        })
    }
}

#[async_trait]
impl AssetRepository for PostgresAssetRepository {
    async fn upsert_many(&self, assets: &[Asset]) -> ReconResult<()> {
        if assets.is_empty() {
            return Ok(());
        }

        // (project_id, ip, port) 冲突时只更新快照列
        for asset in assets {
            sqlx::query(
                r#"
                INSERT INTO assets (project_id, ip, port, protocol, source, title, web_server,
                                    technologies, last_seen_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (project_id, ip, port)
                DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at,
                              title = EXCLUDED.title,
                              web_server = EXCLUDED.web_server,
                              technologies = EXCLUDED.technologies,
                              updated_at = NOW()
                "#,
            )
            .bind(asset.project_id)
            .bind(&asset.ip)
            .bind(asset.port)
            .bind(&asset.protocol)
            .bind(&asset.source)
            .bind(&asset.title)
            .bind(&asset.web_server)
            .bind(&asset.technologies)
            .bind(asset.last_seen_at)
            .execute(&self.pool)
            .await?;
        }

        debug!(count = assets.len(), "资产批量写入完成");
        Ok(())
    }

    async fn find_by_ips(&self, project_id: i64, ips: &[String]) -> ReconResult<Vec<Asset>> {
        if ips.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, ip, port, protocol, source, title, web_server,
                   technologies, last_seen_at
            FROM assets
            WHERE project_id = $1 AND ip = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(project_id)
        .bind(ips)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_asset).collect()
    }

    async fn link_domains(&self, mappings: &[AssetDomainMapping]) -> ReconResult<()> {
        for mapping in mappings {
            sqlx::query(
                r#"
                INSERT INTO asset_domain_mappings (asset_id, domain_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(mapping.asset_id)
            .bind(mapping.domain_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_by_project(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Asset>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, project_id, ip, port, protocol, source, title, web_server,
                   technologies, last_seen_at
            FROM assets
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
            .map(Self::row_to_asset)
            .collect::<ReconResult<Vec<_>>>()?;

        Ok(Page {
            total,
            page,
            page_size,
            items,
        })
    }
}
