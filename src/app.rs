//! 应用装配
//!
//! 按运行模式装配数据库、消息队列、工作流处理器、Worker 服务
//! 与 API 服务，并负责优雅停机。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use reconflow_api::{create_routes, AppState};
use reconflow_config::AppConfig;
use reconflow_dispatcher::{ProgressReader, ScanLauncher};
use reconflow_infrastructure::{
    create_pool, run_migrations, MessageQueueFactory, PostgresAssetRepository,
    PostgresDomainRepository, PostgresProjectRepository, PostgresProjectTargetRepository,
    PostgresScanProfileRepository, PostgresTaskOutputRepository, PostgresTaskRepository,
};
use reconflow_worker::{
    LocalCommandExecutor, ParserRegistry, WorkerService, WorkflowProcessor,
};

use crate::shutdown::wait_for_shutdown_signal;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Api,
    Worker,
    All,
}

pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        Self { config, mode }
    }

    pub async fn run(self) -> Result<()> {
        let pool = create_pool(&self.config.database)
            .await
            .context("数据库初始化失败")?;
        run_migrations(&pool).await.context("数据库迁移失败")?;

        let queue = MessageQueueFactory::create(&self.config.message_queue)
            .await
            .context("消息队列初始化失败")?;

        let project_repo = Arc::new(PostgresProjectRepository::new(pool.clone()));
        let target_repo = Arc::new(PostgresProjectTargetRepository::new(pool.clone()));
        let profile_repo = Arc::new(PostgresScanProfileRepository::new(pool.clone()));
        let task_repo = Arc::new(PostgresTaskRepository::new(pool.clone()));
        let output_repo = Arc::new(PostgresTaskOutputRepository::new(pool.clone()));
        let domain_repo = Arc::new(PostgresDomainRepository::new(pool.clone()));
        let asset_repo = Arc::new(PostgresAssetRepository::new(pool.clone()));

        let mut worker_handle = None;
        let mut worker_service_for_stop = None;
        if matches!(self.mode, AppMode::Worker | AppMode::All) {
            let parsers = Arc::new(ParserRegistry::with_builtins());
            let processor = Arc::new(
                WorkflowProcessor::new(
                    profile_repo.clone(),
                    task_repo.clone(),
                    output_repo.clone(),
                    domain_repo.clone(),
                    asset_repo.clone(),
                    queue.clone(),
                    Arc::new(LocalCommandExecutor::new()),
                    parsers,
                )
                .with_default_queue(self.config.message_queue.default_queue.clone())
                .with_command_timeout(Duration::from_secs(
                    self.config.executor.default_timeout_seconds,
                )),
            );

            let worker = Arc::new(
                WorkerService::builder(self.config.worker.worker_id.clone(), queue.clone())
                    .register_default_handler(processor)
                    .queues(
                        self.config
                            .worker
                            .queues
                            .iter()
                            .map(|q| (q.name.clone(), q.weight))
                            .collect(),
                    )
                    .max_concurrent_tasks(self.config.worker.max_concurrent_tasks)
                    .poll_interval_ms(self.config.worker.poll_interval_ms)
                    .build(),
            );

            let worker_clone = worker.clone();
            worker_handle = Some(tokio::spawn(async move { worker_clone.run().await }));
            worker_service_for_stop = Some(worker);
        }

        let mut api_handle = None;
        if matches!(self.mode, AppMode::Api | AppMode::All) && self.config.api.enabled {
            let launcher = Arc::new(
                ScanLauncher::new(pool.clone(), profile_repo.clone(), queue.clone())
                    .with_default_queue(self.config.message_queue.default_queue.clone()),
            );
            let progress = Arc::new(ProgressReader::new(
                task_repo.clone(),
                domain_repo.clone(),
                asset_repo.clone(),
            ));

            let state = AppState {
                project_repo: project_repo.clone(),
                target_repo: target_repo.clone(),
                profile_repo: profile_repo.clone(),
                launcher,
                progress,
            };
            let router = create_routes(state, self.config.api.cors_enabled);

            let bind_address = self.config.api.bind_address.clone();
            let listener = tokio::net::TcpListener::bind(&bind_address)
                .await
                .with_context(|| format!("监听地址 {bind_address} 失败"))?;
            info!(%bind_address, "API服务已启动");

            api_handle = Some(tokio::spawn(async move {
                axum::serve(listener, router).await
            }));
        }

        wait_for_shutdown_signal().await;
        info!("收到退出信号，开始优雅停机");

        if let Some(worker) = worker_service_for_stop {
            worker.stop().await;
        }
        if let Some(handle) = worker_handle {
            let _ = handle.await;
        }
        if let Some(handle) = api_handle {
            handle.abort();
        }
        pool.close().await;

        info!("reconflow 已退出");
        Ok(())
    }
}
