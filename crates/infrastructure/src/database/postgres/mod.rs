mod postgres_asset_repository;
mod postgres_domain_repository;
mod postgres_project_repository;
mod postgres_scan_profile_repository;
mod postgres_task_output_repository;
mod postgres_task_repository;

pub use postgres_asset_repository::PostgresAssetRepository;
pub use postgres_domain_repository::PostgresDomainRepository;
pub use postgres_project_repository::{PostgresProjectRepository, PostgresProjectTargetRepository};
pub use postgres_scan_profile_repository::PostgresScanProfileRepository;
pub use postgres_task_output_repository::PostgresTaskOutputRepository;
pub use postgres_task_repository::PostgresTaskRepository;
