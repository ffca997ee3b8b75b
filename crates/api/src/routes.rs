use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use reconflow_dispatcher::{ProgressReader, ScanLauncher};
use reconflow_domain::repositories::{
    ProjectRepository, ProjectTargetRepository, ScanProfileRepository,
};

use crate::handlers::{
    assets::list_project_assets,
    domains::list_project_domains,
    health::health_check,
    projects::{create_project, delete_project, get_project, list_projects, update_project},
    scan_profiles::{
        create_scan_profile, delete_scan_profile, get_scan_profile, list_scan_profiles,
        update_scan_profile,
    },
    scans::create_scan,
    targets::{create_target, delete_target, list_targets},
    tasks::{get_task, list_project_tasks},
};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub project_repo: Arc<dyn ProjectRepository>,
    pub target_repo: Arc<dyn ProjectTargetRepository>,
    pub profile_repo: Arc<dyn ScanProfileRepository>,
    pub launcher: Arc<ScanLauncher>,
    pub progress: Arc<ProgressReader>,
}

/// 构建完整路由
pub fn create_routes(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/api/projects/{id}/targets",
            get(list_targets).post(create_target),
        )
        .route("/api/targets/{id}", axum::routing::delete(delete_target))
        .route(
            "/api/scan-profiles",
            get(list_scan_profiles).post(create_scan_profile),
        )
        .route(
            "/api/scan-profiles/{id}",
            get(get_scan_profile)
                .put(update_scan_profile)
                .delete(delete_scan_profile),
        )
        .route("/api/scans", post(create_scan))
        .route("/api/projects/{id}/tasks", get(list_project_tasks))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/projects/{id}/domains", get(list_project_domains))
        .route("/api/projects/{id}/assets", get(list_project_assets))
        .layer(middleware::from_fn(crate::middleware::request_logger))
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
