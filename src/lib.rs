pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;

use crate::api::handlers;
use crate::config::LifecycleConfig;
use crate::services::lifecycle::LifecycleService;
use crate::services::storage::StorageService;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::assets::get_statistics,
        handlers::assets::get_asset_by_public_id,
        handlers::assets::get_asset,
        handlers::assets::delete_asset,
        handlers::assets::batch_delete,
        handlers::audit::get_audit_logs,
        handlers::references::add_reference,
        handlers::references::remove_reference,
        handlers::references::list_references,
        handlers::references::release_entity,
        handlers::cleanup::cleanup_temporary,
        handlers::cleanup::cleanup_orphaned,
        handlers::cleanup::mark_orphaned,
        handlers::jobs::schedule_job,
        handlers::jobs::list_jobs,
        handlers::jobs::get_job,
        handlers::webhooks::upload_webhook,
        handlers::webhooks::delete_webhook,
    ),
    components(
        schemas(
            handlers::health::HealthResponse,
            handlers::types::AssetResponse,
            handlers::types::ReferenceResponse,
            handlers::types::JobResponse,
            handlers::types::BatchDeleteRequest,
            handlers::types::DeleteResponse,
            handlers::types::AddReferenceRequest,
            handlers::types::RemoveReferenceRequest,
            handlers::types::RemoveReferenceResponse,
            handlers::types::ReleaseEntityRequest,
            handlers::types::ReleaseEntityResponse,
            handlers::types::CleanupResponse,
            handlers::types::MarkOrphanedResponse,
            handlers::types::ScheduleJobRequest,
            handlers::types::UploadWebhookRequest,
            handlers::types::DeleteWebhookRequest,
            services::lifecycle::AssetStatistics,
            services::lifecycle::AuditLogPage,
            services::lifecycle::CleanupResult,
            services::lifecycle::CleanupJobKind,
            services::lifecycle::JobStatus,
        )
    ),
    tags(
        (name = "admin", description = "Asset inspection and manual deletion"),
        (name = "references", description = "Entity reference tracking"),
        (name = "cleanup", description = "Reclamation runs and jobs"),
        (name = "webhooks", description = "Storage provider notifications"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LifecycleService>,
    pub storage: Arc<dyn StorageService>,
    pub config: LifecycleConfig,
}

impl AppState {
    pub fn new(service: Arc<LifecycleService>) -> Self {
        Self {
            storage: Arc::clone(service.storage()),
            config: service.config().clone(),
            service,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route("/statistics", get(handlers::assets::get_statistics))
        .route("/assets", get(handlers::assets::get_asset_by_public_id))
        .route(
            "/assets/:id",
            get(handlers::assets::get_asset).delete(handlers::assets::delete_asset),
        )
        .route("/batch-delete", post(handlers::assets::batch_delete))
        .route("/audit-logs", get(handlers::audit::get_audit_logs))
        .route(
            "/references",
            get(handlers::references::list_references)
                .post(handlers::references::add_reference)
                .delete(handlers::references::remove_reference),
        )
        .route("/entities/release", post(handlers::references::release_entity))
        .route("/cleanup/temporary", post(handlers::cleanup::cleanup_temporary))
        .route("/cleanup/orphaned", post(handlers::cleanup::cleanup_orphaned))
        .route("/mark-orphaned", post(handlers::cleanup::mark_orphaned))
        .route(
            "/jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::schedule_job),
        )
        .route("/jobs/:id", get(handlers::jobs::get_job))
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::admin_auth::admin_auth_middleware,
        ));

    let webhooks = Router::new()
        .route("/upload", post(handlers::webhooks::upload_webhook))
        .route("/delete", post(handlers::webhooks::delete_webhook))
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::admin_auth::admin_auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health_check))
        .nest("/admin", admin)
        .nest("/webhooks", webhooks)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
