use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod documents;
pub mod folders;
pub mod health;
pub mod notifications;
pub mod reports;
pub mod tasks;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route("/all", get(documents::all_documents))
        .route(
            "/:id",
            get(documents::get_document)
                .patch(documents::update_document)
                .delete(documents::delete_document),
        )
        .route("/:id/status", patch(documents::update_document_status))
        .route("/:id/submit", post(documents::submit_document))
        .route("/:id/download", get(documents::download_document))
        .route("/:id/versions", get(documents::list_document_versions))
        .route("/:id/tasks", post(tasks::assign_reviewer));

    let tasks_routes = Router::new()
        .route("/", get(tasks::list_my_tasks))
        .route("/:id/approve", post(tasks::approve_task))
        .route("/:id/reject", post(tasks::reject_task));

    let reviews_routes = Router::new().route("/pending", get(tasks::pending_reviews));

    let workflows_routes = Router::new().route("/", get(tasks::list_workflows));

    let notifications_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/read-all", post(notifications::mark_all_read));

    let folders_routes = Router::new().route(
        "/",
        get(folders::list_folders).post(folders::create_folder),
    );

    let categories_routes = Router::new().route(
        "/",
        get(folders::list_categories).post(folders::create_category),
    );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/documents", documents_routes)
        .nest("/api/tasks", tasks_routes)
        .nest("/api/reviews", reviews_routes)
        .nest("/api/workflows", workflows_routes)
        .nest("/api/notifications", notifications_routes)
        .nest("/api/folders", folders_routes)
        .nest("/api/categories", categories_routes)
        .route("/api/audit", get(reports::list_audit))
        .route("/api/dashboard", get(reports::dashboard))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 512))
}
