use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{context::ActingUser, state::AppState};

pub mod documents;
pub mod health;
pub mod movements;
pub mod offices;

const ATTACHMENTS_PER_REQUEST: usize = 16;

fn cors_layer(allowed: Option<&String>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_ref());
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_mul(ATTACHMENTS_PER_REQUEST);

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::create_document),
        )
        .route("/:id", get(documents::get_document))
        .route("/:id/files", put(documents::reconcile_files))
        .route("/:id/files/:file_id", get(documents::download_file))
        .route("/:id/forward", post(documents::forward_document));

    let movements_routes = Router::new()
        .route("/", get(movements::list_inbox))
        .route("/:id/respond", post(movements::respond))
        .route("/:id/reject", post(movements::reject))
        .route("/:id/archive", post(movements::archive));

    let offices_routes = Router::new()
        .route("/", get(offices::list_offices))
        .route("/:id/users", get(offices::list_office_users));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/documents", documents_routes)
        .nest("/api/movements", movements_routes)
        .nest("/api/offices", offices_routes)
        .layer(middleware::from_extractor_with_state::<ActingUser, _>(
            protected_state,
        ));

    Router::new()
        .merge(protected_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}
