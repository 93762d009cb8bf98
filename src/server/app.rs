use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use super::access_control::{access_control_middleware, admin_auth_middleware};
use super::AppState;

/// Maximum request body size for message/queue endpoints (64 KB)
const MAX_BODY_SIZE: usize = 64 * 1024;

pub fn create_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.server.cors_origins);

    // Sub-queue-scoped routes: gated by the access-control filter.
    let queue_routes = Router::new()
        .route("/message", post(crate::api::create_message))
        .route(
            "/message/{uuid}",
            get(crate::api::get_message)
                .delete(crate::api::delete_message)
                .put(crate::api::update_message),
        )
        .route(
            "/queue/{sub_queue}",
            get(crate::api::list_queue).delete(crate::api::clear_queue),
        )
        .route("/queue/{sub_queue}/next", get(crate::api::poll_queue))
        .route("/queue/{sub_queue}/peek", get(crate::api::peek_queue))
        .route("/queue/{sub_queue}/assign", post(crate::api::assign_queue))
        .route("/queue/{sub_queue}/release", post(crate::api::release_queue))
        .route("/keys", get(crate::api::keys))
        .route("/owners", get(crate::api::owners))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            access_control_middleware,
        ));

    // Administrative routes: gated by the separate static administrator
    // bearer instead of the per-sub-queue token flow.
    let admin_routes = Router::new()
        .route("/auth/{sub_queue}", post(crate::api::issue_token))
        .route(
            "/restriction/{sub_queue}",
            put(crate::api::add_restriction).delete(crate::api::remove_restriction),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    // Unauthenticated introspection and read-only endpoints.
    let open_routes = Router::new()
        .route("/health", get(crate::api::health))
        .route("/settings", get(crate::api::settings))
        .route("/metrics", get(crate::api::metrics))
        .route("/restriction", get(crate::api::list_restrictions));

    Router::new()
        .merge(queue_routes)
        .merge(admin_routes)
        .merge(open_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build CORS layer from configured origins: a wildcard when none are
/// configured, otherwise a restricted allow-list.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    if origins.is_empty() {
        tracing::warn!(
            "CORS: no origins configured, allowing any origin. Configure server.cors_origins for production."
        );
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        tracing::info!("CORS: restricting to {} configured origins", parsed.len());
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    }
}
