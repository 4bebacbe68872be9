//! Route configuration.

use crate::auth::{require_issuer, trace_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Issuer-only: resource management and link issuance.
    let issuer_routes = Router::new()
        .route(
            "/v1/resources/{resource_id}",
            put(handlers::put_resource)
                .get(handlers::get_resource)
                .delete(handlers::delete_resource),
        )
        .route("/v1/downloads", post(handlers::create_download))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_issuer,
        ));

    let public_routes = Router::new()
        // Unauthenticated for load balancers and probes
        .route("/v1/health", get(handlers::health_check))
        // The token in the query string is the credential
        .route("/v1/downloads/stream", get(handlers::stream_download));

    let mut router = Router::new().merge(issuer_routes).merge(public_routes);

    // SECURITY: restrict /metrics to the Prometheus scrapers at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
