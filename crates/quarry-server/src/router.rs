//! Quarry Router
//!
//! HTTP router configuration with middleware stack. Defines all API routes
//! and applies cross-cutting concerns like logging, CORS, login rate
//! limiting and session authentication.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::handlers;
use crate::middleware;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Router
// =============================================================================

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let require_auth = axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth);

    let auth_routes = Router::new()
        .route(
            "/login",
            post(handlers::login).route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::login_rate_limit,
            )),
        )
        .merge(
            Router::new()
                .route("/logout", post(handlers::logout))
                .route("/session", get(handlers::session_info))
                .route_layer(require_auth.clone()),
        );

    let overview_routes = Router::new()
        .route("/", get(handlers::overview))
        .route("/:detail", get(handlers::overview_detail));

    let table_routes = Router::new()
        .route("/", get(handlers::list_tables))
        .route("/:name", get(handlers::get_table))
        .route("/:name/export", get(handlers::export_table));

    let query_routes = Router::new()
        .route("/", post(handlers::execute_query))
        .route("/format", post(handlers::format_query))
        .route("/templates", get(handlers::query_templates_page))
        .route("/export", get(handlers::export_query_result))
        .route(
            "/history",
            get(handlers::query_history)
                .post(handlers::save_query)
                .delete(handlers::clear_history),
        )
        .route("/history/export", get(handlers::export_history))
        .route("/history/:index", delete(handlers::delete_history_entry));

    let analytics_routes = Router::new()
        .route("/", get(handlers::analytics))
        .route("/load", post(handlers::load_dataset))
        .route(
            "/filters",
            post(handlers::apply_filters).delete(handlers::reset_filters),
        )
        .route("/chart", post(handlers::analytics_chart))
        .route("/correlations", get(handlers::analytics_correlations))
        .route("/outliers", get(handlers::analytics_outliers))
        .route("/trend", get(handlers::analytics_trend))
        .route("/export", get(handlers::export_analytics));

    let protected = Router::new()
        .nest("/overview", overview_routes)
        .nest("/tables", table_routes)
        .nest("/query", query_routes)
        .nest("/analytics", analytics_routes)
        .route("/cache/refresh", post(handlers::refresh_cache))
        .route_layer(require_auth);

    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1", protected)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http());

    if state.config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================
