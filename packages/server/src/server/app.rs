//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::get,
    Router,
};
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::RateLimitConfig;
use crate::kernel::ServerDeps;
use crate::server::routes::{
    create_submission_handler, dispatch_handler, health_handler, query_status_handler,
    root_handler, update_status_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    /// Present when the store is Postgres; used by the health check only
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(deps: Arc<ServerDeps>, db_pool: Option<PgPool>) -> Self {
        Self { deps, db_pool }
    }
}

/// CORS layer for the configured origins; an empty list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([CONTENT_TYPE])
}

/// Per-IP rate limit. Keyed on the peer address unless forwarded headers
/// are trusted, since any client can set `X-Forwarded-For` itself.
fn rate_limited(router: Router, limit: RateLimitConfig) -> Router {
    let layered = if limit.trust_forwarded_headers {
        GovernorConfigBuilder::default()
            .per_second(limit.per_second)
            .burst_size(limit.burst_size)
            .use_headers()
            .finish()
            .map(|config| {
                router.clone().layer(GovernorLayer {
                    config: Arc::new(config),
                })
            })
    } else {
        GovernorConfigBuilder::default()
            .per_second(limit.per_second)
            .burst_size(limit.burst_size)
            .finish()
            .map(|config| {
                router.clone().layer(GovernorLayer {
                    config: Arc::new(config),
                })
            })
    };

    match layered {
        Some(router) => router,
        None => {
            tracing::warn!(?limit, "Invalid rate limit configuration, rate limiting disabled");
            router
        }
    }
}

/// Build the Axum application router
pub fn build_app(
    state: AppState,
    allowed_origins: &[String],
    rate_limit: Option<RateLimitConfig>,
) -> Router {
    let mut router = Router::new()
        .route("/", get(root_handler))
        .route(
            "/submission",
            get(query_status_handler)
                .post(create_submission_handler)
                .patch(update_status_handler),
        )
        .route("/new", get(dispatch_handler));

    if let Some(limit) = rate_limit {
        router = rate_limited(router, limit);
    }

    router
        // Health check (no rate limit)
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(state))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
