use axum::{http::Method, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod dashboard;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod stream;
pub mod webhooks;

pub use error::AppError;
pub use state::{AppState, Backends};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(bookings::routes())
        .merge(webhooks::routes())
        .merge(dashboard::routes())
        .merge(stream::routes())
        .merge(inventory::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::principal_middleware,
        ))
        // Scrapes bypass principal resolution
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .with_state(state)
}
