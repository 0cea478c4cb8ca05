pub mod middleware;
pub mod pages;
pub mod rest;
pub mod state;
pub mod view;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::{require_login, with_session};
pub use state::{AppState, SessionRegistry};

/// Builds the full application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    // Pages (any session, anonymous or not)
    let pages = Router::new()
        .route("/", get(pages::index_handler))
        .route("/login", post(pages::login_handler))
        .route("/signup", post(pages::signup_handler))
        .route("/chat", post(pages::chat_handler))
        .route("/logout", post(pages::logout_handler));

    // JSON routes (login required)
    let api = Router::new()
        .route("/api/transcript", get(rest::transcript_handler))
        .layer(axum_middleware::from_fn(require_login));

    Router::new()
        .merge(pages)
        .merge(api)
        .layer(axum_middleware::from_fn_with_state(state.clone(), with_session))
        .route("/health", get(rest::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
