//! NoteTaker
//!
//! Users organize short text notes under topics. The crate has two halves:
//!
//! - a REST backend (SQLite persistence, session authority, topic and note endpoints);
//! - a client core ([`client`]) that renders from a key-addressed query cache and applies
//!   writes optimistically, reconciling with the backend once each call settles.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();
    let repo = Arc::clone(&state.repo);

    // Topic and note routes require a session
    let data_routes = Router::new()
        .route("/topics", get(api::list_topics).post(api::create_topic))
        .route("/notes", get(api::list_notes).post(api::create_note))
        .route("/notes/{id}", delete(api::delete_note))
        .route_layer(middleware::from_fn(move |req, next| {
            auth::session_auth_layer(repo.clone(), req, next)
        }));

    // Sign-in is gated by the PSK when one is configured
    let sign_in_routes = Router::new()
        .route("/auth/signin", post(api::sign_in))
        .route_layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    let session_routes = Router::new()
        .route("/auth/session", get(api::get_session))
        .route("/auth/signout", post(api::sign_out));

    let api_routes = data_routes.merge(sign_in_routes).merge(session_routes);

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
