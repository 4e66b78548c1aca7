//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes for users and their attachments
//! - A file route serving objects from the default disk
//! - Error responses derived from `AppError`

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use sea_orm::DatabaseConnection;
use stowage_core::Drive;
use stowage_db::UserRepository;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DatabaseConnection,
    /// User repository.
    pub users: UserRepository,
    /// Storage drive.
    pub drive: Arc<Drive>,
}

/// Creates the main application router.
pub fn create_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .merge(routes::uploads::routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
