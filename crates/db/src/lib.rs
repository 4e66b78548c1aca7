//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Domain records with attachment columns
//! - Transactions that carry attachment hooks
//! - Repository abstractions for data access
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod records;
pub mod repositories;
pub mod transaction;

pub use records::User;
pub use repositories::{RepositoryError, UserRepository};
pub use transaction::AttachmentTransaction;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use stowage_shared::config::DatabaseConfig;

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    tracing::debug!(
        max_connections = config.max_connections,
        "Connecting to database"
    );
    Database::connect(options).await
}
