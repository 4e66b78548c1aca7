//! Stowage API Server
//!
//! Serves users with avatar and cover image attachments.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stowage_api::{AppState, create_router};
use stowage_core::storage::{Drive, DriveConfig};
use stowage_core::{AttachmentRegistry, LifecycleCoordinator};
use stowage_db::records::register_records;
use stowage_db::{UserRepository, connect};
use stowage_shared::AppConfig;
use stowage_shared::config::load_section;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stowage=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let drive_config: DriveConfig =
        load_section("drive").context("Failed to load drive configuration")?;

    let db = connect(&config.database).await?;
    info!("Connected to database");

    let drive = Arc::new(Drive::from_config(&drive_config)?);
    info!(
        default_disk = drive.default_disk_name(),
        disks = drive_config.disks.len(),
        "Storage drive configured"
    );

    let mut registry = AttachmentRegistry::new();
    register_records(&mut registry);
    let coordinator = LifecycleCoordinator::new(Arc::clone(&drive), registry);

    let state = AppState {
        users: UserRepository::new(db.clone(), coordinator),
        db,
        drive,
    };

    let app = create_router(state, config.server.body_limit_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
