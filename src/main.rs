//! RosterDesk
//!
//! Main application entry point

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use RosterDesk::{
    config::{Settings, StorageBackend},
    database::{create_pool, run_migrations, DatabaseService, MemoryEngine, PostgresEngine},
    services::ServiceFactory,
    utils::{clock::SystemClock, logging},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", RosterDesk::info());

    let timeout = settings.storage.operation_timeout();
    let database = match settings.storage.backend {
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = create_pool(&settings.database).await?;
            run_migrations(&pool).await?;
            DatabaseService::from_engine(PostgresEngine::new(pool).with_deadline(timeout))
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory storage backend, data is lost on exit");
            DatabaseService::from_engine(MemoryEngine::new().with_deadline(timeout))
        }
    };

    // Initialize services
    info!("Initializing services...");
    let services = ServiceFactory::new(&settings, database, Arc::new(SystemClock))?;

    if !settings.sweeper.enabled {
        info!("Expiry sweeper disabled, waiting for shutdown");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let sweeper = services.expiry_sweeper(&settings);
    sweeper
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    info!("RosterDesk stopped");
    Ok(())
}
