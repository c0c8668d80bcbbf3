//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the RosterDesk application.

use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::LoggingConfig;
use crate::utils::errors::{Result, RosterDeskError};

/// Initialize logging based on configuration
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the life of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| RosterDeskError::Logging(e.to_string()))?;

    let stdout_layer = if config.json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed()
    };

    let (file_layer, guard) = match &config.file_path {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::daily(directory, "rosterdesk.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| RosterDeskError::Logging(e.to_string()))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log registration workflow steps with structured data
pub fn log_registration_action(event_id: Uuid, email: &str, action: &str, details: Option<&str>) {
    info!(
        event_id = %event_id,
        email = email,
        action = action,
        details = details,
        "Registration action performed"
    );
}

/// Log checkout provider traffic
pub fn log_payment_event(session_id: &str, event: &str, success: bool, details: Option<&str>) {
    if success {
        info!(session_id = session_id, event = event, details = details, "Payment event processed");
    } else {
        warn!(session_id = session_id, event = event, details = details, "Payment event failed");
    }
}

/// Log storage operations
pub fn log_storage_operation(operation: &str, duration_ms: u64, success: bool) {
    if success {
        debug!(operation = operation, duration_ms = duration_ms, "Storage operation completed");
    } else {
        warn!(operation = operation, duration_ms = duration_ms, "Storage operation failed");
    }
}
