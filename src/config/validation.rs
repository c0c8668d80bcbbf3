//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use super::settings::{PaymentProviderKind, StorageBackend};
use super::Settings;
use crate::utils::errors::{Result, RosterDeskError};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.storage.backend == StorageBackend::Postgres {
        validate_database_config(&settings.database)?;
    }
    validate_storage_config(&settings.storage)?;
    validate_payment_config(&settings.payment)?;
    validate_notification_config(&settings.notification)?;
    validate_sweeper_config(&settings.sweeper)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(RosterDeskError::Config("Database URL is required".to_string()));
    }

    if config.max_connections == 0 {
        return Err(RosterDeskError::Config("Max connections must be greater than 0".to_string()));
    }

    if config.min_connections > config.max_connections {
        return Err(RosterDeskError::Config(
            "Min connections cannot be greater than max connections".to_string(),
        ));
    }

    Ok(())
}

/// Validate storage configuration
fn validate_storage_config(config: &super::StorageConfig) -> Result<()> {
    if !(100..=10_000).contains(&config.operation_timeout_ms) {
        return Err(RosterDeskError::Config(format!(
            "Storage operation timeout must be between 100 and 10000 ms, got {}",
            config.operation_timeout_ms
        )));
    }

    Ok(())
}

/// Validate payment configuration
fn validate_payment_config(config: &super::PaymentConfig) -> Result<()> {
    if config.provider == PaymentProviderKind::Stripe {
        if config.secret_key.is_empty() {
            return Err(RosterDeskError::Config("Payment secret key is required".to_string()));
        }
        if config.webhook_secret.is_empty() {
            return Err(RosterDeskError::Config("Payment webhook secret is required".to_string()));
        }
        url::Url::parse(&config.api_base)?;
    }

    if config.currency.len() != 3 || !config.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(RosterDeskError::Config(format!(
            "Currency must be a three-letter ISO code, got {:?}",
            config.currency
        )));
    }

    if config.checkout_ttl_minutes < 30 || config.checkout_ttl_minutes > 24 * 60 {
        return Err(RosterDeskError::Config(
            "Checkout TTL must be between 30 minutes and 24 hours".to_string(),
        ));
    }

    url::Url::parse(&config.return_url.replace("{eventId}", "event"))?;

    Ok(())
}

/// Validate notification configuration
fn validate_notification_config(config: &super::NotificationConfig) -> Result<()> {
    if !config.from_address.contains('@') {
        return Err(RosterDeskError::Config(format!(
            "Invalid sender address: {}",
            config.from_address
        )));
    }

    Ok(())
}

/// Validate sweeper configuration
fn validate_sweeper_config(config: &super::SweeperConfig) -> Result<()> {
    if config.enabled && config.interval_seconds == 0 {
        return Err(RosterDeskError::Config("Sweeper interval must be greater than 0".to_string()));
    }

    if config.batch_size == 0 || config.batch_size > crate::database::engine::MAX_PAGE_SIZE {
        return Err(RosterDeskError::Config(format!(
            "Sweeper batch size must be between 1 and {}",
            crate::database::engine::MAX_PAGE_SIZE
        )));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(RosterDeskError::Config("Log level is required".to_string()));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(RosterDeskError::Config(format!(
            "Invalid log level: {}. Valid levels: {:?}",
            config.level, valid_levels
        )));
    }

    Ok(())
}
