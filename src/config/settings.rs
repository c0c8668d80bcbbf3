//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from configuration files and environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub payment: PaymentConfig,
    pub notification: NotificationConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Storage engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub operation_timeout_ms: u64,
}

impl StorageConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Stripe,
    Mock,
}

/// Checkout provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
    pub provider: PaymentProviderKind,
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub checkout_ttl_minutes: u64,
    /// Where the embedded checkout returns to; `{eventId}` is substituted
    pub return_url: String,
    pub signature_tolerance_seconds: u64,
}

impl PaymentConfig {
    pub fn checkout_ttl(&self) -> Duration {
        Duration::from_secs(self.checkout_ttl_minutes * 60)
    }
}

/// Confirmation email configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub from_address: String,
    pub organizer_name: String,
}

/// Expired checkout sweeper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub batch_size: usize,
    pub grace_period_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory of the daily rolling log file; stdout only when unset
    pub file_path: Option<String>,
    pub json: bool,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::build(config::File::with_name("config").required(false))
    }

    /// Load settings from a specific file, still honoring environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        Self::build(config::File::from(path.as_ref()))
    }

    fn build(file: config::File<config::FileSourceFile, config::FileFormat>) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("ROSTERDESK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::RosterDeskError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/rosterdesk".to_string(),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: 2,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                operation_timeout_ms: 1500,
            },
            payment: PaymentConfig {
                provider: PaymentProviderKind::Mock,
                api_base: "https://api.stripe.com".to_string(),
                secret_key: String::new(),
                webhook_secret: String::new(),
                currency: "usd".to_string(),
                checkout_ttl_minutes: 30,
                return_url: "http://localhost:3000/events/{eventId}/registered".to_string(),
                signature_tolerance_seconds: 300,
            },
            notification: NotificationConfig {
                from_address: "registration@localhost".to_string(),
                organizer_name: "RosterDesk".to_string(),
            },
            sweeper: SweeperConfig {
                enabled: true,
                interval_seconds: 60,
                batch_size: 25,
                grace_period_seconds: 120,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                json: false,
            },
        }
    }
}
