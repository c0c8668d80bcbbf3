//! RosterDesk
//!
//! Event registration backend: individual and team sign-ups, paid checkout
//! with confirmation and expiry rollback, all kept consistent by a storage
//! layer with conditional writes and multi-item transactions.

#![allow(non_snake_case)]

pub mod config;
pub mod database;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{RegistrationError, Result, RosterDeskError};

// Re-export main components for easy access
pub use database::DatabaseService;
pub use services::{RegistrationService, ServiceFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
