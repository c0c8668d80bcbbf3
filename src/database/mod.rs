//! Database module
//!
//! Storage engine contract, its Postgres and in-memory implementations, the
//! key layout and the typed repositories built on top.

pub mod connection;
pub mod cursor;
pub mod engine;
pub mod keys;
pub mod memory;
pub mod postgres;
pub mod repositories;
pub mod service;

// Re-export commonly used database components
pub use connection::{create_pool, health_check, run_migrations, DatabasePool};
pub use engine::{SharedEngine, StorageEngine};
pub use memory::MemoryEngine;
pub use postgres::PostgresEngine;
pub use repositories::{EventRepository, IntentRepository, Page, RegistrationRepository};
pub use service::DatabaseService;
