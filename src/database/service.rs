//! Database service layer
//!
//! Bundles the repositories over one storage engine and commits the
//! multi-item transactions the workflow assembles from their write steps.

use std::sync::Arc;
use std::time::Instant;

use crate::database::engine::{SharedEngine, StorageEngine, WriteOp};
use crate::database::{EventRepository, IntentRepository, RegistrationRepository};
use crate::utils::errors::StorageResult;
use crate::utils::logging::log_storage_operation;

#[derive(Clone)]
pub struct DatabaseService {
    engine: SharedEngine,
    pub events: EventRepository,
    pub registrations: RegistrationRepository,
    pub intents: IntentRepository,
}

impl DatabaseService {
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            events: EventRepository::new(engine.clone()),
            registrations: RegistrationRepository::new(engine.clone()),
            intents: IntentRepository::new(engine.clone()),
            engine,
        }
    }

    /// Build the service over a concrete engine
    pub fn from_engine<E: StorageEngine + 'static>(engine: E) -> Self {
        Self::new(Arc::new(engine))
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Apply write steps atomically
    pub async fn commit(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        let started = Instant::now();
        let count = ops.len();
        let result = self.engine.transact_write(ops).await;

        tracing::debug!(ops = count, committed = result.is_ok(), "Transaction finished");
        log_storage_operation("commit", started.elapsed().as_millis() as u64, result.is_ok());
        result
    }
}
