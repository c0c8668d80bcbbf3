//! Collaborator doubles
//!
//! A notifier that records (or refuses) confirmation emails and a storage
//! engine wrapper that can be told to fail the next transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use RosterDesk::database::engine::{ItemKey, QueryPage, QueryRequest, StorageEngine, StoredItem, WriteOp};
use RosterDesk::database::MemoryEngine;
use RosterDesk::models::{Event, Registration};
use RosterDesk::services::Notifier;
use RosterDesk::utils::errors::{NotificationError, StorageError, StorageResult};

/// One delivered confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct SentConfirmation {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub email: String,
    pub paid: bool,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentConfirmation>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier whose every delivery fails
    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    pub fn sent(&self) -> Vec<SentConfirmation> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_confirmation_email(
        &self,
        registration: &Registration,
        event: &Event,
    ) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Delivery("mail server unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(SentConfirmation {
            registration_id: registration.id(),
            event_id: event.id,
            email: registration.email().to_string(),
            paid: registration.is_paid(),
        });
        Ok(())
    }
}

/// Memory engine whose next transaction can be forced to fail
#[derive(Debug, Default)]
pub struct FlakyEngine {
    inner: MemoryEngine,
    fail_next_transaction: AtomicBool,
}

impl FlakyEngine {
    pub fn new(inner: MemoryEngine) -> Self {
        Self { inner, fail_next_transaction: AtomicBool::new(false) }
    }

    pub fn fail_next_transaction(&self) {
        self.fail_next_transaction.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageEngine for FlakyEngine {
    async fn get(&self, key: &ItemKey) -> StorageResult<StoredItem> {
        self.inner.get(key).await
    }

    async fn put_if_absent(&self, item: StoredItem) -> StorageResult<()> {
        self.inner.put_if_absent(item).await
    }

    async fn put_if_version(&self, item: StoredItem, expected_prior: i64) -> StorageResult<()> {
        self.inner.put_if_version(item, expected_prior).await
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        if self.fail_next_transaction.swap(false, Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("injected transaction failure".into()));
        }
        self.inner.transact_write(ops).await
    }

    async fn query(&self, request: QueryRequest) -> StorageResult<QueryPage> {
        self.inner.query(request).await
    }
}
