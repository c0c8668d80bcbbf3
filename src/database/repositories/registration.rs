//! Registration repository implementation

use uuid::Uuid;

use super::{from_body, into_page, parse_cursor, to_body, Page};
use crate::database::engine::{ItemKey, QueryRequest, QueryTarget, SharedEngine, StoredItem, WriteOp};
use crate::database::keys;
use crate::models::Registration;
use crate::utils::errors::{StorageError, StorageResult};

#[derive(Clone)]
pub struct RegistrationRepository {
    engine: SharedEngine,
}

impl RegistrationRepository {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    pub fn key_for(registration: &Registration) -> ItemKey {
        keys::registration_key(registration.event_id(), registration.email())
    }

    fn to_item(registration: &Registration) -> StorageResult<StoredItem> {
        Ok(StoredItem {
            key: Self::key_for(registration),
            version: registration.version(),
            body: to_body(registration)?,
            index: None,
        })
    }

    fn from_item(item: StoredItem) -> StorageResult<Registration> {
        from_body(item)
    }

    /// Fetch the registration of `email` at an event
    pub async fn get(&self, event_id: Uuid, email: &str) -> StorageResult<Registration> {
        let item = self.engine.get(&keys::registration_key(event_id, email)).await?;
        Self::from_item(item)
    }

    /// Like `get`, with absence as `None`
    pub async fn find(&self, event_id: Uuid, email: &str) -> StorageResult<Option<Registration>> {
        match self.get(event_id, email).await {
            Ok(registration) => Ok(Some(registration)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All registrations of an event, ordered by email
    pub async fn list_for_event(
        &self,
        event_id: Uuid,
        limit: usize,
        cursor: Option<&str>,
    ) -> StorageResult<Page<Registration>> {
        let request = QueryRequest::new(
            QueryTarget::Partition {
                pk: keys::event_partition(event_id),
                sk_prefix: keys::REGISTRATION_PREFIX.to_string(),
            },
            limit,
            parse_cursor(cursor)?,
        );
        let page = self.engine.query(request).await?;
        into_page(page, Self::from_item)
    }

    /// Transaction step creating `registration` if none exists for its key
    pub fn insert_op(&self, registration: &Registration) -> StorageResult<WriteOp> {
        Ok(WriteOp::insert(Self::to_item(registration)?))
    }

    /// Transaction step replacing the snapshot at `expected_prior`
    pub fn update_op(&self, registration: &Registration, expected_prior: i64) -> StorageResult<WriteOp> {
        Ok(WriteOp::replace(Self::to_item(registration)?, expected_prior))
    }

    /// Transaction step deleting exactly this snapshot
    pub fn delete_op(&self, registration: &Registration) -> WriteOp {
        WriteOp::delete_versioned(Self::key_for(registration), registration.version())
    }
}
