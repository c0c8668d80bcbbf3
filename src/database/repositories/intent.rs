//! Payment intent repository implementation

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{from_body, to_body};
use crate::database::engine::{QueryRequest, QueryTarget, SharedEngine, StoredItem, WriteOp};
use crate::database::keys;
use crate::models::RegistrationIntent;
use crate::utils::errors::{StorageError, StorageResult};

#[derive(Clone)]
pub struct IntentRepository {
    engine: SharedEngine,
}

impl IntentRepository {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    fn to_item(intent: &RegistrationIntent) -> StorageResult<StoredItem> {
        Ok(StoredItem {
            key: keys::intent_key(intent.event_id, &intent.email),
            version: intent.version,
            body: to_body(intent)?,
            index: Some(keys::intent_index(intent.event_id, &intent.email, intent.expires_at)),
        })
    }

    fn from_item(item: StoredItem) -> StorageResult<RegistrationIntent> {
        let version = item.version;
        let mut intent: RegistrationIntent = from_body(item)?;
        intent.version = version;
        Ok(intent)
    }

    /// Pending intent of `email` at an event, if any
    pub async fn find(&self, event_id: Uuid, email: &str) -> StorageResult<Option<RegistrationIntent>> {
        match self.engine.get(&keys::intent_key(event_id, email)).await {
            Ok(item) => Self::from_item(item).map(Some),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn insert_op(&self, intent: &RegistrationIntent) -> StorageResult<WriteOp> {
        Ok(WriteOp::insert(Self::to_item(intent)?))
    }

    /// Transaction step deleting exactly this snapshot
    pub fn delete_op(&self, intent: &RegistrationIntent) -> WriteOp {
        WriteOp::delete_versioned(keys::intent_key(intent.event_id, &intent.email), intent.version)
    }

    /// Transaction step deleting the intent whether or not it still exists
    pub fn delete_any_op(&self, event_id: Uuid, email: &str) -> WriteOp {
        WriteOp::delete(keys::intent_key(event_id, email))
    }

    /// Up to `limit` intents that expired at or before `now`, oldest first
    pub async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> StorageResult<Vec<RegistrationIntent>> {
        let bound = keys::intent_expiry_bound(now);
        let request = QueryRequest::new(
            QueryTarget::Index { partition: keys::INTENTS_INDEX.to_string() },
            limit,
            None,
        );
        let page = self.engine.query(request).await?;

        page.items
            .into_iter()
            .take_while(|item| item.index.as_ref().is_some_and(|index| index.sort < bound))
            .map(Self::from_item)
            .collect()
    }
}
