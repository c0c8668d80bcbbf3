//! Event repository implementation

use uuid::Uuid;

use super::{from_body, into_page, parse_cursor, to_body, Page};
use crate::database::engine::{QueryRequest, QueryTarget, SharedEngine, StoredItem, WriteOp};
use crate::database::keys;
use crate::models::Event;
use crate::utils::errors::StorageResult;

#[derive(Clone)]
pub struct EventRepository {
    engine: SharedEngine,
}

impl EventRepository {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    fn to_item(event: &Event) -> StorageResult<StoredItem> {
        Ok(StoredItem {
            key: keys::event_key(event.id),
            version: event.version,
            body: to_body(event)?,
            index: Some(keys::event_index(event.id, event.start_time)),
        })
    }

    fn from_item(item: StoredItem) -> StorageResult<Event> {
        let version = item.version;
        let mut event: Event = from_body(item)?;
        event.version = version;
        Ok(event)
    }

    /// Find event by ID
    pub async fn get(&self, event_id: Uuid) -> StorageResult<Event> {
        let item = self.engine.get(&keys::event_key(event_id)).await?;
        Self::from_item(item)
    }

    /// Store a new event, failing if the ID is taken
    pub async fn create(&self, event: &Event) -> StorageResult<()> {
        self.engine.put_if_absent(Self::to_item(event)?).await
    }

    /// Replace an event whose stored version is `expected_prior`
    pub async fn update(&self, event: &Event, expected_prior: i64) -> StorageResult<()> {
        self.engine.put_if_version(Self::to_item(event)?, expected_prior).await
    }

    /// List events ordered by start time
    pub async fn list(&self, limit: usize, cursor: Option<&str>) -> StorageResult<Page<Event>> {
        let request = QueryRequest::new(
            QueryTarget::Index { partition: keys::EVENTS_INDEX.to_string() },
            limit,
            parse_cursor(cursor)?,
        );
        let page = self.engine.query(request).await?;
        into_page(page, Self::from_item)
    }

    /// Transaction step writing `event` over the snapshot at `expected_prior`
    pub fn write_op(&self, event: &Event, expected_prior: i64) -> StorageResult<WriteOp> {
        Ok(WriteOp::replace(Self::to_item(event)?, expected_prior))
    }
}
