//! Event administration service

use tracing::info;
use uuid::Uuid;

use crate::database::{DatabaseService, Page};
use crate::models::{Event, EventUpdate, NewEvent};
use crate::utils::errors::{EventError, StorageError};

type Result<T> = std::result::Result<T, EventError>;

/// Publishes and edits events; counters are only ever changed by the
/// registration workflow
#[derive(Clone)]
pub struct EventService {
    db: DatabaseService,
}

impl EventService {
    pub fn new(db: DatabaseService) -> Self {
        Self { db }
    }

    /// Publish a new event
    pub async fn create_event(&self, new_event: NewEvent) -> Result<Event> {
        let event = new_event.into_event(Uuid::new_v4());
        event.validate()?;

        self.db.events.create(&event).await?;
        info!(event_id = %event.id, name = %event.name, "Event created");
        Ok(event)
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Event> {
        self.db.events.get(event_id).await.map_err(|e| match e {
            StorageError::NotFound { .. } => EventError::EventNotFound { event_id },
            other => EventError::Storage(other),
        })
    }

    /// Events ordered by start time
    pub async fn list_events(&self, limit: usize, cursor: Option<&str>) -> Result<Page<Event>> {
        Ok(self.db.events.list(limit, cursor).await?)
    }

    /// Apply an explicit edit to the event at `expected_version`
    pub async fn update_event(&self, event_id: Uuid, update: EventUpdate, expected_version: i64) -> Result<Event> {
        let current = self.get_event(event_id).await?;
        if current.version != expected_version {
            return Err(EventError::StaleEvent { event_id, expected: expected_version, actual: current.version });
        }

        let updated = update.apply(&current);
        updated.validate()?;

        self.db.events.update(&updated, expected_version).await.map_err(|e| match e {
            StorageError::VersionMismatch { expected, actual, .. } => {
                EventError::StaleEvent { event_id, expected, actual }
            }
            StorageError::DoesNotExist { .. } => EventError::EventNotFound { event_id },
            other => EventError::Storage(other),
        })?;

        info!(event_id = %event_id, version = updated.version, "Event updated");
        Ok(updated)
    }
}
