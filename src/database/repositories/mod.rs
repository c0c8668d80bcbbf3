//! Database repositories module
//!
//! Typed access to the entity families stored in the shared item table.

pub mod event;
pub mod intent;
pub mod registration;

// Re-export repositories
pub use event::EventRepository;
pub use intent::IntentRepository;
pub use registration::RegistrationRepository;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::cursor::{self, ResumeKey};
use super::engine::{QueryPage, StoredItem};
use crate::utils::errors::StorageResult;

/// One page of typed results with an opaque continuation cursor
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self { items: Vec::new(), next_cursor: None, has_more: false }
    }
}

pub(crate) fn to_body<T: Serialize>(value: &T) -> StorageResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn from_body<T: DeserializeOwned>(item: StoredItem) -> StorageResult<T> {
    Ok(serde_json::from_value(item.body)?)
}

pub(crate) fn parse_cursor(cursor: Option<&str>) -> StorageResult<Option<ResumeKey>> {
    cursor.map(cursor::decode).transpose()
}

pub(crate) fn into_page<T>(
    page: QueryPage,
    convert: impl Fn(StoredItem) -> StorageResult<T>,
) -> StorageResult<Page<T>> {
    let items = page.items.into_iter().map(convert).collect::<StorageResult<Vec<_>>>()?;
    Ok(Page {
        items,
        next_cursor: page.next_cursor.as_ref().map(cursor::encode),
        has_more: page.has_more,
    })
}
