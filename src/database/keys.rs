//! Logical key layout
//!
//! Events, registrations and payment intents share one table. Everything that
//! belongs to an event lives in the event's partition so a single transaction
//! can touch the event, one registration and its intent.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::engine::{IndexEntry, ItemKey};

pub const EVENT_PREFIX: &str = "EVENT#";
pub const EVENT_METADATA: &str = "METADATA";
pub const REGISTRATION_PREFIX: &str = "REGISTRATION#";
pub const INTENT_PREFIX: &str = "INTENT#";

/// Index partition listing every event by start time
pub const EVENTS_INDEX: &str = "EVENTS";
/// Index partition listing payment intents by expiry
pub const INTENTS_INDEX: &str = "INTENTS";

/// Canonical form of an email used inside keys
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Timestamp rendering whose lexical order matches chronological order
pub fn sortable_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn event_partition(event_id: Uuid) -> String {
    format!("{EVENT_PREFIX}{event_id}")
}

pub fn event_key(event_id: Uuid) -> ItemKey {
    ItemKey::new(event_partition(event_id), EVENT_METADATA)
}

pub fn event_index(event_id: Uuid, start_time: DateTime<Utc>) -> IndexEntry {
    IndexEntry::new(EVENTS_INDEX, format!("{}#{event_id}", sortable_timestamp(start_time)))
}

pub fn registration_key(event_id: Uuid, email: &str) -> ItemKey {
    ItemKey::new(
        event_partition(event_id),
        format!("{REGISTRATION_PREFIX}{}", normalize_email(email)),
    )
}

pub fn intent_key(event_id: Uuid, email: &str) -> ItemKey {
    ItemKey::new(event_partition(event_id), format!("{INTENT_PREFIX}{}", normalize_email(email)))
}

pub fn intent_index(event_id: Uuid, email: &str, expires_at: DateTime<Utc>) -> IndexEntry {
    IndexEntry::new(
        INTENTS_INDEX,
        format!("{}#{event_id}#{}", sortable_timestamp(expires_at), normalize_email(email)),
    )
}

/// Upper bound, in index sort order, of intents expiring at or before `at`
pub fn intent_expiry_bound(at: DateTime<Utc>) -> String {
    // '$' sorts after '#', so every entry with this timestamp is included
    format!("{}$", sortable_timestamp(at))
}
