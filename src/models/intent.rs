//! Payment intent model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker of a registration awaiting payment, bound to one checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationIntent {
    pub version: i64,
    pub event_id: Uuid,
    pub payment_session_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl RegistrationIntent {
    pub fn new(event_id: Uuid, payment_session_id: String, email: String, expires_at: DateTime<Utc>) -> Self {
        Self { version: 1, event_id, payment_session_id, email, expires_at }
    }
}
