//! Checkout provider collaborator
//!
//! The workflow opens a hosted checkout for paid registrations and later
//! receives the provider's signed webhook telling it whether the session was
//! completed or expired.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::utils::clock::{Clock, SystemClock};
use crate::utils::errors::{PaymentError, PaymentResult};

/// Metadata key carrying the registrant's email
pub const METADATA_EMAIL: &str = "email";
/// Metadata key carrying the event ID
pub const METADATA_EVENT_ID: &str = "eventId";

pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_CHECKOUT_EXPIRED: &str = "checkout.session.expired";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    /// Unit price in minor currency units
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub line_items: Vec<LineItem>,
    pub metadata: BTreeMap<String, String>,
    pub return_url: String,
    pub ttl: Duration,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub client_secret: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStatus {
    Completed,
    Expired,
}

/// Whether a checkout session can still be paid, as the provider sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Complete,
    Expired,
}

/// A verified confirmation or expiry notice from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutEvent {
    pub status: CheckoutStatus,
    pub session_id: String,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutStatus {
    /// Map a provider event type, `None` for events the workflow ignores
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            EVENT_CHECKOUT_COMPLETED => Some(CheckoutStatus::Completed),
            EVENT_CHECKOUT_EXPIRED => Some(CheckoutStatus::Expired),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a checkout session
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession>;

    /// Verify a webhook and extract the checkout outcome
    async fn confirm_checkout(&self, payload: &str, signature: &str) -> PaymentResult<CheckoutEvent>;

    /// Make an open session unpayable
    async fn expire_checkout(&self, session_id: &str) -> PaymentResult<()>;

    /// Look up the current state of a session
    async fn session_state(&self, session_id: &str) -> PaymentResult<SessionState>;
}

/// Webhook body shared by the provider implementations
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct WebhookData {
    pub object: WebhookSession,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct WebhookSession {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Parse a webhook body whose authenticity is already established
pub(crate) fn parse_webhook(payload: &str) -> PaymentResult<CheckoutEvent> {
    let envelope: WebhookEnvelope =
        serde_json::from_str(payload).map_err(|e| PaymentError::MalformedPayload(e.to_string()))?;

    let status = CheckoutStatus::from_event_type(&envelope.event_type)
        .ok_or_else(|| PaymentError::NotConfirmationEvent(envelope.event_type.clone()))?;

    Ok(CheckoutEvent {
        status,
        session_id: envelope.data.object.id,
        metadata: envelope.data.object.metadata,
    })
}

#[derive(Debug, Default)]
struct MockState {
    fail_next_checkout: bool,
    created: Vec<(CheckoutSession, CheckoutRequest)>,
    expired: HashSet<String>,
    completed: HashSet<String>,
}

/// In-process provider for development and tests
///
/// Webhooks are accepted when signed with [`MockPaymentProvider::SIGNATURE`].
/// Sessions lapse at their `expires_at` on the provider's clock.
pub struct MockPaymentProvider {
    state: Mutex<MockState>,
    clock: Arc<dyn Clock>,
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl fmt::Debug for MockPaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPaymentProvider").finish_non_exhaustive()
    }
}

impl MockPaymentProvider {
    pub const SIGNATURE: &'static str = "mock-signature";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { state: Mutex::new(MockState::default()), clock }
    }

    /// Pay for a session as a customer would, `false` once it can no longer be paid
    pub async fn complete_checkout(&self, session_id: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if Self::state_of(&state, session_id, now) != Some(SessionState::Open) {
            return false;
        }
        state.completed.insert(session_id.to_string());
        true
    }

    fn state_of(state: &MockState, session_id: &str, now: DateTime<Utc>) -> Option<SessionState> {
        let (session, _) = state.created.iter().find(|(session, _)| session.session_id == session_id)?;
        Some(if state.completed.contains(session_id) {
            SessionState::Complete
        } else if state.expired.contains(session_id) || now >= session.expires_at {
            SessionState::Expired
        } else {
            SessionState::Open
        })
    }

    /// Make the next `create_checkout` fail
    pub async fn fail_next_checkout(&self) {
        self.state.lock().await.fail_next_checkout = true;
    }

    /// Sessions opened so far, with the request that opened them
    pub async fn sessions(&self) -> Vec<(CheckoutSession, CheckoutRequest)> {
        self.state.lock().await.created.clone()
    }

    /// IDs of sessions expired through `expire_checkout`
    pub async fn expired_sessions(&self) -> HashSet<String> {
        self.state.lock().await.expired.clone()
    }

    /// Webhook body the provider would deliver for a session
    pub fn webhook_payload(event_type: &str, session_id: &str, metadata: &BTreeMap<String, String>) -> String {
        serde_json::json!({
            "type": event_type,
            "data": { "object": { "id": session_id, "metadata": metadata } }
        })
        .to_string()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        let mut state = self.state.lock().await;
        if state.fail_next_checkout {
            state.fail_next_checkout = false;
            return Err(PaymentError::Provider("checkout creation failed".to_string()));
        }

        let ttl = chrono::Duration::from_std(request.ttl).map_err(|e| PaymentError::Provider(e.to_string()))?;
        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        let session = CheckoutSession {
            client_secret: format!("{session_id}_secret"),
            session_id,
            expires_at: self.clock.now() + ttl,
        };
        state.created.push((session.clone(), request));
        Ok(session)
    }

    async fn confirm_checkout(&self, payload: &str, signature: &str) -> PaymentResult<CheckoutEvent> {
        if signature != Self::SIGNATURE {
            return Err(PaymentError::InvalidSignature("signature does not match".to_string()));
        }
        parse_webhook(payload)
    }

    async fn expire_checkout(&self, session_id: &str) -> PaymentResult<()> {
        let mut state = self.state.lock().await;
        if state.completed.contains(session_id) {
            return Err(PaymentError::Provider(format!("session {session_id} is already complete")));
        }
        state.expired.insert(session_id.to_string());
        Ok(())
    }

    async fn session_state(&self, session_id: &str) -> PaymentResult<SessionState> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        Self::state_of(&state, session_id, now)
            .ok_or_else(|| PaymentError::Provider(format!("no such checkout session: {session_id}")))
    }
}
