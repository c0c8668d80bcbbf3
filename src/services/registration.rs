//! Registration workflow
//!
//! Moves a registration from request to committed (free events) or through a
//! pending checkout to confirmed or rolled back (paid events). Every step that
//! changes event counters is one storage transaction covering the event, the
//! registration and, on the paid path, the payment intent. Concurrent writers
//! are resolved by the event's version check; the loser gets `FailedToWrite`
//! and must start over from a fresh read.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::notification::Notifier;
use super::payment::{
    CheckoutRequest, CheckoutSession, CheckoutStatus, LineItem, PaymentProvider, SessionState, METADATA_EMAIL,
    METADATA_EVENT_ID,
};
use crate::config::PaymentConfig;
use crate::database::engine::FailureReason;
use crate::database::{DatabaseService, Page, RegistrationRepository};
use crate::models::{Event, Registration, RegistrationIntent, RegistrationRequest};
use crate::utils::clock::Clock;
use crate::utils::errors::{PaymentError, RegistrationError, StorageError};
use crate::utils::helpers::mask_email;
use crate::utils::logging::{log_payment_event, log_registration_action};

type Result<T> = std::result::Result<T, RegistrationError>;

/// How paid registrations open their checkout
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub ttl: Duration,
    /// Return URL with an optional `{eventId}` placeholder
    pub return_url: String,
    pub currency: String,
}

impl CheckoutSettings {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            ttl: config.checkout_ttl(),
            return_url: config.return_url.clone(),
            currency: config.currency.clone(),
        }
    }

    fn return_url_for(&self, event_id: Uuid) -> String {
        self.return_url.replace("{eventId}", &event_id.to_string())
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            return_url: "http://localhost:3000/events/{eventId}/registered".to_string(),
            currency: "usd".to_string(),
        }
    }
}

/// A committed registration with the event snapshot it was committed against
#[derive(Debug, Clone, PartialEq)]
pub struct Registered {
    pub registration: Registration,
    pub event: Event,
}

/// A registration holding its slot while the checkout is open
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub registration: Registration,
    pub event: Event,
    pub intent: RegistrationIntent,
    pub checkout: CheckoutSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Confirmed(Registered),
    AwaitingPayment(PendingPayment),
}

/// Result of an expiry signal
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryOutcome {
    /// Registration and intent removed; `event` is the decremented snapshot,
    /// absent when only an orphaned intent was removed
    RolledBack { event: Option<Event> },
    /// Neither record exists any more
    AlreadyProcessed,
    /// The registration was paid first
    SupersededByPayment,
    /// The registration has no pending payment (free or already confirmed)
    NoPendingPayment,
    /// The intent belongs to a newer checkout session
    StaleSession,
}

/// Result of settling a checkout whose deadline passed without a webhook
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutSettlement {
    /// The customer paid before the session lapsed
    Paid(Registration),
    /// The session can no longer be paid and the expiry path ran
    Expired(ExpiryOutcome),
    /// The provider still accepts payment for the session
    StillOpen,
}

/// Validate a registration against its event's policy and return the event
/// snapshot that includes it
pub fn apply_registration_policy(event: &Event, registration: &Registration) -> Result<Event> {
    let registration_type = registration.registration_type();
    if !event.allows(registration_type) {
        return Err(RegistrationError::NotAllowedToSignUpAsType { registration_type });
    }
    if !event.is_open_at(registration.registered_at()) {
        return Err(RegistrationError::RegistrationIsClosed {
            event_id: event.id,
            closed_at: event.registration_close_time,
        });
    }

    match registration {
        Registration::Individual(_) => {}
        Registration::Team(_) => {
            let range = event.allowed_team_size_range;
            let attempted = registration.player_count();
            if !range.contains(attempted) {
                return Err(RegistrationError::TeamSizeNotAllowed { attempted, min: range.min, max: range.max });
            }
        }
    }

    event
        .with_contribution_added(registration.contribution())
        .map(|updated| updated.bumped())
        .ok_or(RegistrationError::InconsistentCounters { event_id: event.id })
}

/// Event snapshot with a registration's contribution removed
pub fn apply_registration_rollback(event: &Event, registration: &Registration) -> Result<Event> {
    event
        .with_contribution_removed(registration.contribution())
        .map(|updated| updated.bumped())
        .ok_or(RegistrationError::InconsistentCounters { event_id: event.id })
}

fn parse_payment_metadata(metadata: &BTreeMap<String, String>) -> Result<(Uuid, String)> {
    let email = metadata
        .get(METADATA_EMAIL)
        .filter(|email| !email.trim().is_empty())
        .ok_or(RegistrationError::PaymentMissingMetadata(METADATA_EMAIL))?;
    let raw_event_id = metadata
        .get(METADATA_EVENT_ID)
        .ok_or(RegistrationError::PaymentMissingMetadata(METADATA_EVENT_ID))?;
    let event_id = Uuid::parse_str(raw_event_id)
        .map_err(|e| RegistrationError::InvalidPaymentMetadata(format!("eventId {raw_event_id:?}: {e}")))?;

    Ok((event_id, email.clone()))
}

/// Registration workflow service
#[derive(Clone)]
pub struct RegistrationService {
    db: DatabaseService,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    checkout: CheckoutSettings,
}

impl RegistrationService {
    /// Create a new RegistrationService instance
    pub fn new(
        db: DatabaseService,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        checkout: CheckoutSettings,
    ) -> Self {
        Self { db, payments, notifier, clock, checkout }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register on the free path
    pub async fn attempt_registration(&self, request: RegistrationRequest) -> Result<Registered> {
        let event = self.fetch_event(request.event_id()).await?;
        let registration = request.into_registration(Uuid::new_v4(), self.clock.now());
        self.commit_free(registration, event).await
    }

    /// Register on the paid path, opening a checkout session
    pub async fn register_with_payment(&self, request: RegistrationRequest) -> Result<PendingPayment> {
        let event = self.fetch_event(request.event_id()).await?;
        let registration = request.into_registration(Uuid::new_v4(), self.clock.now());
        self.commit_paid(registration, event).await
    }

    /// Register on whichever path the event's price for the kind calls for
    pub async fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome> {
        let event = self.fetch_event(request.event_id()).await?;
        let price = event.option_for(request.registration_type()).map(|option| option.price);
        let registration = request.into_registration(Uuid::new_v4(), self.clock.now());

        match price {
            Some(price) if price > 0 => {
                self.commit_paid(registration, event).await.map(RegistrationOutcome::AwaitingPayment)
            }
            _ => self.commit_free(registration, event).await.map(RegistrationOutcome::Confirmed),
        }
    }

    /// Handle a checkout webhook
    ///
    /// Returns the paid registration on completion, `None` when the delivery
    /// required no change, and `RegistrationExpired` when an expiry rolled the
    /// registration back.
    pub async fn confirm_registration_payment(&self, payload: &str, signature: &str) -> Result<Option<Registration>> {
        let checkout = match self.payments.confirm_checkout(payload, signature).await {
            Ok(checkout) => checkout,
            Err(PaymentError::NotConfirmationEvent(event_type)) => {
                debug!(event_type = %event_type, "Ignoring checkout event");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "Checkout webhook verification failed");
                return Err(RegistrationError::PaymentVerificationFailed(e));
            }
        };

        let (event_id, email) = parse_payment_metadata(&checkout.metadata)?;

        match checkout.status {
            CheckoutStatus::Expired => {
                log_payment_event(&checkout.session_id, "checkout.session.expired", true, None);
                match self.expire_registration(event_id, &email, Some(&checkout.session_id)).await? {
                    ExpiryOutcome::RolledBack { .. } => Err(RegistrationError::RegistrationExpired { event_id, email }),
                    _ => Ok(None),
                }
            }
            CheckoutStatus::Completed => {
                log_payment_event(&checkout.session_id, "checkout.session.completed", true, None);
                self.mark_paid(event_id, &email, &checkout.session_id).await.map(Some)
            }
        }
    }

    /// Roll back a registration whose checkout expired
    ///
    /// A success signal always wins: a paid registration, or an intent opened
    /// by a different session than `session_id`, is left alone.
    pub async fn expire_registration(
        &self,
        event_id: Uuid,
        email: &str,
        session_id: Option<&str>,
    ) -> Result<ExpiryOutcome> {
        let registration = self
            .db
            .registrations
            .find(event_id, email)
            .await
            .map_err(RegistrationError::from_fetch)?;
        let intent = self.db.intents.find(event_id, email).await.map_err(RegistrationError::from_fetch)?;

        match (registration, intent) {
            (None, None) => {
                debug!(event_id = %event_id, "Expiry already processed");
                Ok(ExpiryOutcome::AlreadyProcessed)
            }
            (Some(registration), intent) if registration.is_paid() => {
                if let Some(intent) = intent {
                    // Leftover from a confirmation that lost the race to an expiry read
                    self.db
                        .commit(vec![self.db.intents.delete_op(&intent)])
                        .await
                        .map_err(RegistrationError::from_write)?;
                }
                log_registration_action(event_id, email, "expiry_ignored", Some("already paid"));
                Ok(ExpiryOutcome::SupersededByPayment)
            }
            (_, Some(intent)) if session_id.is_some_and(|session| session != intent.payment_session_id) => {
                log_registration_action(event_id, email, "expiry_ignored", Some("stale session"));
                Ok(ExpiryOutcome::StaleSession)
            }
            (Some(_), None) => Ok(ExpiryOutcome::NoPendingPayment),
            (None, Some(intent)) => {
                self.db
                    .commit(vec![self.db.intents.delete_op(&intent)])
                    .await
                    .map_err(RegistrationError::from_write)?;
                log_registration_action(event_id, email, "orphaned_intent_removed", None);
                Ok(ExpiryOutcome::RolledBack { event: None })
            }
            (Some(registration), Some(intent)) => {
                let event = self.fetch_event(event_id).await?;
                let updated = apply_registration_rollback(&event, &registration)?;

                let ops = vec![
                    self.db.registrations.delete_op(&registration),
                    self.db.intents.delete_op(&intent),
                    self.db
                        .events
                        .write_op(&updated, event.version)
                        .map_err(RegistrationError::from_write)?,
                ];
                self.db.commit(ops).await.map_err(RegistrationError::from_write)?;

                log_registration_action(event_id, email, "rolled_back", Some(&intent.payment_session_id));
                Ok(ExpiryOutcome::RolledBack { event: Some(updated) })
            }
        }
    }

    /// Settle an intent whose checkout deadline passed without a webhook
    ///
    /// The provider decides: a completed session is confirmed, an open one
    /// is expired at the provider before the registration is rolled back.
    pub async fn settle_lapsed_checkout(&self, intent: &RegistrationIntent) -> Result<CheckoutSettlement> {
        let session_id = intent.payment_session_id.as_str();
        let state = self.payments.session_state(session_id).await.map_err(|e| {
            log_payment_event(session_id, "checkout.session.lookup", false, Some(&e.to_string()));
            RegistrationError::FailedToCheckCheckout(e)
        })?;

        match state {
            SessionState::Complete => {
                log_payment_event(session_id, "checkout.session.completed", true, Some("settled without webhook"));
                let paid = self.mark_paid(intent.event_id, &intent.email, session_id).await?;

                // An earlier confirmation may have left its intent behind
                let lingering = self
                    .db
                    .intents
                    .find(intent.event_id, &intent.email)
                    .await
                    .map_err(RegistrationError::from_fetch)?;
                if let Some(lingering) = lingering {
                    self.db
                        .commit(vec![self.db.intents.delete_op(&lingering)])
                        .await
                        .map_err(RegistrationError::from_write)?;
                }
                Ok(CheckoutSettlement::Paid(paid))
            }
            SessionState::Open => {
                // A payment must not land after the slot is released
                if let Err(e) = self.payments.expire_checkout(session_id).await {
                    debug!(session_id = %session_id, error = %e, "Checkout still payable, left for the next sweep");
                    return Ok(CheckoutSettlement::StillOpen);
                }
                self.expire_registration(intent.event_id, &intent.email, Some(session_id))
                    .await
                    .map(CheckoutSettlement::Expired)
            }
            SessionState::Expired => self
                .expire_registration(intent.event_id, &intent.email, Some(session_id))
                .await
                .map(CheckoutSettlement::Expired),
        }
    }

    /// Fetch one registration
    pub async fn get_registration(&self, event_id: Uuid, email: &str) -> Result<Registration> {
        self.db.registrations.get(event_id, email).await.map_err(|e| match e {
            StorageError::NotFound { .. } => {
                RegistrationError::RegistrationDoesNotExist { event_id, email: email.to_string() }
            }
            other => RegistrationError::from_fetch(other),
        })
    }

    /// Page through the registrations of an event
    pub async fn list_registrations(
        &self,
        event_id: Uuid,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Registration>> {
        self.db
            .registrations
            .list_for_event(event_id, limit, cursor)
            .await
            .map_err(RegistrationError::from_fetch)
    }

    async fn fetch_event(&self, event_id: Uuid) -> Result<Event> {
        self.db.events.get(event_id).await.map_err(|e| match e {
            StorageError::NotFound { .. } => RegistrationError::AssociatedEventDoesNotExist { event_id },
            other => RegistrationError::from_fetch(other),
        })
    }

    async fn commit_free(&self, registration: Registration, event: Event) -> Result<Registered> {
        let updated = apply_registration_policy(&event, &registration)?;

        let ops = vec![
            self.db.registrations.insert_op(&registration).map_err(RegistrationError::from_write)?,
            self.db.events.write_op(&updated, event.version).map_err(RegistrationError::from_write)?,
        ];
        self.db.commit(ops).await.map_err(|e| creation_error(e, &registration))?;

        log_registration_action(updated.id, registration.email(), "registered", Some(registration.registration_type().as_str()));
        self.notify(&registration, &updated).await;

        Ok(Registered { registration, event: updated })
    }

    async fn commit_paid(&self, registration: Registration, event: Event) -> Result<PendingPayment> {
        let updated = apply_registration_policy(&event, &registration)?;
        let event_id = event.id;
        let registration_type = registration.registration_type();

        // Fail fast before a checkout is opened for a duplicate
        if self
            .db
            .registrations
            .find(event_id, registration.email())
            .await
            .map_err(RegistrationError::from_fetch)?
            .is_some()
        {
            return Err(RegistrationError::RegistrationAlreadyExists {
                event_id,
                email: registration.email().to_string(),
            });
        }

        let price = event
            .option_for(registration_type)
            .map(|option| option.price)
            .ok_or(RegistrationError::NotAllowedToSignUpAsType { registration_type })?;

        let request = CheckoutRequest {
            line_items: vec![LineItem {
                name: format!("{} ({} registration)", event.name, registration_type),
                unit_amount: price,
                quantity: 1,
            }],
            metadata: BTreeMap::from([
                (METADATA_EMAIL.to_string(), registration.email().to_string()),
                (METADATA_EVENT_ID.to_string(), event_id.to_string()),
            ]),
            return_url: self.checkout.return_url_for(event_id),
            ttl: self.checkout.ttl,
            currency: self.checkout.currency.clone(),
        };

        let checkout = self.payments.create_checkout(request).await.map_err(|e| {
            warn!(event_id = %event_id, error = %e, "Failed to create checkout");
            RegistrationError::FailedToCreateCheckout(e)
        })?;

        let intent = RegistrationIntent::new(
            event_id,
            checkout.session_id.clone(),
            registration.email().to_string(),
            checkout.expires_at,
        );

        let committed = self.commit_pending(&registration, &intent, &updated, event.version).await;
        if let Err(e) = committed {
            self.abandon_checkout(&checkout.session_id).await;
            return Err(e);
        }

        log_registration_action(event_id, registration.email(), "awaiting_payment", Some(&checkout.session_id));
        Ok(PendingPayment { registration, event: updated, intent, checkout })
    }

    async fn commit_pending(
        &self,
        registration: &Registration,
        intent: &RegistrationIntent,
        updated: &Event,
        prior_version: i64,
    ) -> Result<()> {
        let ops = vec![
            self.db.registrations.insert_op(registration).map_err(RegistrationError::from_write)?,
            self.db.intents.insert_op(intent).map_err(RegistrationError::from_write)?,
            self.db.events.write_op(updated, prior_version).map_err(RegistrationError::from_write)?,
        ];
        self.db.commit(ops).await.map_err(|e| creation_error(e, registration))
    }

    /// Expire a session whose registration was never stored
    async fn abandon_checkout(&self, session_id: &str) {
        match self.payments.expire_checkout(session_id).await {
            Ok(()) => log_payment_event(session_id, "checkout.session.abandoned", true, None),
            Err(e) => log_payment_event(session_id, "checkout.session.abandoned", false, Some(&e.to_string())),
        }
    }

    async fn mark_paid(&self, event_id: Uuid, email: &str, session_id: &str) -> Result<Registration> {
        let registration = self.db.registrations.get(event_id, email).await.map_err(|e| match e {
            e @ StorageError::NotFound { .. } => {
                error!(
                    event_id = %event_id,
                    email = %mask_email(email),
                    session_id = %session_id,
                    "Payment captured for a registration that no longer exists, refund or reconcile"
                );
                RegistrationError::FailedToWrite(e)
            }
            other => RegistrationError::from_fetch(other),
        })?;

        if registration.is_paid() {
            debug!(event_id = %event_id, "Duplicate payment confirmation");
            return Ok(registration);
        }

        let paid = registration.with_paid();
        let ops = vec![
            self.db
                .registrations
                .update_op(&paid, registration.version())
                .map_err(RegistrationError::from_write)?,
            self.db.intents.delete_any_op(event_id, email),
        ];
        self.db.commit(ops).await.map_err(RegistrationError::from_write)?;

        log_registration_action(event_id, email, "paid", None);
        match self.db.events.get(event_id).await {
            Ok(event) => self.notify(&paid, &event).await,
            Err(e) => warn!(event_id = %event_id, error = %e, "Skipping confirmation email, event unavailable"),
        }

        Ok(paid)
    }

    async fn notify(&self, registration: &Registration, event: &Event) {
        if let Err(e) = self.notifier.send_confirmation_email(registration, event).await {
            warn!(
                event_id = %event.id,
                registration_id = %registration.id(),
                error = %e,
                "Failed to send confirmation email"
            );
        } else {
            info!(event_id = %event.id, registration_id = %registration.id(), "Confirmation email sent");
        }
    }
}

/// Map a failed creation transaction, reporting a uniqueness collision first
fn creation_error(err: StorageError, registration: &Registration) -> RegistrationError {
    if let StorageError::TransactionCanceled { failures } = &err {
        let key = RegistrationRepository::key_for(registration);
        if failures
            .iter()
            .any(|failure| failure.key == key && failure.reason == FailureReason::AlreadyExists)
        {
            return RegistrationError::RegistrationAlreadyExists {
                event_id: registration.event_id(),
                email: registration.email().to_string(),
            };
        }
    }
    RegistrationError::from_write(err)
}
