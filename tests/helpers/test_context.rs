//! Test context for unified test setup
//!
//! Wires the registration workflow to an in-memory engine, a manual clock,
//! the mock payment provider and a recording notifier.

use std::sync::Arc;

use uuid::Uuid;

use super::doubles::{FlakyEngine, RecordingNotifier};
use super::test_data::{new_event, test_now};
use RosterDesk::config::Settings;
use RosterDesk::database::engine::StorageEngine;
use RosterDesk::database::{DatabaseService, MemoryEngine};
use RosterDesk::models::{Event, RegistrationOption};
use RosterDesk::services::payment::{EVENT_CHECKOUT_COMPLETED, EVENT_CHECKOUT_EXPIRED};
use RosterDesk::services::{
    EventService, ExpirySweeper, MockPaymentProvider, Notifier, PaymentProvider, PendingPayment, ServiceFactory,
};
use RosterDesk::utils::clock::ManualClock;
use RosterDesk::RegistrationService;

/// Unified test context that manages all test components
pub struct TestContext {
    pub db: DatabaseService,
    pub clock: Arc<ManualClock>,
    pub payments: Arc<MockPaymentProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: RegistrationService,
    pub events: EventService,
    pub settings: Settings,
    factory: ServiceFactory,
}

impl TestContext {
    /// Create a new test context over a fresh in-memory engine
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryEngine::new()), Arc::new(RecordingNotifier::new()))
    }

    /// Context whose notifier fails every delivery
    pub fn with_failing_notifier() -> Self {
        Self::build(Arc::new(MemoryEngine::new()), Arc::new(RecordingNotifier::failing()))
    }

    /// Context over an engine whose transactions can be made to fail
    pub fn with_flaky_engine() -> (Self, Arc<FlakyEngine>) {
        let engine = Arc::new(FlakyEngine::new(MemoryEngine::new()));
        (Self::build(engine.clone(), Arc::new(RecordingNotifier::new())), engine)
    }

    /// Context over any engine
    pub fn with_engine(engine: Arc<dyn StorageEngine>) -> Self {
        Self::build(engine, Arc::new(RecordingNotifier::new()))
    }

    fn build(engine: Arc<dyn StorageEngine>, notifier: Arc<RecordingNotifier>) -> Self {
        // Initialize logging once
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let settings = Settings::default();
        let db = DatabaseService::new(engine);
        let clock = Arc::new(ManualClock::new(test_now()));
        let payments = Arc::new(MockPaymentProvider::with_clock(clock.clone()));

        let factory = ServiceFactory::with_collaborators(
            &settings,
            db.clone(),
            payments.clone() as Arc<dyn PaymentProvider>,
            notifier.clone() as Arc<dyn Notifier>,
            clock.clone(),
        );

        Self {
            db,
            clock,
            payments,
            notifier,
            service: factory.registration_service.clone(),
            events: factory.event_service.clone(),
            settings,
            factory,
        }
    }

    /// Publish an event with the given options
    pub async fn create_event(&self, options: Vec<RegistrationOption>) -> Event {
        self.events.create_event(new_event(options)).await.expect("Failed to create event")
    }

    /// Current stored snapshot of an event
    pub async fn event(&self, event_id: Uuid) -> Event {
        self.events.get_event(event_id).await.expect("Failed to fetch event")
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        self.factory.expiry_sweeper(&self.settings)
    }

    /// Signed webhook body completing a pending checkout
    pub fn completed_webhook(&self, pending: &PendingPayment) -> String {
        MockPaymentProvider::webhook_payload(
            EVENT_CHECKOUT_COMPLETED,
            &pending.checkout.session_id,
            &super::payment_metadata(pending.event.id, pending.registration.email()),
        )
    }

    /// Signed webhook body expiring a pending checkout
    pub fn expired_webhook(&self, pending: &PendingPayment) -> String {
        MockPaymentProvider::webhook_payload(
            EVENT_CHECKOUT_EXPIRED,
            &pending.checkout.session_id,
            &super::payment_metadata(pending.event.id, pending.registration.email()),
        )
    }
}

/// Signature the mock provider accepts
pub fn signature() -> &'static str {
    MockPaymentProvider::SIGNATURE
}
