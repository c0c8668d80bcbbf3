//! Services module
//!
//! This module contains business logic services and their collaborators

pub mod events;
pub mod expiry;
pub mod notification;
pub mod payment;
pub mod registration;
pub mod stripe;

// Re-export commonly used services
pub use events::EventService;
pub use expiry::{ExpirySweeper, SweepReport};
pub use notification::{render_confirmation, ConfirmationTemplate, LogNotifier, Notifier, RenderedEmail};
pub use payment::{
    CheckoutEvent, CheckoutRequest, CheckoutSession, CheckoutStatus, LineItem, MockPaymentProvider, PaymentProvider,
    SessionState,
};
pub use registration::{
    CheckoutSettings, CheckoutSettlement, ExpiryOutcome, PendingPayment, Registered, RegistrationOutcome,
    RegistrationService,
};
pub use stripe::StripeCheckout;

use std::sync::Arc;

use crate::config::{PaymentProviderKind, Settings};
use crate::database::DatabaseService;
use crate::utils::clock::Clock;
use crate::utils::errors::Result;

/// Service factory wiring the workflow to its collaborators
#[derive(Clone)]
pub struct ServiceFactory {
    pub registration_service: RegistrationService,
    pub event_service: EventService,
    pub database: DatabaseService,
}

impl ServiceFactory {
    /// Create a new ServiceFactory with all services initialized
    pub fn new(settings: &Settings, database: DatabaseService, clock: Arc<dyn Clock>) -> Result<Self> {
        let payments: Arc<dyn PaymentProvider> = match settings.payment.provider {
            PaymentProviderKind::Stripe => Arc::new(StripeCheckout::new(&settings.payment)?),
            PaymentProviderKind::Mock => Arc::new(MockPaymentProvider::with_clock(clock.clone())),
        };
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new(settings.notification.clone()));

        Ok(Self::with_collaborators(settings, database, payments, notifier, clock))
    }

    /// Wire the services around explicit collaborators
    pub fn with_collaborators(
        settings: &Settings,
        database: DatabaseService,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registration_service = RegistrationService::new(
            database.clone(),
            payments,
            notifier,
            clock,
            CheckoutSettings::from_config(&settings.payment),
        );
        let event_service = EventService::new(database.clone());

        Self { registration_service, event_service, database }
    }

    /// Sweeper rolling back abandoned checkouts
    pub fn expiry_sweeper(&self, settings: &Settings) -> ExpirySweeper {
        ExpirySweeper::new(
            self.registration_service.clone(),
            self.database.intents.clone(),
            &settings.sweeper,
        )
    }
}
