//! Error handling for RosterDesk
//!
//! This module defines the main error types used throughout the application
//! and provides a unified error handling strategy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::database::engine::{ConditionFailure, ItemKey};
use crate::models::RegistrationType;

/// Boxed source error carried by infrastructure faults
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for RosterDesk application
#[derive(Error, Debug)]
pub enum RosterDeskError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Logging setup error: {0}")]
    Logging(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Storage engine errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Item not found: {key}")]
    NotFound { key: ItemKey },

    #[error("Item already exists: {key}")]
    AlreadyExists { key: ItemKey },

    #[error("Item does not exist: {key}")]
    DoesNotExist { key: ItemKey },

    #[error("Version mismatch for {key}: expected {expected}, found {actual}")]
    VersionMismatch { key: ItemKey, expected: i64, actual: i64 },

    #[error("Transaction canceled: {} condition(s) failed", .failures.len())]
    TransactionCanceled { failures: Vec<ConditionFailure> },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Storage operation {operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },

    #[error("Failed to fetch from storage: {0}")]
    FetchFailed(#[source] BoxError),

    #[error("Failed to write to storage: {0}")]
    WriteFailed(#[source] BoxError),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Registration workflow errors
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Associated event does not exist: {event_id}")]
    AssociatedEventDoesNotExist { event_id: Uuid },

    #[error("Registration already exists for {email} at event {event_id}")]
    RegistrationAlreadyExists { event_id: Uuid, email: String },

    #[error("Registration does not exist for {email} at event {event_id}")]
    RegistrationDoesNotExist { event_id: Uuid, email: String },

    #[error("Registration for event {event_id} closed at {closed_at}")]
    RegistrationIsClosed { event_id: Uuid, closed_at: DateTime<Utc> },

    #[error("Not allowed to sign up as {registration_type}")]
    NotAllowedToSignUpAsType { registration_type: RegistrationType },

    #[error("Team size {attempted} not allowed, must be between {min} and {max}")]
    TeamSizeNotAllowed { attempted: u32, min: u32, max: u32 },

    #[error("Unknown registration type: {0}")]
    UnknownRegistrationType(String),

    #[error("Failed to fetch: {0}")]
    FailedToFetch(#[source] StorageError),

    #[error("Failed to write: {0}")]
    FailedToWrite(#[source] StorageError),

    #[error("Storage deadline exceeded: {0}")]
    Timeout(#[source] StorageError),

    #[error("Failed to translate to database model: {0}")]
    FailedToTranslateToDBModel(#[source] serde_json::Error),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Counters of event {event_id} would become inconsistent")]
    InconsistentCounters { event_id: Uuid },

    #[error("Failed to create checkout: {0}")]
    FailedToCreateCheckout(#[source] PaymentError),

    #[error("Failed to look up checkout session: {0}")]
    FailedToCheckCheckout(#[source] PaymentError),

    #[error("Payment metadata is missing {0}")]
    PaymentMissingMetadata(&'static str),

    #[error("Invalid payment metadata: {0}")]
    InvalidPaymentMetadata(String),

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(#[source] PaymentError),

    #[error("Registration for {email} at event {event_id} expired")]
    RegistrationExpired { event_id: Uuid, email: String },
}

/// Event administration errors
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: Uuid },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event {event_id} was modified concurrently (expected version {expected}, found {actual})")]
    StaleEvent { event_id: Uuid, expected: i64, actual: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Payment collaborator errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Checkout event is not a confirmation event: {0}")]
    NotConfirmationEvent(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Payment provider rejected the request: {0}")]
    Provider(String),

    #[error("Payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Notification collaborator errors
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Result type alias for RosterDesk operations
pub type Result<T> = std::result::Result<T, RosterDeskError>;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for payment operations
pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

/// How a registration error should be treated by whoever called the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request broke an event policy; report it, never retry it
    BusinessRejection,
    /// Storage or serialization fault; the caller may retry from scratch
    Infrastructure,
    /// Payment path problem the webhook handler answers per kind
    Payment,
    /// Deliberate final outcome of a payment that was never completed
    Terminal,
}

impl RegistrationError {
    /// Classify a storage fault raised while reading
    pub fn from_fetch(err: StorageError) -> Self {
        match err {
            e @ StorageError::Timeout { .. } => RegistrationError::Timeout(e),
            StorageError::Serialization(e) => RegistrationError::FailedToTranslateToDBModel(e),
            StorageError::InvalidCursor(reason) => RegistrationError::InvalidCursor(reason),
            other => RegistrationError::FailedToFetch(other),
        }
    }

    /// Classify a storage fault raised while writing
    pub fn from_write(err: StorageError) -> Self {
        match err {
            e @ StorageError::Timeout { .. } => RegistrationError::Timeout(e),
            StorageError::Serialization(e) => RegistrationError::FailedToTranslateToDBModel(e),
            other => RegistrationError::FailedToWrite(other),
        }
    }

    /// Get the error class
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistrationError::AssociatedEventDoesNotExist { .. }
            | RegistrationError::RegistrationAlreadyExists { .. }
            | RegistrationError::RegistrationDoesNotExist { .. }
            | RegistrationError::RegistrationIsClosed { .. }
            | RegistrationError::NotAllowedToSignUpAsType { .. }
            | RegistrationError::TeamSizeNotAllowed { .. }
            | RegistrationError::UnknownRegistrationType(_) => ErrorClass::BusinessRejection,
            RegistrationError::FailedToFetch(_)
            | RegistrationError::FailedToWrite(_)
            | RegistrationError::Timeout(_)
            | RegistrationError::FailedToTranslateToDBModel(_)
            | RegistrationError::InvalidCursor(_)
            | RegistrationError::InconsistentCounters { .. } => ErrorClass::Infrastructure,
            RegistrationError::FailedToCreateCheckout(_)
            | RegistrationError::FailedToCheckCheckout(_)
            | RegistrationError::PaymentMissingMetadata(_)
            | RegistrationError::InvalidPaymentMetadata(_)
            | RegistrationError::PaymentVerificationFailed(_) => ErrorClass::Payment,
            RegistrationError::RegistrationExpired { .. } => ErrorClass::Terminal,
        }
    }

    /// HTTP-equivalent status for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            RegistrationError::AssociatedEventDoesNotExist { .. } => 404,
            RegistrationError::RegistrationDoesNotExist { .. } => 404,
            RegistrationError::RegistrationAlreadyExists { .. } => 409,
            RegistrationError::RegistrationIsClosed { .. } => 403,
            RegistrationError::NotAllowedToSignUpAsType { .. } => 403,
            RegistrationError::TeamSizeNotAllowed { .. } => 422,
            RegistrationError::UnknownRegistrationType(_) => 400,
            RegistrationError::InvalidCursor(_) => 400,
            RegistrationError::Timeout(_) => 504,
            RegistrationError::FailedToCreateCheckout(_) => 502,
            RegistrationError::FailedToCheckCheckout(_) => 502,
            RegistrationError::PaymentMissingMetadata(_) => 400,
            RegistrationError::InvalidPaymentMetadata(_) => 400,
            RegistrationError::PaymentVerificationFailed(_) => 400,
            RegistrationError::RegistrationExpired { .. } => 200,
            RegistrationError::FailedToFetch(_)
            | RegistrationError::FailedToWrite(_)
            | RegistrationError::FailedToTranslateToDBModel(_)
            | RegistrationError::InconsistentCounters { .. } => 500,
        }
    }

    /// Whether repeating the whole attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistrationError::FailedToFetch(_)
                | RegistrationError::FailedToWrite(_)
                | RegistrationError::Timeout(_)
        )
    }
}

impl RosterDeskError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            RosterDeskError::Database(_) => false,
            RosterDeskError::Migration(_) => false,
            RosterDeskError::Storage(e) => matches!(e, StorageError::Timeout { .. }),
            RosterDeskError::Registration(e) => e.is_retryable(),
            RosterDeskError::Event(EventError::StaleEvent { .. }) => true,
            RosterDeskError::Event(_) => false,
            RosterDeskError::Payment(PaymentError::Http(_)) => true,
            RosterDeskError::Payment(_) => false,
            RosterDeskError::Config(_) => false,
            RosterDeskError::ConfigLoad(_) => false,
            RosterDeskError::Logging(_) => false,
            RosterDeskError::Serialization(_) => false,
            RosterDeskError::Io(_) => true,
            RosterDeskError::UrlParse(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RosterDeskError::Database(_) => ErrorSeverity::Critical,
            RosterDeskError::Migration(_) => ErrorSeverity::Critical,
            RosterDeskError::Config(_) => ErrorSeverity::Critical,
            RosterDeskError::ConfigLoad(_) => ErrorSeverity::Critical,
            RosterDeskError::Registration(e) => match e.class() {
                ErrorClass::BusinessRejection => ErrorSeverity::Info,
                ErrorClass::Terminal => ErrorSeverity::Info,
                ErrorClass::Payment => ErrorSeverity::Warning,
                ErrorClass::Infrastructure => ErrorSeverity::Error,
            },
            RosterDeskError::Event(EventError::InvalidEvent(_)) => ErrorSeverity::Info,
            RosterDeskError::Event(EventError::StaleEvent { .. }) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
