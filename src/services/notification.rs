//! Notification service implementation
//!
//! Confirmation emails are rendered by a pure function from an injected
//! template. Delivery sits behind the `Notifier` trait; a failed delivery is
//! reported to the caller, which logs it and keeps the registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NotificationConfig;
use crate::models::{Event, Registration};
use crate::utils::errors::NotificationError;
use crate::utils::helpers::{escape_html, format_timestamp, mask_email};

/// Confirmation email template with `{placeholder}` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationTemplate {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl Default for ConfirmationTemplate {
    fn default() -> Self {
        Self {
            subject: "You're registered for {event_name}".to_string(),
            html: concat!(
                "<p>Hi {name},</p>",
                "<p>Your {registration_type} registration for <b>{event_name}</b> is confirmed.</p>",
                "<ul><li>Where: {event_location}</li><li>When: {event_start}</li>",
                "<li>Players: {player_count}</li><li>Payment: {payment_status}</li></ul>",
                "<p>See you there!<br>{organizer}</p>"
            )
            .to_string(),
            text: concat!(
                "Hi {name},\n\n",
                "Your {registration_type} registration for {event_name} is confirmed.\n\n",
                "Where: {event_location}\nWhen: {event_start}\n",
                "Players: {player_count}\nPayment: {payment_status}\n\n",
                "See you there!\n{organizer}\n"
            )
            .to_string(),
        }
    }
}

/// A rendered email, ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn template_parameters(organizer: &str, event: &Event, registration: &Registration) -> HashMap<&'static str, String> {
    let payment_status = match (registration.is_paid(), event.option_for(registration.registration_type())) {
        (true, _) => "paid",
        (false, Some(option)) if option.price == 0 => "free",
        (false, _) => "pending",
    };

    let mut parameters = HashMap::new();
    parameters.insert("name", registration.display_name());
    parameters.insert("event_name", event.name.clone());
    parameters.insert("event_location", event.location.clone());
    parameters.insert("event_start", format_timestamp(event.start_time));
    parameters.insert("registration_type", registration.registration_type().to_string());
    parameters.insert("player_count", registration.player_count().to_string());
    parameters.insert("payment_status", payment_status.to_string());
    parameters.insert("organizer", organizer.to_string());
    parameters
}

/// Substitute `{placeholder}`s in one pass; inserted values are never rescanned
fn fill(template: &str, parameters: &HashMap<&'static str, String>, escape: bool) -> String {
    let mut formatted = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        formatted.push_str(&rest[..start]);
        let tail = &rest[start..];
        let parameter = tail
            .find('}')
            .and_then(|end| parameters.get(&tail[1..end]).map(|value| (end, value)));

        match parameter {
            Some((end, value)) => {
                if escape {
                    formatted.push_str(&escape_html(value));
                } else {
                    formatted.push_str(value);
                }
                rest = &tail[end + 1..];
            }
            // Unknown placeholders stay as written
            None => {
                formatted.push('{');
                rest = &tail[1..];
            }
        }
    }

    formatted.push_str(rest);
    formatted
}

/// Render the confirmation email for a registration
pub fn render_confirmation(
    template: &ConfirmationTemplate,
    organizer: &str,
    event: &Event,
    registration: &Registration,
) -> RenderedEmail {
    let parameters = template_parameters(organizer, event, registration);
    RenderedEmail {
        to: registration.email().to_string(),
        subject: fill(&template.subject, &parameters, false),
        html: fill(&template.html, &parameters, true),
        text: fill(&template.text, &parameters, false),
    }
}

/// Delivery of registration confirmations
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation_email(
        &self,
        registration: &Registration,
        event: &Event,
    ) -> Result<(), NotificationError>;
}

/// Notifier that renders the email and writes it to the log
pub struct LogNotifier {
    template: ConfirmationTemplate,
    config: NotificationConfig,
    sent: AtomicU64,
}

impl LogNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self::with_template(config, ConfirmationTemplate::default())
    }

    pub fn with_template(config: NotificationConfig, template: ConfirmationTemplate) -> Self {
        Self { template, config, sent: AtomicU64::new(0) }
    }

    /// Number of emails rendered so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation_email(
        &self,
        registration: &Registration,
        event: &Event,
    ) -> Result<(), NotificationError> {
        let email = render_confirmation(&self.template, &self.config.organizer_name, event, registration);
        if email.subject.trim().is_empty() {
            return Err(NotificationError::Template("rendered subject is empty".to_string()));
        }

        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(
            from = %self.config.from_address,
            to = %mask_email(&email.to),
            subject = %email.subject,
            event_id = %event.id,
            "Confirmation email rendered"
        );
        Ok(())
    }
}
