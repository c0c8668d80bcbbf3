//! Stripe checkout integration
//!
//! Opens embedded checkout sessions over the REST API and verifies the
//! `Stripe-Signature` header of incoming webhooks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use super::payment::{parse_webhook, CheckoutEvent, CheckoutRequest, CheckoutSession, PaymentProvider, SessionState};
use crate::config::PaymentConfig;
use crate::utils::errors::{PaymentError, PaymentResult};
use crate::utils::logging::log_payment_event;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    client_secret: Option<String>,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct SessionStatusResponse {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Stripe-backed payment provider
#[derive(Clone, Debug)]
pub struct StripeCheckout {
    client: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    tolerance: Duration,
}

impl StripeCheckout {
    /// Create a new StripeCheckout instance
    pub fn new(config: &PaymentConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("RosterDesk/1.0")
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            tolerance: Duration::from_secs(config.signature_tolerance_seconds),
        })
    }

    fn session_form(request: &CheckoutRequest, expires_at: DateTime<Utc>) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("ui_mode".to_string(), "embedded".to_string()),
            ("return_url".to_string(), request.return_url.clone()),
            ("expires_at".to_string(), expires_at.timestamp().to_string()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
            form.push((format!("{prefix}[price_data][currency]"), request.currency.clone()));
            form.push((format!("{prefix}[price_data][unit_amount]"), item.unit_amount.to_string()));
            form.push((format!("{prefix}[price_data][product_data][name]"), item.name.clone()));
        }

        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        form
    }

    async fn provider_error(response: reqwest::Response) -> PaymentError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(body);
        PaymentError::Provider(format!("HTTP {status}: {message}"))
    }
}

/// Verify a `t=…,v1=…` signature header against the raw payload
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> PaymentResult<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".to_string()));
    }

    let age = (now.timestamp() - timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(PaymentError::InvalidSignature(format!("timestamp outside tolerance by {age}s")));
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let matches = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        HmacSha256::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(signed_payload.as_bytes());
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false)
    });

    if matches {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature("no matching v1 signature".to_string()))
    }
}

/// Compute the `v1` signature for a payload, as the provider does
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> PaymentResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl PaymentProvider for StripeCheckout {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        let ttl = chrono::Duration::from_std(request.ttl).map_err(|e| PaymentError::Provider(e.to_string()))?;
        let form = Self::session_form(&request, Utc::now() + ttl);
        let url = format!("{}/v1/checkout/sessions", self.api_base);

        debug!(url = %url, items = request.line_items.len(), "Creating checkout session");

        let response = self.client.post(&url).bearer_auth(&self.secret_key).form(&form).send().await?;
        if !response.status().is_success() {
            let error = Self::provider_error(response).await;
            warn!(error = %error, "Checkout session creation rejected");
            return Err(error);
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("invalid session response: {e}")))?;
        let expires_at = DateTime::from_timestamp(session.expires_at, 0)
            .ok_or_else(|| PaymentError::Provider(format!("invalid expires_at {}", session.expires_at)))?;

        log_payment_event(&session.id, "checkout.session.created", true, None);
        Ok(CheckoutSession {
            client_secret: session.client_secret.unwrap_or_default(),
            session_id: session.id,
            expires_at,
        })
    }

    async fn confirm_checkout(&self, payload: &str, signature: &str) -> PaymentResult<CheckoutEvent> {
        verify_signature(payload, signature, &self.webhook_secret, self.tolerance, Utc::now())?;
        parse_webhook(payload)
    }

    async fn expire_checkout(&self, session_id: &str) -> PaymentResult<()> {
        let url = format!("{}/v1/checkout/sessions/{session_id}/expire", self.api_base);
        let response = self.client.post(&url).bearer_auth(&self.secret_key).send().await?;

        if !response.status().is_success() {
            let error = Self::provider_error(response).await;
            log_payment_event(session_id, "checkout.session.expire", false, Some(&error.to_string()));
            return Err(error);
        }

        log_payment_event(session_id, "checkout.session.expire", true, None);
        Ok(())
    }

    async fn session_state(&self, session_id: &str) -> PaymentResult<SessionState> {
        let url = format!("{}/v1/checkout/sessions/{session_id}", self.api_base);
        let response = self.client.get(&url).bearer_auth(&self.secret_key).send().await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let session: SessionStatusResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("invalid session response: {e}")))?;
        match session.status.as_deref() {
            Some("open") => Ok(SessionState::Open),
            Some("complete") => Ok(SessionState::Complete),
            Some("expired") => Ok(SessionState::Expired),
            other => Err(PaymentError::Provider(format!("unknown session status {other:?}"))),
        }
    }
}
