//! Expired checkout sweeper
//!
//! Settles registrations whose checkout deadline passed without the
//! provider's webhook ever arriving. The provider is asked for the session's
//! state first: a completed payment is confirmed, anything else goes through
//! the workflow's own expiry path, so a success always wins.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::registration::{CheckoutSettlement, ExpiryOutcome, RegistrationService};
use crate::config::SweeperConfig;
use crate::database::IntentRepository;
use crate::utils::errors::RegistrationError;

const CONCURRENCY: usize = 4;
/// Intents of one event race on its version, so lost races are retried
const MAX_ATTEMPTS: usize = 3;

/// Tally of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub rolled_back: usize,
    /// Paid at the provider but never confirmed by webhook
    pub confirmed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ExpirySweeper {
    service: RegistrationService,
    intents: IntentRepository,
    interval: Duration,
    batch_size: usize,
    grace_period: chrono::Duration,
}

impl ExpirySweeper {
    pub fn new(service: RegistrationService, intents: IntentRepository, config: &SweeperConfig) -> Self {
        Self {
            service,
            intents,
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            batch_size: config.batch_size,
            grace_period: chrono::Duration::seconds(i64::try_from(config.grace_period_seconds).unwrap_or(i64::MAX)),
        }
    }

    /// Settle one batch of intents that expired before the grace period
    pub async fn sweep_once(&self) -> Result<SweepReport, RegistrationError> {
        let cutoff = self.service.now() - self.grace_period;
        let expired = self
            .intents
            .list_expired(cutoff, self.batch_size)
            .await
            .map_err(RegistrationError::from_fetch)?;

        let outcomes: Vec<_> = stream::iter(expired)
            .map(|intent| async move {
                let mut attempt = 1;
                loop {
                    let outcome = self.service.settle_lapsed_checkout(&intent).await;
                    match outcome {
                        Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                            debug!(session_id = %intent.payment_session_id, attempt, error = %e, "Retrying settlement");
                            attempt += 1;
                        }
                        outcome => break (intent, outcome),
                    }
                }
            })
            .buffer_unordered(CONCURRENCY)
            .collect()
            .await;

        let mut report = SweepReport { examined: outcomes.len(), ..Default::default() };
        for (intent, outcome) in outcomes {
            match outcome {
                Ok(CheckoutSettlement::Expired(ExpiryOutcome::RolledBack { .. })) => report.rolled_back += 1,
                Ok(CheckoutSettlement::Paid(_)) => {
                    info!(session_id = %intent.payment_session_id, "Confirmed payment whose webhook never arrived");
                    report.confirmed += 1;
                }
                Ok(other) => {
                    debug!(session_id = %intent.payment_session_id, outcome = ?other, "Expired intent skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        event_id = %intent.event_id,
                        session_id = %intent.payment_session_id,
                        error = %e,
                        "Failed to settle lapsed checkout"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                rolled_back = report.rolled_back,
                confirmed = report.confirmed,
                skipped = report.skipped,
                failed = report.failed,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep on every tick until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
        info!("Expiry sweeper stopped");
    }
}
