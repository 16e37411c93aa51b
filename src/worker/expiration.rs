//! Daily pass that moves lapsed subscriptions to `expired`

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::Job;
use crate::fleet::{FleetService, Subscription, SubscriptionStatus};
use crate::store::{StoreError, SubscriptionStore};

/// Outcome of one pass, for logs and tests
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationReport {
    pub expired: usize,
    pub failed: usize,
}

pub struct ExpirationJob {
    subscriptions: Arc<dyn SubscriptionStore>,
    fleet: Arc<FleetService>,
}

impl ExpirationJob {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, fleet: Arc<FleetService>) -> Self {
        Self {
            subscriptions,
            fleet,
        }
    }

    /// Expire everything that lapsed at or before `now`
    ///
    /// Each record is handled on its own; one failure is logged and the rest
    /// still get processed. A record whose peer could not be disabled stays
    /// active and is picked up by the next pass, unless the peer is already
    /// gone (unknown to the agent, node removed), in which case there is
    /// nothing left to cut and it expires.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ExpirationReport, StoreError> {
        let due = self.subscriptions.list_expired(now).await?;
        debug!("{} subscription(s) due for expiration", due.len());

        let mut report = ExpirationReport::default();
        for subscription in due {
            match self.expire(&subscription).await {
                Ok(()) => report.expired += 1,
                Err(message) => {
                    warn!(
                        "Could not expire subscription {} (user {}): {}",
                        subscription.id, subscription.user_id, message
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn expire(&self, subscription: &Subscription) -> Result<(), String> {
        // Cut access before the record says so, so an expired subscription
        // never keeps a live peer
        if subscription.binding.is_some() {
            match self.fleet.disable_client(subscription).await {
                Ok(()) => {}
                Err(e) if e.is_peer_gone() => warn!(
                    "Subscription {} has no live peer to disable: {}",
                    subscription.id, e
                ),
                Err(e) => return Err(format!("disabling peer: {}", e)),
            }
        }

        self.subscriptions
            .update_status(subscription.id, SubscriptionStatus::Expired)
            .await
            .map_err(|e| format!("updating status: {}", e))?;

        info!(
            "Subscription {} (user {}) expired at {}",
            subscription.id, subscription.user_id, subscription.expires_at
        );
        Ok(())
    }
}

#[async_trait]
impl Job for ExpirationJob {
    fn name(&self) -> &'static str {
        "expiration"
    }

    async fn run(&self) {
        match self.run_at(Utc::now()).await {
            Ok(report) if report.expired + report.failed > 0 => info!(
                "Expiration pass: {} expired, {} failed",
                report.expired, report.failed
            ),
            Ok(_) => debug!("Expiration pass: nothing to do"),
            Err(e) => error!("Expiration pass could not list subscriptions: {}", e),
        }
    }
}
