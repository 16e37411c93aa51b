//! Retries provisioning for paid subscriptions that never got a peer

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::Job;
use crate::fleet::{FleetBinding, FleetError, FleetService, Subscription};
use crate::messaging::{ChatId, Messenger};
use crate::store::{StoreError, SubscriptionStore};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub provisioned: usize,
    pub failed: usize,
    /// True when the pass ended early because the fleet is full
    pub out_of_capacity: bool,
}

pub struct ProvisioningJob {
    subscriptions: Arc<dyn SubscriptionStore>,
    fleet: Arc<FleetService>,
    messenger: Arc<dyn Messenger>,
}

impl ProvisioningJob {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        fleet: Arc<FleetService>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            subscriptions,
            fleet,
            messenger,
        }
    }

    pub async fn run_once(&self) -> Result<ProvisioningReport, StoreError> {
        let pending = self.subscriptions.list_unprovisioned().await?;
        debug!("{} subscription(s) waiting for a peer", pending.len());

        let total = pending.len();
        let mut report = ProvisioningReport::default();
        for (index, subscription) in pending.iter().enumerate() {
            match self.provision(subscription).await {
                Ok(true) => report.provisioned += 1,
                Ok(false) => {}
                Err(e) if e.is_capacity() => {
                    warn!(
                        "Fleet has no free capacity, deferring {} remaining subscription(s)",
                        total - index
                    );
                    report.out_of_capacity = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        "Provisioning retry failed for subscription {} (user {}): {}",
                        subscription.id, subscription.user_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Returns `Ok(false)` when the record no longer needs a peer
    async fn provision(&self, listed: &Subscription) -> Result<bool, FleetError> {
        // A conversation handler may have provisioned it since the listing
        match self.subscriptions.get_subscription(listed.id).await? {
            Some(current) if current.needs_provisioning() => {}
            _ => {
                debug!("Subscription {} no longer needs provisioning", listed.id);
                return Ok(false);
            }
        }

        let binding = self.fleet.create_client(listed.user_id).await?;

        if let Err(e) = self
            .subscriptions
            .set_binding(listed.id, Some(binding.clone()))
            .await
        {
            error!(
                "Peer {} created on node {} for subscription {} but the binding was not saved: {}",
                binding.peer_id, binding.node_id, listed.id, e
            );
            // Undo the create so the next pass does not leave a second peer behind
            if let Err(undo) = self.fleet.discard_binding(&binding).await {
                error!(
                    "Peer {} on node {} is orphaned and must be removed by hand: {}",
                    binding.peer_id, binding.node_id, undo
                );
            }
            return Err(e.into());
        }

        info!(
            "Provisioned subscription {} (user {}) on node {} after retry",
            listed.id, listed.user_id, binding.node_id
        );

        self.deliver(listed, &binding).await;
        Ok(true)
    }

    async fn deliver(&self, subscription: &Subscription, binding: &FleetBinding) {
        let text = format!(
            "Your VPN access is ready.\nAddress: {}\n\n{}",
            binding.artifact.client_ip, binding.artifact.config
        );
        if let Err(e) = self
            .messenger
            .send_message(ChatId::from(subscription.user_id), &text)
            .await
        {
            warn!(
                "Subscription {} provisioned but user {} was not notified: {}",
                subscription.id, subscription.user_id, e
            );
        }
    }
}

#[async_trait]
impl Job for ProvisioningJob {
    fn name(&self) -> &'static str {
        "provisioning-retry"
    }

    async fn run(&self) {
        match self.run_once().await {
            Ok(report) if report.provisioned + report.failed > 0 || report.out_of_capacity => info!(
                "Provisioning pass: {} provisioned, {} failed{}",
                report.provisioned,
                report.failed,
                if report.out_of_capacity { ", fleet full" } else { "" }
            ),
            Ok(_) => debug!("Provisioning pass: nothing to do"),
            Err(e) => error!("Provisioning pass could not list subscriptions: {}", e),
        }
    }
}
