//! Daily reminders for subscriptions that are about to lapse

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::Job;
use crate::fleet::Subscription;
use crate::messaging::{ChatId, Messenger};
use crate::store::SubscriptionStore;

pub const DEFAULT_THRESHOLDS: [u32; 2] = [3, 1];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotificationReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct NotificationJob {
    subscriptions: Arc<dyn SubscriptionStore>,
    messenger: Arc<dyn Messenger>,
    thresholds: Vec<u32>,
}

impl NotificationJob {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, messenger: Arc<dyn Messenger>) -> Self {
        Self::with_thresholds(subscriptions, messenger, DEFAULT_THRESHOLDS.to_vec())
    }

    /// `thresholds` are day counts; each subscription is reminded once per threshold
    pub fn with_thresholds(
        subscriptions: Arc<dyn SubscriptionStore>,
        messenger: Arc<dyn Messenger>,
        mut thresholds: Vec<u32>,
    ) -> Self {
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        thresholds.dedup();
        Self {
            subscriptions,
            messenger,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> NotificationReport {
        let mut report = NotificationReport::default();

        for &days in &self.thresholds {
            let (from, to) = window(now, days);
            let expiring = match self.subscriptions.list_expiring(from, to).await {
                Ok(list) => list,
                Err(e) => {
                    error!("Could not list subscriptions expiring in {} day(s): {}", days, e);
                    continue;
                }
            };
            debug!("{} subscription(s) expire in {} day(s)", expiring.len(), days);

            for subscription in expiring {
                let text = reminder_text(&subscription, days);
                match self
                    .messenger
                    .send_message(ChatId::from(subscription.user_id), &text)
                    .await
                {
                    Ok(_) => report.sent += 1,
                    Err(e) => {
                        warn!(
                            "Failed to remind user {} about subscription {}: {}",
                            subscription.user_id, subscription.id, e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

/// Day-wide window `[now + N days - 1 day, now + N days)`
///
/// Consecutive thresholds produce disjoint windows, so a subscription is
/// reminded at most once per threshold by a once-a-day pass.
fn window(now: DateTime<Utc>, days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let to = now + Duration::days(i64::from(days));
    (to - Duration::days(1), to)
}

fn reminder_text(subscription: &Subscription, days: u32) -> String {
    let when = match days {
        0 => "today".to_string(),
        1 => "in 1 day".to_string(),
        n => format!("in {} days", n),
    };
    format!(
        "Your \"{}\" VPN subscription expires {} ({} UTC). Renew it to keep your access.",
        subscription.tariff,
        when,
        subscription.expires_at.format("%Y-%m-%d %H:%M")
    )
}

#[async_trait]
impl Job for NotificationJob {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn run(&self) {
        let report = self.run_at(Utc::now()).await;
        if report.sent + report.failed > 0 {
            info!(
                "Notification pass: {} sent, {} failed",
                report.sent, report.failed
            );
        }
    }
}
