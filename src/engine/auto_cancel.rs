//! Periodic sweep that withdraws subscriptions whose funding edge vanished

use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use super::coordinator::SubscriptionCoordinator;
use crate::common::clock::Clock;
use crate::common::traits::FundingRateSource;
use crate::common::types::SubscriptionStatus;
use crate::config::types::AutoCancelConfig;

/// Delay between two sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Only subscriptions executing within this many seconds are considered
pub const CANCEL_WINDOW_SECS: i64 = 30;

/// User-configurable auto-cancel rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoCancelPolicy {
    pub enabled: bool,
    pub threshold: Option<Decimal>,
}

impl AutoCancelPolicy {
    pub fn from_config(config: &AutoCancelConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
        }
    }

    /// Disabled or without a threshold the sweep does nothing
    pub fn is_active(&self) -> bool {
        self.enabled && self.threshold.is_some()
    }

    pub fn should_cancel(&self, live_rate: Decimal, seconds_remaining: i64) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(threshold) = self.threshold else {
            return false;
        };
        live_rate.abs() < threshold.abs()
            && seconds_remaining > 0
            && seconds_remaining < CANCEL_WINDOW_SECS
    }
}

fn as_percent(rate: Decimal) -> Decimal {
    (rate * Decimal::ONE_HUNDRED).normalize()
}

/// Runs the auto-cancel sweep against the coordinator's registry
pub struct AutoCancelEngine {
    coordinator: Arc<SubscriptionCoordinator>,
    rates: Arc<dyn FundingRateSource>,
    policy: RwLock<AutoCancelPolicy>,
    clock: Arc<dyn Clock>,
}

impl AutoCancelEngine {
    pub fn new(
        coordinator: Arc<SubscriptionCoordinator>,
        rates: Arc<dyn FundingRateSource>,
        policy: AutoCancelPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator,
            rates,
            policy: RwLock::new(policy),
            clock,
        }
    }

    pub fn policy(&self) -> AutoCancelPolicy {
        *self.policy.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes effect on the next sweep
    pub fn set_policy(&self, policy: AutoCancelPolicy) {
        *self.policy.write().unwrap_or_else(|e| e.into_inner()) = policy;
    }

    /// One pass over the active subscriptions; returns the cancelled ids
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Vec<String> {
        let policy = self.policy();
        let Some(threshold) = policy.threshold.filter(|_| policy.is_active()) else {
            return Vec::new();
        };

        let now = self.clock.now();
        let mut cancelled = Vec::new();
        for subscription in self.coordinator.registry().active().await {
            if subscription.status != SubscriptionStatus::Active {
                continue;
            }
            let seconds_remaining = subscription.seconds_remaining(now);
            let Some(live_rate) = self
                .rates
                .live_funding_rate(&subscription.symbol, subscription.primary_exchange)
            else {
                debug!(symbol = %subscription.symbol, "No live funding rate, skipping");
                continue;
            };

            if !policy.should_cancel(live_rate, seconds_remaining) {
                continue;
            }

            let reason = format!(
                "Auto-cancelled {} {}: funding rate {}% is below the {}% threshold with {}s left",
                subscription.symbol,
                subscription.position_type,
                as_percent(live_rate),
                as_percent(threshold.abs()),
                seconds_remaining
            );
            match self.coordinator.auto_cancel(&subscription.id, reason).await {
                Ok(()) => {
                    info!(id = %subscription.id, %live_rate, seconds_remaining, "Auto-cancelled subscription");
                    cancelled.push(subscription.id);
                }
                Err(e) => warn!(id = %subscription.id, error = %e, "Auto-cancel failed"),
            }
        }
        cancelled
    }

    /// Sweep every [`SWEEP_INTERVAL`] until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Auto-cancel sweep stopped");
                        break;
                    }
                }
            }
        }
    }
}
