//! Per-subscription countdown tasks with edge-triggered milestones

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use super::notifications::NotificationBus;
use super::registry::SubscriptionRegistry;
use crate::common::clock::Clock;

/// Delay between two ticks of one countdown
pub const TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Seconds-remaining values that produce a notification
pub const MILESTONES: [i64; 2] = [10, 5];

/// What a single tick observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Subscription left the registry; the task ends
    Removed,
    /// Funding time reached; execution happens server-side, the task ends
    Elapsed,
    /// Countdown written back; the task sleeps and ticks again
    Continue {
        seconds_remaining: i64,
        milestone: Option<i64>,
    },
}

/// Milestones already announced for one subscription
///
/// Matching is by equality: if a tick lands on 11 and the next on 9, the
/// 10-second milestone is skipped.
#[derive(Debug, Clone, Default)]
pub struct MilestoneTracker {
    fired: [bool; MILESTONES.len()],
}

impl MilestoneTracker {
    /// Returns the milestone to announce for this tick, at most once each
    pub fn hit(&mut self, seconds_remaining: i64) -> Option<i64> {
        let idx = MILESTONES.iter().position(|m| *m == seconds_remaining)?;
        if self.fired[idx] {
            return None;
        }
        self.fired[idx] = true;
        Some(seconds_remaining)
    }
}

/// Removes the id from the running set when the task ends, however it ends
struct RunningGuard {
    running: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Spawns one self-terminating countdown task per subscription id
///
/// Tasks are never cancelled explicitly: each tick checks whether its id is
/// still in the registry and stops when it is not.
#[derive(Debug, Clone)]
pub struct CountdownScheduler {
    registry: SubscriptionRegistry,
    notifications: NotificationBus,
    clock: Arc<dyn Clock>,
    running: Arc<Mutex<HashSet<String>>>,
}

impl CountdownScheduler {
    pub fn new(
        registry: SubscriptionRegistry,
        notifications: NotificationBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            notifications,
            clock,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a countdown for `id` unless one is already running
    pub fn spawn(&self, id: impl Into<String>) -> Option<JoinHandle<()>> {
        let id = id.into();
        {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            if !running.insert(id.clone()) {
                debug!(subscription_id = %id, "Countdown already running");
                return None;
            }
        }

        let guard = RunningGuard {
            running: self.running.clone(),
            id: id.clone(),
        };
        let scheduler = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            scheduler.run(&id).await;
        }))
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[instrument(skip(self))]
    async fn run(&self, id: &str) {
        let mut milestones = MilestoneTracker::default();
        loop {
            match self.tick(id, &mut milestones).await {
                TickOutcome::Continue { .. } => tokio::time::sleep(TICK_INTERVAL).await,
                TickOutcome::Removed => {
                    debug!("Subscription gone from registry, countdown stopped");
                    break;
                }
                TickOutcome::Elapsed => {
                    debug!("Funding time reached, countdown stopped");
                    break;
                }
            }
        }
    }

    /// One countdown step for `id`
    pub async fn tick(&self, id: &str, milestones: &mut MilestoneTracker) -> TickOutcome {
        let Some(subscription) = self.registry.get(id).await else {
            return TickOutcome::Removed;
        };

        let seconds_remaining = subscription.seconds_remaining(self.clock.now());
        if seconds_remaining <= 0 {
            return TickOutcome::Elapsed;
        }

        if !self.registry.set_countdown(id, seconds_remaining).await {
            return TickOutcome::Removed;
        }

        let milestone = milestones.hit(seconds_remaining);
        if let Some(seconds) = milestone {
            self.notifications.info(format!(
                "{} {} executes in {} seconds",
                subscription.symbol, subscription.position_type, seconds
            ));
        }

        TickOutcome::Continue {
            seconds_remaining,
            milestone,
        }
    }
}
