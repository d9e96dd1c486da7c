//! Ephemeral, auto-expiring user-facing messages

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::common::channels::create_notification_channel_with_size;
use crate::common::clock::{Clock, SystemClock};
use crate::config::types::NotificationConfig;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single user-facing message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Shared bus fed by the coordinator, scheduler, sweep and balance checks
///
/// Cloning is cheap; all clones publish into the same queue. Messages expire
/// after the configured TTL and the queue never holds more than
/// `max_retained` entries (oldest dropped first). Every message is also
/// broadcast to live subscribers and logged.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    queue: Arc<Mutex<VecDeque<Notification>>>,
    next_id: Arc<AtomicU64>,
    ttl: chrono::Duration,
    max_retained: usize,
    clock: Arc<dyn Clock>,
    sender: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(ttl: Duration, max_retained: usize, clock: Arc<dyn Clock>) -> Self {
        let max_retained = max_retained.max(1);
        let (sender, _) = create_notification_channel_with_size(max_retained);
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(max_retained))),
            next_id: Arc::new(AtomicU64::new(1)),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(5)),
            max_retained,
            clock,
            sender,
        }
    }

    pub fn from_config(config: &NotificationConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_seconds),
            config.max_retained,
            clock,
        )
    }

    /// Publish a message and return its id
    pub fn publish(&self, level: NotificationLevel, message: impl Into<String>) -> u64 {
        let message = message.into();
        match level {
            NotificationLevel::Info | NotificationLevel::Success => info!(%message, "notification"),
            NotificationLevel::Warning => warn!(%message, "notification"),
            NotificationLevel::Error => error!(%message, "notification"),
        }

        let now = self.clock.now();
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            level,
            message,
            created_at: now,
            expires_at: now + self.ttl,
        };
        let id = notification.id;

        {
            let mut queue = self.lock();
            Self::prune(&mut queue, now);
            while queue.len() >= self.max_retained {
                queue.pop_front();
            }
            queue.push_back(notification.clone());
        }

        // No live subscribers is fine
        let _ = self.sender.send(notification);
        id
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.publish(NotificationLevel::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.publish(NotificationLevel::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> u64 {
        self.publish(NotificationLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.publish(NotificationLevel::Error, message)
    }

    /// Messages that have not expired yet, oldest first
    pub fn active(&self) -> Vec<Notification> {
        let now = self.clock.now();
        let mut queue = self.lock();
        Self::prune(&mut queue, now);
        queue.iter().cloned().collect()
    }

    /// Remove a message before it expires
    pub fn dismiss(&self, id: u64) -> bool {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|n| n.id != id);
        queue.len() != before
    }

    /// Receive every message published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    fn prune(queue: &mut VecDeque<Notification>, now: DateTime<Utc>) {
        queue.retain(|n| !n.is_expired(now));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::from_config(&NotificationConfig::default(), Arc::new(SystemClock))
    }
}
