//! Channel type definitions for inter-task communication

use tokio::sync::{broadcast, watch};

use crate::engine::notifications::Notification;

/// Default notification channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Create a notification broadcast channel with the default buffer size
pub fn create_notification_channel() -> (broadcast::Sender<Notification>, broadcast::Receiver<Notification>) {
    broadcast::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a notification broadcast channel with a custom buffer size
pub fn create_notification_channel_with_size(
    size: usize,
) -> (broadcast::Sender<Notification>, broadcast::Receiver<Notification>) {
    broadcast::channel(size.max(1))
}

/// Create a shutdown signal; send `true` to stop background loops
pub fn create_shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
