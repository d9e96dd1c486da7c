//! Subscription lifecycle engine
//!
//! The coordinator owns the registry; the countdown scheduler and the
//! auto-cancel sweep only read it (the scheduler also writes the derived
//! countdown). Everything user-facing goes through the notification bus.

pub mod auto_cancel;
pub mod balance;
pub mod coordinator;
pub mod countdown;
pub mod intent;
pub mod notifications;
pub mod registry;
pub mod sizer;
pub mod ticker;

pub use auto_cancel::{AutoCancelEngine, AutoCancelPolicy};
pub use balance::{BalanceReading, BalanceReport, BalanceValidator, BalanceWarning};
pub use coordinator::{
    is_valid_symbol, ReconcileOutcome, SubscriptionCoordinator, SubscriptionRequest, RECONCILE_INTERVAL,
};
pub use countdown::{CountdownScheduler, MilestoneTracker, TickOutcome};
pub use intent::{PreparedSubscription, SubscribeIntent};
pub use notifications::{Notification, NotificationBus, NotificationLevel};
pub use registry::SubscriptionRegistry;
pub use sizer::PositionSizer;
pub use ticker::TickerCache;
