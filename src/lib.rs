//! FundingHedge Library
//!
//! Lifecycle coordination for hedged funding-rate subscriptions: position
//! sizing, balance pre-flight checks, create / edit / cancel / reconcile
//! against the subscription backend, per-subscription countdowns, the
//! auto-cancel risk sweep and trade-history reporting.

pub mod backend;
pub mod common;
pub mod config;
pub mod engine;
pub mod history;

// Re-export commonly used types
pub use backend::BackendRestClient;
pub use common::errors::{HedgeError, Result};
pub use common::types::{
    CompletedDeal, Credential, Environment, Exchange, PositionCalculation, PositionType,
    Subscription, SubscriptionStatus, TickerPrice,
};
pub use config::types::AppConfig;
pub use engine::{
    AutoCancelEngine, AutoCancelPolicy, BalanceValidator, CountdownScheduler, NotificationBus,
    PositionSizer, SubscriptionCoordinator, SubscriptionRequest, TickerCache,
};
pub use history::{TradeHistoryQuery, TradeHistoryService};
