//! Trait definitions for the collaborators the engine talks to

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{Credential, Exchange, Opportunity};
use crate::backend::messages::{CreateSubscriptionRequest, DeleteOutcome, SubscriptionRecord};

/// Persistence API for subscriptions
///
/// The backend only supports create, list and delete. There is no update,
/// which is why edits are expressed as delete followed by create.
#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    /// Fetch every subscription of the authenticated user
    ///
    /// Records that cannot be decoded are dropped by the implementation
    /// rather than failing the whole listing.
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>>;

    /// Persist a new subscription and return the stored record
    async fn create_subscription(&self, request: &CreateSubscriptionRequest)
        -> Result<SubscriptionRecord>;

    /// Delete a subscription
    ///
    /// A missing subscription is reported as `DeleteOutcome::NotFound`,
    /// not as an error.
    async fn delete_subscription(&self, subscription_id: &str) -> Result<DeleteOutcome>;

    /// Trigger immediate execution, bypassing the countdown
    async fn execute_subscription(&self, subscription_id: &str) -> Result<()>;
}

/// Per-exchange wallet balance lookup
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Available margin for the credential's account, normalized across
    /// exchange response shapes
    async fn available_margin(&self, credential: &Credential) -> Result<Decimal>;
}

/// Opportunity feed refreshed wholesale from the backend
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    async fn fetch_opportunities(&self) -> Result<Vec<Opportunity>>;
}

/// Live funding-rate lookup used by the auto-cancel sweep
#[cfg_attr(test, mockall::automock)]
pub trait FundingRateSource: Send + Sync {
    /// Current funding rate for `symbol`, preferring `exchange` when given
    fn live_funding_rate(&self, symbol: &str, exchange: Option<Exchange>) -> Option<Decimal>;
}
