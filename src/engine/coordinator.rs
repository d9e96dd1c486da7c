//! Subscription lifecycle coordinator
//!
//! Owns the subscription registry and is the only component that inserts,
//! removes or replaces entries in it. The backend offers create, list and
//! delete but no update, so an edit is a strictly ordered cancel followed by
//! a create, with a distinct error when only the first half succeeds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, instrument, warn};

use super::countdown::CountdownScheduler;
use super::notifications::NotificationBus;
use super::registry::SubscriptionRegistry;
use crate::backend::messages::{CreateSubscriptionRequest, DeleteOutcome};
use crate::common::clock::Clock;
use crate::common::errors::{HedgeError, Result};
use crate::common::traits::SubscriptionBackend;
use crate::common::types::{
    CompletedDeal, Credential, PositionCalculation, PositionType, Subscription,
    SubscriptionKey, SubscriptionStatus,
};

/// Quote currencies a tradeable symbol may end with
pub const QUOTE_SUFFIXES: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];

/// Default delay between two background reconciliations
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Relative tolerance when checking a calculation against the request margin
const MARGIN_TOLERANCE: Decimal = dec!(0.000001);

/// Structural symbol check used when reconciling backend records
///
/// A symbol is an uppercase alphanumeric base (separators `-`, `_`, `/`
/// allowed) followed by a recognized quote currency.
pub fn is_valid_symbol(symbol: &str) -> bool {
    let well_formed = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '/'));
    well_formed
        && QUOTE_SUFFIXES.iter().any(|quote| {
            symbol
                .strip_suffix(quote)
                .map(|base| base.trim_end_matches(['-', '_', '/']))
                .is_some_and(|base| !base.is_empty())
        })
}

/// Everything needed to create (or re-create) a subscription
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub symbol: String,
    pub position_type: PositionType,
    pub calculation: Option<PositionCalculation>,
    pub primary_credential: Option<Credential>,
    pub hedge_credential: Option<Credential>,
    pub leverage: u32,
    pub margin: Option<Decimal>,
    /// Seconds before funding at which the backend executes
    pub execution_delay: u32,
    pub funding_rate: Decimal,
    pub next_funding_time: DateTime<Utc>,
}

impl SubscriptionRequest {
    pub fn key(&self) -> Option<SubscriptionKey> {
        Some(SubscriptionKey {
            symbol: self.symbol.clone(),
            primary_credential_id: self.primary_credential.as_ref()?.id.clone(),
            hedge_credential_id: self.hedge_credential.as_ref()?.id.clone(),
        })
    }
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub active: Vec<Subscription>,
    pub completed_deals: Vec<CompletedDeal>,
    /// Records skipped because they were malformed
    pub dropped: usize,
}

/// How a cancellation is announced
#[derive(Debug, Clone)]
enum CancelNotice {
    Silent,
    Standard,
    Custom(String),
}

/// Coordinates create / edit / cancel / reconcile against the backend
pub struct SubscriptionCoordinator {
    backend: Arc<dyn SubscriptionBackend>,
    registry: SubscriptionRegistry,
    scheduler: CountdownScheduler,
    notifications: NotificationBus,
    /// Serializes registry mutations so an edit's two steps never interleave
    /// with another create, cancel or reconcile in this process
    mutation: Mutex<()>,
}

impl SubscriptionCoordinator {
    pub fn new(
        backend: Arc<dyn SubscriptionBackend>,
        notifications: NotificationBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = SubscriptionRegistry::new();
        let scheduler = CountdownScheduler::new(registry.clone(), notifications.clone(), clock);
        Self {
            backend,
            registry,
            scheduler,
            notifications,
            mutation: Mutex::new(()),
        }
    }

    /// Read access to the registry (and the countdown field)
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &CountdownScheduler {
        &self.scheduler
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.notifications
    }

    /// Pre-flight validation; nothing reaches the network when this fails
    pub fn validate(&self, request: &SubscriptionRequest) -> Result<CreateSubscriptionRequest> {
        let primary = request
            .primary_credential
            .as_ref()
            .filter(|c| c.is_active)
            .ok_or(HedgeError::NoCredential)?;
        let hedge = request
            .hedge_credential
            .as_ref()
            .filter(|c| c.is_active)
            .ok_or(HedgeError::NoHedgeCredential)?;
        if primary.id == hedge.id {
            return Err(HedgeError::InvalidPosition(
                "hedge credential must differ from the primary credential".to_string(),
            ));
        }

        let calc = request
            .calculation
            .as_ref()
            .filter(|c| c.is_valid())
            .ok_or_else(|| HedgeError::InvalidPosition("no valid position calculation".to_string()))?;
        if calc.symbol != request.symbol {
            return Err(HedgeError::InvalidPosition(format!(
                "calculation is for {}, not {}",
                calc.symbol, request.symbol
            )));
        }
        if calc.leverage != request.leverage {
            return Err(HedgeError::InvalidPosition(format!(
                "calculation uses leverage {}, request uses {}",
                calc.leverage, request.leverage
            )));
        }

        let margin = request.margin.unwrap_or(calc.required_margin);
        if margin <= Decimal::ZERO {
            return Err(HedgeError::InvalidPosition(
                "margin must be greater than zero".to_string(),
            ));
        }
        if (margin - calc.required_margin).abs() > calc.required_margin * MARGIN_TOLERANCE {
            return Err(HedgeError::InvalidPosition(
                "calculation is stale for the requested margin".to_string(),
            ));
        }

        Ok(CreateSubscriptionRequest {
            symbol: request.symbol.clone(),
            funding_rate: request.funding_rate,
            next_funding_time: request.next_funding_time,
            position_type: request.position_type,
            quantity: calc.quantity,
            primary_credential_id: primary.id.clone(),
            hedge_exchange: hedge.exchange,
            hedge_credential_id: hedge.id.clone(),
            leverage: request.leverage,
            margin,
            execution_delay: request.execution_delay,
        })
    }

    /// Create a subscription, register it and start its countdown
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn create(&self, request: SubscriptionRequest) -> Result<Subscription> {
        let body = self.validate(&request)?;
        let _guard = self.mutation.lock().await;
        self.ensure_slot_free(&request, None).await?;
        match self.create_locked(&request, &body).await {
            Ok(subscription) => {
                self.notifications.success(format!(
                    "Subscribed to {} ({} {}x)",
                    subscription.symbol, subscription.position_type, subscription.leverage
                ));
                Ok(subscription)
            }
            Err(e) => {
                if !e.is_preflight() {
                    self.notifications
                        .error(format!("Failed to subscribe to {}: {}", request.symbol, e));
                }
                Err(e)
            }
        }
    }

    /// Replace a subscription: cancel the old one, then create the new one
    ///
    /// The create request is only sent after the delete has completed.
    /// Nothing is deleted when the id is no longer registered or when the new
    /// tuple is held by another active subscription. When the delete succeeds
    /// and the create fails the caller receives `EditPartialFailure`: the old
    /// subscription is gone and must be re-created by the user.
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn edit(&self, existing_id: &str, request: SubscriptionRequest) -> Result<Subscription> {
        let body = self.validate(&request)?;
        let _guard = self.mutation.lock().await;

        // A concurrent edit or cancel may have replaced the entry while we waited
        if !self.registry.contains(existing_id).await {
            self.notifications.error(format!(
                "Subscription for {} no longer exists; refresh and try again",
                request.symbol
            ));
            return Err(HedgeError::SubscriptionNotFound(existing_id.to_string()));
        }
        self.ensure_slot_free(&request, Some(existing_id)).await?;

        if let Err(e) = self.cancel_locked(existing_id, CancelNotice::Silent).await {
            self.notifications
                .error(format!("Could not update subscription for {}: {}", request.symbol, e));
            return Err(e);
        }

        match self.create_locked(&request, &body).await {
            Ok(subscription) => {
                info!(old_id = %existing_id, new_id = %subscription.id, "Subscription replaced");
                self.notifications
                    .success(format!("Subscription for {} updated", subscription.symbol));
                Ok(subscription)
            }
            Err(e) => {
                warn!(old_id = %existing_id, error = %e, "Edit left no replacement subscription");
                self.notifications.error(format!(
                    "Subscription for {} was cancelled but the updated one could not be created ({}). Please subscribe again.",
                    request.symbol, e
                ));
                Err(HedgeError::EditPartialFailure {
                    cancelled_id: existing_id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Cancel a subscription
    ///
    /// A subscription the backend no longer knows is removed locally and
    /// reported as success. `silent` suppresses the user notification.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str, silent: bool) -> Result<()> {
        let notice = if silent {
            CancelNotice::Silent
        } else {
            CancelNotice::Standard
        };
        let _guard = self.mutation.lock().await;
        self.cancel_locked(id, notice).await
    }

    /// Cancellation issued by the risk sweep; always announced with `reason`
    #[instrument(skip(self, reason))]
    pub async fn auto_cancel(&self, id: &str, reason: String) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.cancel_locked(id, CancelNotice::Custom(reason)).await
    }

    /// Rebuild the registry and deal history from the backend listing
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let records = self.backend.list_subscriptions().await?;
        let _guard = self.mutation.lock().await;

        let mut outcome = ReconcileOutcome::default();
        for record in records {
            match record.symbol.as_deref() {
                Some(symbol) if is_valid_symbol(symbol) => {}
                other => {
                    warn!(id = %record.id, symbol = ?other, "Dropping subscription with malformed symbol");
                    outcome.dropped += 1;
                    continue;
                }
            }

            if record.status == SubscriptionStatus::Completed {
                if let Some(deal) = record.to_completed_deal() {
                    outcome.completed_deals.push(deal);
                }
                continue;
            }

            match record.to_subscription() {
                Ok(subscription) => outcome.active.push(subscription),
                Err(reason) => {
                    warn!(id = %record.id, %reason, "Dropping malformed subscription");
                    outcome.dropped += 1;
                }
            }
        }

        outcome
            .completed_deals
            .sort_by(|a, b| b.executed_at.cmp(&a.executed_at));

        self.registry
            .replace(outcome.active.clone(), outcome.completed_deals.clone())
            .await;

        for subscription in &outcome.active {
            if subscription.status == SubscriptionStatus::Active {
                self.scheduler.spawn(subscription.id.clone());
            }
        }

        debug!(
            active = outcome.active.len(),
            completed = outcome.completed_deals.len(),
            dropped = outcome.dropped,
            "Reconciled subscriptions"
        );
        Ok(outcome)
    }

    /// Reconcile every `period` until `shutdown` flips to true
    ///
    /// The first pass runs one period after start; callers reconcile once
    /// themselves before starting the loop.
    pub async fn run_reconciliation(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "Background reconciliation failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Reconciliation loop stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Execute immediately instead of waiting for the countdown
    #[instrument(skip(self))]
    pub async fn execute_now(&self, id: &str) -> Result<()> {
        let label = self
            .registry
            .get(id)
            .await
            .map(|s| s.symbol)
            .unwrap_or_else(|| id.to_string());

        match self.backend.execute_subscription(id).await {
            Ok(()) => {
                self.notifications
                    .success(format!("Execution started for {}", label));
                Ok(())
            }
            Err(e) => {
                self.notifications
                    .error(format!("Failed to execute {}: {}", label, e));
                Err(e)
            }
        }
    }

    /// Reject a request whose tuple is already held by another ACTIVE entry
    async fn ensure_slot_free(&self, request: &SubscriptionRequest, except: Option<&str>) -> Result<()> {
        let Some(key) = request.key() else {
            return Ok(());
        };
        match self.registry.find_by_key(&key, except).await {
            Some(existing) => Err(HedgeError::InvalidPosition(format!(
                "subscription {} already covers {} on these credentials",
                existing.id, key.symbol
            ))),
            None => Ok(()),
        }
    }

    async fn create_locked(
        &self,
        request: &SubscriptionRequest,
        body: &CreateSubscriptionRequest,
    ) -> Result<Subscription> {
        let record = self.backend.create_subscription(body).await?;
        let mut subscription = record
            .to_subscription()
            .map_err(|reason| HedgeError::InvalidResponse(format!("created subscription: {}", reason)))?;
        if subscription.primary_exchange.is_none() {
            subscription.primary_exchange = request.primary_credential.as_ref().map(|c| c.exchange);
        }

        self.registry.insert(subscription.clone()).await;
        self.scheduler.spawn(subscription.id.clone());
        info!(id = %subscription.id, quantity = %subscription.quantity, "Subscription created");
        Ok(subscription)
    }

    async fn cancel_locked(&self, id: &str, notice: CancelNotice) -> Result<()> {
        let label = self
            .registry
            .get(id)
            .await
            .map(|s| s.symbol)
            .unwrap_or_else(|| id.to_string());

        let outcome = match self.backend.delete_subscription(id).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => DeleteOutcome::NotFound,
            Err(e) => {
                if !matches!(notice, CancelNotice::Silent) {
                    self.notifications
                        .error(format!("Failed to cancel {}: {}", label, e));
                }
                return Err(e);
            }
        };

        if outcome == DeleteOutcome::NotFound {
            debug!(%id, "Backend no longer knows the subscription");
        }
        self.registry.remove(id).await;

        match notice {
            CancelNotice::Silent => {}
            CancelNotice::Standard => {
                self.notifications
                    .success(format!("Subscription for {} cancelled", label));
            }
            CancelNotice::Custom(reason) => {
                self.notifications.warning(reason);
            }
        }
        info!(%id, "Subscription cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_validation() {
        for ok in ["BTCUSDT", "1000PEPEUSDT", "ETHUSDC", "BTC-USDT", "SOL/USD"] {
            assert!(is_valid_symbol(ok), "{} should be valid", ok);
        }
        for bad in ["", "USDT", "btcusdt", "BTC", "BTCUSDT ", "BTC-", "-USDT", "BTC USDT"] {
            assert!(!is_valid_symbol(bad), "{:?} should be invalid", bad);
        }
    }
}
