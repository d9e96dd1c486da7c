//! Balance-aware pre-flight checks for both legs

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::notifications::NotificationBus;
use crate::common::errors::Result;
use crate::common::traits::BalanceSource;
use crate::common::types::{Credential, Exchange};
use crate::config::types::BalanceConfig;

/// Normalized available margin for one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceReading {
    Available(Decimal),
    /// Unmetered simulated account; balance rules do not apply
    Unlimited,
}

impl BalanceReading {
    pub fn classify(value: Decimal, unlimited_sentinel: Decimal) -> Self {
        if value >= unlimited_sentinel {
            BalanceReading::Unlimited
        } else {
            BalanceReading::Available(value)
        }
    }

    pub fn amount(&self) -> Option<Decimal> {
        match self {
            BalanceReading::Available(v) => Some(*v),
            BalanceReading::Unlimited => None,
        }
    }
}

/// Which side of the hedge a reading belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Primary,
    Hedge,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::Primary => write!(f, "primary"),
            Leg::Hedge => write!(f, "hedge"),
        }
    }
}

/// Balances fetched for a prospective subscription
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub primary: BalanceReading,
    /// `None` when no hedge credential was supplied
    pub hedge: Option<BalanceReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Below the absolute low-balance threshold
    LowBalance,
    /// Below the margin the position needs
    BelowRequiredMargin,
}

/// Non-blocking balance finding
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceWarning {
    pub leg: Leg,
    pub exchange: Exchange,
    pub available: Decimal,
    pub kind: WarningKind,
}

impl std::fmt::Display for BalanceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            WarningKind::LowBalance => write!(
                f,
                "Low {} balance on {}: {} USDT available",
                self.leg, self.exchange, self.available
            ),
            WarningKind::BelowRequiredMargin => write!(
                f,
                "{} balance on {} ({} USDT) is below the required margin",
                self.leg, self.exchange, self.available
            ),
        }
    }
}

/// Snapshot plus warnings; never blocks subscription creation
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub snapshot: BalanceSnapshot,
    pub warnings: Vec<BalanceWarning>,
}

impl BalanceReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Queries both exchanges and flags thin collateral
pub struct BalanceValidator {
    source: Arc<dyn BalanceSource>,
    notifications: NotificationBus,
    low_balance_threshold: Decimal,
    unlimited_sentinel: Decimal,
}

impl BalanceValidator {
    pub fn new(
        source: Arc<dyn BalanceSource>,
        notifications: NotificationBus,
        config: &BalanceConfig,
    ) -> Self {
        Self {
            source,
            notifications,
            low_balance_threshold: config.low_balance_threshold,
            unlimited_sentinel: config.unlimited_sentinel,
        }
    }

    /// Fetch both legs' balances; the hedge is skipped when absent
    #[instrument(skip_all, fields(primary = %primary.id))]
    pub async fn fetch_balances(
        &self,
        primary: &Credential,
        hedge: Option<&Credential>,
    ) -> Result<BalanceSnapshot> {
        let primary_fut = self.source.available_margin(primary);
        let (primary_value, hedge_value) = match hedge {
            Some(hedge) => {
                let (p, h) = tokio::join!(primary_fut, self.source.available_margin(hedge));
                (p?, Some(h?))
            }
            None => (primary_fut.await?, None),
        };

        debug!(?primary_value, ?hedge_value, "Fetched balances");
        Ok(BalanceSnapshot {
            primary: BalanceReading::classify(primary_value, self.unlimited_sentinel),
            hedge: hedge_value.map(|v| BalanceReading::classify(v, self.unlimited_sentinel)),
        })
    }

    /// Warnings for a snapshot; `required_margin` adds a per-leg margin check
    pub fn warnings_for(
        &self,
        snapshot: &BalanceSnapshot,
        primary_exchange: Exchange,
        hedge_exchange: Option<Exchange>,
        required_margin: Option<Decimal>,
    ) -> Vec<BalanceWarning> {
        let mut warnings = Vec::new();
        let legs = [
            Some((Leg::Primary, primary_exchange, snapshot.primary)),
            hedge_exchange
                .zip(snapshot.hedge)
                .map(|(ex, reading)| (Leg::Hedge, ex, reading)),
        ];

        for (leg, exchange, reading) in legs.into_iter().flatten() {
            let Some(available) = reading.amount() else {
                continue;
            };
            if available < self.low_balance_threshold {
                warnings.push(BalanceWarning {
                    leg,
                    exchange,
                    available,
                    kind: WarningKind::LowBalance,
                });
            } else if required_margin.is_some_and(|m| available < m) {
                warnings.push(BalanceWarning {
                    leg,
                    exchange,
                    available,
                    kind: WarningKind::BelowRequiredMargin,
                });
            }
        }
        warnings
    }

    /// Fetch balances, publish a warning per finding, return the report
    pub async fn check(
        &self,
        primary: &Credential,
        hedge: Option<&Credential>,
        required_margin: Option<Decimal>,
    ) -> Result<BalanceReport> {
        let snapshot = self.fetch_balances(primary, hedge).await?;
        let warnings = self.warnings_for(
            &snapshot,
            primary.exchange,
            hedge.map(|h| h.exchange),
            required_margin,
        );
        for warning in &warnings {
            self.notifications.warning(warning.to_string());
        }
        Ok(BalanceReport { snapshot, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::HedgeError;
    use crate::common::types::Environment;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FixedBalances {
        values: HashMap<String, Decimal>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BalanceSource for FixedBalances {
        async fn available_margin(&self, credential: &Credential) -> Result<Decimal> {
            self.calls.lock().unwrap().push(credential.id.clone());
            self.values
                .get(&credential.id)
                .copied()
                .ok_or_else(|| HedgeError::Network("unreachable".into()))
        }
    }

    fn credential(id: &str, exchange: Exchange) -> Credential {
        Credential {
            id: id.to_string(),
            exchange,
            environment: Environment::Mainnet,
            is_active: true,
        }
    }

    fn validator(values: &[(&str, Decimal)]) -> (BalanceValidator, Arc<FixedBalances>, NotificationBus) {
        let source = Arc::new(FixedBalances {
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            calls: Mutex::new(Vec::new()),
        });
        let bus = NotificationBus::default();
        let v = BalanceValidator::new(source.clone(), bus.clone(), &BalanceConfig::default());
        (v, source, bus)
    }

    #[tokio::test]
    async fn test_low_balance_is_a_warning() {
        let (validator, _, bus) = validator(&[("p", dec!(4.5)), ("h", dec!(500))]);
        let report = validator
            .check(&credential("p", Exchange::Bybit), Some(&credential("h", Exchange::Bingx)), None)
            .await
            .unwrap();

        assert_eq!(report.snapshot.primary, BalanceReading::Available(dec!(4.5)));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].leg, Leg::Primary);
        assert_eq!(report.warnings[0].kind, WarningKind::LowBalance);
        assert_eq!(bus.active().len(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_skips_low_balance_rule() {
        let (validator, _, _) = validator(&[("p", dec!(999999999)), ("h", dec!(50))]);
        let report = validator
            .check(
                &credential("p", Exchange::Mexc),
                Some(&credential("h", Exchange::Bybit)),
                Some(dec!(100)),
            )
            .await
            .unwrap();

        assert_eq!(report.snapshot.primary, BalanceReading::Unlimited);
        // Only the hedge leg is checked against the margin
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].leg, Leg::Hedge);
        assert_eq!(report.warnings[0].kind, WarningKind::BelowRequiredMargin);
    }

    #[tokio::test]
    async fn test_hedge_not_fetched_when_absent() {
        let (validator, source, _) = validator(&[("p", dec!(100))]);
        let snapshot = validator
            .fetch_balances(&credential("p", Exchange::Bybit), None)
            .await
            .unwrap();
        assert!(snapshot.hedge.is_none());
        assert_eq!(*source.calls.lock().unwrap(), vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let (validator, _, _) = validator(&[("p", dec!(100))]);
        let result = validator
            .fetch_balances(&credential("p", Exchange::Bybit), Some(&credential("missing", Exchange::Okx)))
            .await;
        assert!(matches!(result, Err(HedgeError::Network(_))));
    }
}
