//! Resolving a user's subscribe intent into a coordinator request
//!
//! Pulls the live funding quote for the primary exchange, sizes the position
//! and runs the balance pre-flight. Balance findings are warnings only, and a
//! failed balance lookup never stops the subscription.

use rust_decimal::Decimal;
use tracing::{instrument, warn};

use super::balance::{BalanceReport, BalanceValidator};
use super::coordinator::SubscriptionRequest;
use super::sizer::PositionSizer;
use crate::common::errors::{HedgeError, Result};
use crate::common::traits::OpportunitySource;
use crate::common::types::{Credential, PositionType, TickerPrice};

/// What the user asked for, before any market data is attached
#[derive(Debug, Clone)]
pub struct SubscribeIntent {
    pub symbol: String,
    pub position_type: PositionType,
    pub primary: Credential,
    pub hedge: Credential,
    pub margin: Decimal,
    pub leverage: u32,
    pub execution_delay: u32,
    /// Overrides the price quoted by the opportunity feed
    pub price: Option<Decimal>,
}

/// Request ready for `create`/`edit` plus the balance findings shown with it
#[derive(Debug, Clone)]
pub struct PreparedSubscription {
    pub request: SubscriptionRequest,
    /// `None` when balances could not be fetched
    pub balance: Option<BalanceReport>,
}

impl SubscribeIntent {
    #[instrument(skip_all, fields(symbol = %self.symbol))]
    pub async fn prepare(
        self,
        sizer: &PositionSizer,
        feed: &dyn OpportunitySource,
        balances: &BalanceValidator,
    ) -> Result<PreparedSubscription> {
        let symbol = self.symbol.trim().to_uppercase();
        let opportunities = feed.fetch_opportunities().await?;
        let quote = opportunities
            .iter()
            .filter(|o| o.symbol == symbol)
            .find_map(|o| o.quote(self.primary.exchange))
            .cloned()
            .ok_or_else(|| {
                HedgeError::InvalidPosition(format!(
                    "no funding quote for {} on {}",
                    symbol, self.primary.exchange
                ))
            })?;

        let price = TickerPrice::new(self.price.or(quote.price), None);
        let calculation = sizer.compute(&symbol, price, Some(self.margin), self.leverage)?;

        let balance = match balances
            .check(&self.primary, Some(&self.hedge), Some(calculation.required_margin))
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Balance pre-flight unavailable");
                None
            }
        };

        Ok(PreparedSubscription {
            request: SubscriptionRequest {
                symbol,
                position_type: self.position_type,
                calculation: Some(calculation),
                primary_credential: Some(self.primary),
                hedge_credential: Some(self.hedge),
                leverage: self.leverage,
                margin: Some(self.margin),
                execution_delay: self.execution_delay,
                funding_rate: quote.funding_rate,
                next_funding_time: quote.next_funding_time,
            },
            balance,
        })
    }
}
