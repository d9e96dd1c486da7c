//! Latest funding rates per symbol and exchange

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::common::errors::Result;
use crate::common::traits::{FundingRateSource, OpportunitySource};
use crate::common::types::{Exchange, Opportunity};

/// Funding-rate cache refreshed wholesale from the opportunity feed
#[derive(Debug, Default)]
pub struct TickerCache {
    rates: RwLock<HashMap<String, HashMap<Exchange, Decimal>>>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with the rates quoted in `opportunities`
    pub fn replace_from_opportunities(&self, opportunities: &[Opportunity]) {
        let mut fresh: HashMap<String, HashMap<Exchange, Decimal>> = HashMap::new();
        for opportunity in opportunities {
            let entry = fresh.entry(opportunity.symbol.clone()).or_default();
            for quote in &opportunity.exchanges {
                entry.insert(quote.exchange, quote.funding_rate);
            }
        }
        *self.rates.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    /// Record a single rate update
    pub fn update(&self, symbol: &str, exchange: Exchange, funding_rate: Decimal) {
        self.rates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(symbol.to_string())
            .or_default()
            .insert(exchange, funding_rate);
    }

    /// Pull the opportunity feed and swap it in; returns the symbol count
    pub async fn refresh(&self, source: &dyn OpportunitySource) -> Result<usize> {
        let opportunities = source.fetch_opportunities().await?;
        self.replace_from_opportunities(&opportunities);
        Ok(self.len())
    }

    pub fn len(&self) -> usize {
        self.rates.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FundingRateSource for TickerCache {
    fn live_funding_rate(&self, symbol: &str, exchange: Option<Exchange>) -> Option<Decimal> {
        let rates = self.rates.read().unwrap_or_else(|e| e.into_inner());
        let by_exchange = rates.get(symbol)?;
        if let Some(rate) = exchange.and_then(|ex| by_exchange.get(&ex)) {
            return Some(*rate);
        }
        // Deterministic fallback: the quote with the largest magnitude
        by_exchange.values().copied().max_by_key(|r| r.abs())
    }
}
