//! Closed-position rows and the DTO served by the trade-history endpoint

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::timestamp;
use crate::common::types::{Exchange, PositionType, SubscriptionStatus};

/// Stored row for a position that has finished (or failed)
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub id: String,
    pub symbol: String,
    pub position_type: PositionType,
    pub status: SubscriptionStatus,
    pub primary_exchange: Exchange,
    pub hedge_exchange: Exchange,
    pub quantity: Decimal,
    pub leverage: u32,
    pub margin: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub primary_fees: Option<Decimal>,
    pub hedge_fees: Option<Decimal>,
    pub funding_earned: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ClosedPosition {
    /// Whether the row belongs in the trade history at all
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal() && self.closed_at.is_some()
    }

    pub fn involves_exchange(&self, exchange: &str) -> bool {
        self.primary_exchange.to_string().eq_ignore_ascii_case(exchange)
            || self.hedge_exchange.to_string().eq_ignore_ascii_case(exchange)
    }

    /// `margin * leverage` when margin is known, else `quantity * entryPrice`
    pub fn position_size_usdt(&self) -> Option<Decimal> {
        match (self.margin, self.entry_price) {
            (Some(margin), _) => Some(margin * Decimal::from(self.leverage)),
            (None, Some(entry)) => Some(self.quantity * entry),
            (None, None) => None,
        }
    }

    /// Sum of both legs' fees, missing values counted as zero
    pub fn total_fees(&self) -> Decimal {
        self.primary_fees.unwrap_or_default() + self.hedge_fees.unwrap_or_default()
    }

    pub fn net_pnl(&self) -> Option<Decimal> {
        self.realized_pnl.map(|pnl| pnl - self.total_fees())
    }
}

/// One row of the trade-history response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeHistoryEntry {
    pub id: String,
    pub symbol: String,
    pub position_type: PositionType,
    pub status: SubscriptionStatus,
    pub primary_exchange: Exchange,
    pub hedge_exchange: Exchange,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub leverage: u32,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub entry_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub exit_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub position_size_usdt: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub primary_fees: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub hedge_fees: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_fees: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub funding_earned: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub realized_pnl: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub net_pnl: Option<Decimal>,
    #[serde(default, with = "timestamp::option")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&ClosedPosition> for TradeHistoryEntry {
    fn from(position: &ClosedPosition) -> Self {
        Self {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            position_type: position.position_type,
            status: position.status,
            primary_exchange: position.primary_exchange,
            hedge_exchange: position.hedge_exchange,
            quantity: position.quantity,
            leverage: position.leverage,
            entry_price: position.entry_price,
            exit_price: position.exit_price,
            position_size_usdt: position.position_size_usdt(),
            primary_fees: position.primary_fees,
            hedge_fees: position.hedge_fees,
            total_fees: position.total_fees(),
            funding_earned: position.funding_earned,
            realized_pnl: position.realized_pnl,
            net_pnl: position.net_pnl(),
            opened_at: position.opened_at,
            closed_at: position.closed_at,
        }
    }
}

/// Body of a successful trade-history response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeHistoryResponse {
    pub data: Vec<TradeHistoryEntry>,
    pub count: usize,
}

impl TradeHistoryResponse {
    pub fn new(data: Vec<TradeHistoryEntry>) -> Self {
        let count = data.len();
        Self { data, count }
    }
}
